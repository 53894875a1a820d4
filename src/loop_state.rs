use serde::{Deserialize, Serialize};
use std::fmt;

/// Repeat policy of the now-playing queue.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum LoopState {
    #[default]
    NoRepeat,
    RepeatTrack,
    RepeatAll,
    Shuffle,
}

impl LoopState {
    pub const ALL: [LoopState; 4] = [
        LoopState::NoRepeat,
        LoopState::RepeatTrack,
        LoopState::RepeatAll,
        LoopState::Shuffle,
    ];

    /// The state after one press of the loop button.
    #[must_use]
    pub fn next(self) -> Self {
        Self::from_index(self.index() + 1)
    }

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % Self::ALL.len()]
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoopState::NoRepeat => "no repeat",
            LoopState::RepeatTrack => "repeat track",
            LoopState::RepeatAll => "repeat all",
            LoopState::Shuffle => "shuffle",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_four_steps_return_home() {
        for state in LoopState::ALL {
            let cycled = state.next().next().next().next();
            assert_eq!(cycled, state);
        }
    }

    #[test]
    fn test_cycle_order() {
        assert_eq!(LoopState::NoRepeat.next(), LoopState::RepeatTrack);
        assert_eq!(LoopState::RepeatTrack.next(), LoopState::RepeatAll);
        assert_eq!(LoopState::RepeatAll.next(), LoopState::Shuffle);
        assert_eq!(LoopState::Shuffle.next(), LoopState::NoRepeat);
        assert_eq!(LoopState::from_index(6), LoopState::RepeatAll);
    }
}
