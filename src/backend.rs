//! Playback backend contract.
//!
//! A backend is an opaque engine that opens one resource at a time. Loads are
//! answered asynchronously through [`BackendEvent`]s; every event carries the
//! [`LoadTicket`] of the load it belongs to so the controller can ignore
//! answers to loads it has already superseded.

use std::fmt;

/// Tag of one load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(pub u64);

impl fmt::Display for LoadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendEvent {
    LoadSuccess(LoadTicket),
    LoadFailed(LoadTicket),
    /// The resource of this load played to its natural end.
    Finished(LoadTicket),
}

impl BackendEvent {
    #[must_use]
    pub fn ticket(&self) -> LoadTicket {
        match self {
            BackendEvent::LoadSuccess(ticket)
            | BackendEvent::LoadFailed(ticket)
            | BackendEvent::Finished(ticket) => *ticket,
        }
    }
}

/// Transport commands understood by a playback engine. Positions are in
/// milliseconds.
pub trait MusicBackend: Send {
    /// Open a whole file or URL.
    fn load_music(&mut self, ticket: LoadTicket, resource: &str);

    /// Open the `[start, start + duration)` section of a file.
    fn load_music_section(&mut self, ticket: LoadTicket, resource: &str, start: u64, duration: u64);

    fn play(&mut self);

    fn pause(&mut self);

    /// Stop and unload.
    fn reset(&mut self);

    fn set_position(&mut self, position: i64);

    fn position(&self) -> i64;

    /// Poll hook for engines that have to be asked about their state.
    fn tick(&mut self) {}
}
