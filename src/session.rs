//! Foreground playback session: stdin commands drive the controller until the
//! user quits or the queue runs out.

use crate::config::{Configure, RuntimeConfig};
use crate::db;
use crate::model::{read, SharedModel};
use crate::now_playing::{NowPlaying, PlaybackPhase};
use crate::track::format_duration;
use anyhow::{Context, Result};
use log::{debug, info};
use std::io::{self, BufRead};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

/// How often the backend is polled while no command arrives.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Next,
    Previous,
    Pause,
    Loop,
    Rate(u8),
    Status,
    Quit,
    Unrecognized(String),
}

#[must_use]
pub fn parse_line(line: &str) -> UserCommand {
    let mut words = line.split_whitespace();
    let Some(command) = words.next() else {
        return UserCommand::Status;
    };

    match command {
        "next" | "skip" | "n" => UserCommand::Next,
        "prev" | "previous" | "p" => UserCommand::Previous,
        "pause" | "play" => UserCommand::Pause,
        "loop" => UserCommand::Loop,
        "rate" => match words.next().and_then(|value| value.parse::<u8>().ok()) {
            Some(rating) if rating <= 5 => UserCommand::Rate(rating),
            _ => UserCommand::Unrecognized(line.trim().to_string()),
        },
        "status" => UserCommand::Status,
        "stop" | "quit" | "exit" | "q" => UserCommand::Quit,
        _ => UserCommand::Unrecognized(line.trim().to_string()),
    }
}

/// Read commands from stdin on a helper thread. End of input quits.
pub fn spawn_stdin_reader() -> Receiver<UserCommand> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || read_commands(io::stdin().lock(), &tx));
    rx
}

fn read_commands(input: impl BufRead, tx: &Sender<UserCommand>) {
    for line in input.lines() {
        let command = match line {
            Ok(line) => parse_line(&line),
            Err(e) => {
                debug!("stdin closed: {e}");
                break;
            }
        };
        let quit = command == UserCommand::Quit;
        if tx.send(command).is_err() || quit {
            return;
        }
    }
    // A closed session does not care whether this arrives.
    let _ = tx.send(UserCommand::Quit);
}

/// One line describing what plays.
#[must_use]
pub fn status_line(now_playing: &NowPlaying) -> String {
    let record = &now_playing.playing_item().record;
    if now_playing.playing_index().is_none() {
        return format!("[{:?}] nothing playing, {}", now_playing.phase(), now_playing.loop_state());
    }

    let position = u64::try_from(now_playing.position()).unwrap_or(0);
    let artist = if record.artist.is_empty() {
        String::new()
    } else {
        format!("{} - ", record.artist)
    };
    let source = now_playing
        .playing_tab()
        .map(|tab| format!(" from {}", tab.title()))
        .unwrap_or_default();
    format!(
        "[{:?}] {artist}{} {}/{} ({}, {} plays, rated {}){source}",
        now_playing.phase(),
        record.title,
        format_duration(position),
        format_duration(record.duration),
        now_playing.loop_state(),
        record.play_count,
        record.rating,
    )
}

/// Apply one command. Returns `false` when the session should end.
pub fn apply(now_playing: &mut NowPlaying, command: UserCommand) -> bool {
    match command {
        UserCommand::Next => now_playing.play_next(),
        UserCommand::Previous => now_playing.play_previous(),
        UserCommand::Pause => now_playing.toggle_play_pause(),
        UserCommand::Loop => {
            now_playing.change_loop_state();
            println!("Loop: {}", now_playing.loop_state());
        }
        UserCommand::Rate(rating) => now_playing.set_playing_rating(rating),
        UserCommand::Status => println!("{}", status_line(now_playing)),
        UserCommand::Quit => return false,
        UserCommand::Unrecognized(line) => {
            println!("Unknown command `{line}`. Try next, prev, pause, loop, rate N, status or quit.");
        }
    }
    true
}

/// Drive `now_playing` until the user quits or playback goes idle.
pub fn run(now_playing: &mut NowPlaying, commands: &Receiver<UserCommand>) {
    now_playing.process_events();
    println!("{}", status_line(now_playing));

    loop {
        match commands.recv_timeout(POLL_INTERVAL) {
            Ok(command) => {
                if !apply(now_playing, command) {
                    info!("Session ended by the user");
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let before = now_playing.playing_index();
        now_playing.process_events();
        if now_playing.playing_index() != before && now_playing.playing_index().is_some() {
            println!("{}", status_line(now_playing));
        }
        if now_playing.phase() == PlaybackPhase::Idle {
            println!("Queue finished.");
            break;
        }
    }
}

/// Persist the last played record and the library.
pub fn save_session(now_playing: &NowPlaying, library: &SharedModel, config: &RuntimeConfig) -> Result<()> {
    let mut cache = Configure::load(&config.cache_path)?;
    now_playing.save_configure(&mut cache);
    cache
        .save(&config.cache_path)
        .context("Failed to save the last played record")?;

    let mut conn = db::connect(&config.db_path)?;
    db::save_library(&mut conn, &read(library))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FileReanalyzer;
    use crate::loop_state::LoopState;
    use crate::model::{write, MusicModel};
    use crate::now_playing::MusicTab;
    use crate::proxy::ProxyModel;
    use crate::track::TrackRecord;
    use std::sync::Arc;

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("next"), UserCommand::Next);
        assert_eq!(parse_line("  prev "), UserCommand::Previous);
        assert_eq!(parse_line("rate 4"), UserCommand::Rate(4));
        assert_eq!(parse_line("rate 9"), UserCommand::Unrecognized("rate 9".to_string()));
        assert_eq!(parse_line(""), UserCommand::Status);
        assert_eq!(parse_line("quit"), UserCommand::Quit);
        assert_eq!(parse_line("dance"), UserCommand::Unrecognized("dance".to_string()));
    }

    #[test]
    fn test_reader_quits_at_end_of_input() {
        let (tx, rx) = mpsc::channel();
        read_commands("next\nloop\n".as_bytes(), &tx);
        let commands: Vec<UserCommand> = rx.try_iter().collect();
        assert_eq!(
            commands,
            vec![UserCommand::Next, UserCommand::Loop, UserCommand::Quit]
        );
    }

    #[test]
    fn test_apply_loop_and_quit() {
        let mut now_playing = NowPlaying::new(Arc::new(FileReanalyzer));
        assert!(apply(&mut now_playing, UserCommand::Loop));
        assert_eq!(now_playing.loop_state(), LoopState::RepeatTrack);
        assert!(!apply(&mut now_playing, UserCommand::Quit));
    }

    #[test]
    fn test_idle_status_line() {
        let now_playing = NowPlaying::new(Arc::new(FileReanalyzer));
        assert_eq!(status_line(&now_playing), "[Idle] nothing playing, no repeat");
    }

    struct RadioTab;

    impl MusicTab for RadioTab {
        fn title(&self) -> String {
            "Radio".to_string()
        }
    }

    #[test]
    fn test_status_line_names_the_tab() {
        let model = MusicModel::shared("MusicModel/Radio");
        write(&model).append_rows(vec![TrackRecord::from_url("http://radio.example/stream")]);
        let proxy = ProxyModel::shared("ProxyModel/Radio");
        write(&proxy).set_source_model(Some(model));

        // Without a backend the load fails, but the row stays selected.
        let mut now_playing = NowPlaying::new(Arc::new(FileReanalyzer));
        now_playing.play_music_row(&proxy, 0, Some(Arc::new(RadioTab)));
        assert!(!now_playing.has_backend());

        let line = status_line(&now_playing);
        assert!(line.starts_with("[Failed] stream "), "{line}");
        assert!(line.ends_with(" from Radio"), "{line}");
    }
}
