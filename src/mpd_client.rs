//! # MPD Backend
//!
//! Plays through Music Player Daemon using the `mpc` command-line client.
//!
//! MPD's queue is used as a one-track deck: every load clears it and adds the
//! requested resource. Local files are added by absolute path, which MPD
//! accepts over its local socket; URLs are added as they are.
//!
//! MPD never calls back, so [`MpdBackend::tick`] polls `mpc status` and
//! reports [`BackendEvent::Finished`] when a loaded track stops on its own or
//! a sub-track section passes its end.
//!
//! ```text
//! artist/album/song.mp3
//! [playing] #1/1   1:23/3:45 (37%)
//! volume: 80%   repeat: off   random: off   single: off   consume: off
//! ```

use crate::backend::{BackendEvent, LoadTicket, MusicBackend};
use anyhow::{Context, Result};
use log::{debug, warn};
use std::process::Command;
use std::sync::mpsc::{self, Receiver, Sender};

/// Verifies MPD and mpc availability.
///
/// # Errors
///
/// Returns an error if mpc is not installed or MPD does not answer.
pub fn get_client() -> Result<()> {
    let output = Command::new("mpc")
        .arg("version")
        .output()
        .context("Failed to execute mpc command. Please install mpc (MPD client)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!(
            "Failed to connect to MPD. Make sure MPD is running on localhost:6600.\nError: {}",
            stderr.trim()
        );
    }

    Ok(())
}

/// Run one `mpc` command and return its standard output.
fn mpc(args: &[&str]) -> Result<String> {
    let output = Command::new("mpc")
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute mpc {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("mpc {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpdState {
    Play,
    Pause,
    Stop,
}

/// Parsed `mpc status` output.
#[derive(Debug, Clone, PartialEq)]
pub struct MpdStatus {
    /// Current song, None if nothing is queued
    pub current_song: Option<String>,
    /// Elapsed time in seconds
    pub elapsed: f64,
    /// Total duration in seconds, None for streams
    pub duration: Option<f64>,
    pub state: MpdState,
}

/// Get current MPD status by parsing `mpc status -f %file%`.
pub fn get_mpd_status() -> Result<MpdStatus> {
    let text = mpc(&["status", "-f", "%file%"]).context("Failed to get MPD status")?;
    Ok(parse_status(&text))
}

/// Parse `mpc status` output. A stopped MPD prints only the options line.
#[must_use]
pub fn parse_status(text: &str) -> MpdStatus {
    let lines: Vec<&str> = text.lines().collect();
    let status_line = lines.iter().position(|line| line.trim_start().starts_with('['));

    let current_song = status_line
        .filter(|index| *index > 0)
        .map(|_| lines[0].trim())
        .filter(|song| !song.is_empty())
        .map(str::to_string);

    let mut elapsed = 0.0;
    let mut duration = None;
    let mut state = MpdState::Stop;

    if let Some(line) = status_line.map(|index| lines[index]) {
        if line.contains("[playing]") {
            state = MpdState::Play;
        } else if line.contains("[paused]") {
            state = MpdState::Pause;
        }

        // Format: [playing] #1/50   0:32/3:45 (13%)
        if let Some(time_part) = line
            .split_whitespace()
            .find(|part| part.contains('/') && part.contains(':'))
        {
            if let Some((current, total)) = time_part.split_once('/') {
                if let Ok(seconds) = parse_time(current) {
                    elapsed = seconds;
                }
                duration = parse_time(total).ok().filter(|seconds| *seconds > 0.0);
            }
        }
    }

    MpdStatus {
        current_song,
        elapsed,
        duration,
        state,
    }
}

/// Parse time string in MM:SS format to seconds
pub fn parse_time(time_str: &str) -> Result<f64> {
    let parts: Vec<&str> = time_str.split(':').collect();
    match parts.len() {
        2 => {
            let minutes: f64 = parts[0].parse()?;
            let seconds: f64 = parts[1].parse()?;
            Ok(minutes * 60.0 + seconds)
        }
        _ => anyhow::bail!("Invalid time format: {}", time_str),
    }
}

#[derive(Debug, Clone, Copy)]
struct Loaded {
    ticket: LoadTicket,
    /// `(start, duration)` in milliseconds.
    section: Option<(u64, u64)>,
}

impl Loaded {
    fn start(&self) -> i64 {
        self.section
            .map_or(0, |(start, _)| i64::try_from(start).unwrap_or(i64::MAX))
    }
}

#[derive(Debug)]
pub struct MpdBackend {
    events: Sender<BackendEvent>,
    loaded: Option<Loaded>,
    started: bool,
    playing: bool,
    pending_seek: Option<i64>,
    last_position: i64,
}

impl MpdBackend {
    /// A backend and the channel its load answers arrive on.
    pub fn new() -> (Self, Receiver<BackendEvent>) {
        let (events, rx) = mpsc::channel();
        let backend = Self {
            events,
            loaded: None,
            started: false,
            playing: false,
            pending_seek: None,
            last_position: 0,
        };
        (backend, rx)
    }

    fn send(&self, event: BackendEvent) {
        if self.events.send(event).is_err() {
            debug!("Nobody listens to MPD events any more");
        }
    }

    fn load(&mut self, ticket: LoadTicket, resource: &str, section: Option<(u64, u64)>) {
        self.loaded = None;
        self.started = false;
        self.playing = false;
        self.pending_seek = None;
        self.last_position = 0;

        let result = mpc(&["clear"]).and_then(|_| mpc(&["add", resource]));
        match result {
            Ok(_) => {
                debug!("MPD loaded {resource}");
                self.loaded = Some(Loaded { ticket, section });
                self.send(BackendEvent::LoadSuccess(ticket));
            }
            Err(e) => {
                warn!("MPD cannot load {resource}: {e:#}");
                self.send(BackendEvent::LoadFailed(ticket));
            }
        }
    }

    fn seek_absolute(position: i64) -> Result<()> {
        let seconds = (position.max(0) / 1000).to_string();
        mpc(&["seek", &seconds]).map(|_| ())
    }

    fn finish(&mut self, loaded: Loaded) {
        self.playing = false;
        self.started = false;
        self.send(BackendEvent::Finished(loaded.ticket));
    }
}

impl MusicBackend for MpdBackend {
    fn load_music(&mut self, ticket: LoadTicket, resource: &str) {
        self.load(ticket, resource, None);
    }

    fn load_music_section(&mut self, ticket: LoadTicket, resource: &str, start: u64, duration: u64) {
        self.load(ticket, resource, Some((start, duration)));
    }

    fn play(&mut self) {
        let Some(loaded) = self.loaded else {
            return;
        };
        if let Err(e) = mpc(&["play"]) {
            warn!("MPD cannot play: {e:#}");
            return;
        }

        let seek = match self.pending_seek.take() {
            Some(position) => Some(loaded.start() + position),
            None if !self.started && loaded.section.is_some() => Some(loaded.start()),
            None => None,
        };
        if let Some(position) = seek {
            if let Err(e) = Self::seek_absolute(position) {
                warn!("MPD cannot seek: {e:#}");
            }
        }
        self.started = true;
        self.playing = true;
    }

    fn pause(&mut self) {
        if self.playing {
            if let Err(e) = mpc(&["pause"]) {
                warn!("MPD cannot pause: {e:#}");
            }
        }
        self.playing = false;
    }

    fn reset(&mut self) {
        if self.loaded.take().is_some() {
            if let Err(e) = mpc(&["stop"]).and_then(|_| mpc(&["clear"])) {
                warn!("MPD cannot reset: {e:#}");
            }
        }
        self.started = false;
        self.playing = false;
        self.pending_seek = None;
        self.last_position = 0;
    }

    fn set_position(&mut self, position: i64) {
        let Some(loaded) = self.loaded else {
            return;
        };
        self.last_position = position;
        // MPD only seeks in a started song.
        if !self.started {
            self.pending_seek = Some(position);
            return;
        }
        if let Err(e) = Self::seek_absolute(loaded.start() + position) {
            warn!("MPD cannot seek: {e:#}");
        }
    }

    fn position(&self) -> i64 {
        let Some(loaded) = self.loaded else {
            return -1;
        };
        if !self.started {
            return self.pending_seek.unwrap_or(self.last_position);
        }
        match get_mpd_status() {
            // Truncation to whole milliseconds is fine.
            #[allow(clippy::cast_possible_truncation)]
            Ok(status) => ((status.elapsed * 1000.0) as i64 - loaded.start()).max(0),
            Err(_) => self.last_position,
        }
    }

    fn tick(&mut self) {
        let Some(loaded) = self.loaded else {
            return;
        };
        if !self.playing {
            return;
        }

        let status = match get_mpd_status() {
            Ok(status) => status,
            Err(e) => {
                warn!("Lost MPD: {e:#}");
                return;
            }
        };

        #[allow(clippy::cast_possible_truncation)]
        let elapsed = (status.elapsed * 1000.0) as i64;
        self.last_position = (elapsed - loaded.start()).max(0);

        if status.state == MpdState::Stop {
            self.finish(loaded);
            return;
        }
        if let Some((start, duration)) = loaded.section {
            let end = i64::try_from(start.saturating_add(duration)).unwrap_or(i64::MAX);
            if duration > 0 && elapsed >= end {
                if let Err(e) = mpc(&["stop"]) {
                    warn!("MPD cannot stop: {e:#}");
                }
                self.finish(loaded);
            }
        }
    }
}
