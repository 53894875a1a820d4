//! Now-playing queue engine: decides which track plays next from a filtered,
//! sorted view of a track list, and remembers where it stopped.
//!
//! Core modules:
//! - [`now_playing`] - The playback queue controller
//! - [`model`] - Row stores holding track records and the playing marker
//! - [`proxy`] - Filtered and sorted views over a row store
//! - [`loop_state`] - Repeat and shuffle modes
//! - [`backend`] - The audio backend seam, with [`mpd_client`] as the real one
//!
//! ### Supporting Modules
//!
//! - [`track`] - Track records and analysis snapshots
//! - [`analysis`] - Pre-play reanalysis
//! - [`temporary`] - Ad-hoc files and URLs outside the library
//! - [`events`] - Notification fan-out
//! - [`config`] - Data directory, preferences and the session cache
//! - [`db`] - SQLite persistence of the library
//! - [`import`] - Directory scanning
//! - [`session`] - Interactive foreground session
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use cadenza::analysis::FileReanalyzer;
//! use cadenza::loop_state::LoopState;
//! use cadenza::model::{write, MusicModel, LIBRARY_MODEL};
//! use cadenza::mpd_client::MpdBackend;
//! use cadenza::now_playing::NowPlaying;
//! use cadenza::proxy::{ProxyModel, SortOrder};
//! use cadenza::track::{Column, TrackRecord};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! let library = MusicModel::shared(LIBRARY_MODEL);
//! write(&library).append_row(TrackRecord::from_path(Path::new("/music/a.flac")));
//!
//! let view = ProxyModel::shared("ProxyModel/Library");
//! write(&view).set_source_model(Some(Arc::clone(&library)));
//! write(&view).sort(Column::Name, SortOrder::Ascending);
//!
//! let mut now_playing = NowPlaying::new(Arc::new(FileReanalyzer));
//! let (backend, events) = MpdBackend::new();
//! now_playing.set_backend(Box::new(backend), events);
//! now_playing.set_loop_state(LoopState::RepeatAll);
//! now_playing.play_music_row(&view, 0, None);
//! now_playing.process_events();
//! ```
//!
//! ## Queue Rules
//!
//! - **No repeat**: a finished track stops playback unless auto-next is on
//! - **Repeat track**: a finished track replays from the start
//! - **Repeat all**: stepping past either end wraps around
//! - **Shuffle**: every step picks a different row of the view at random
//!
//! A track that fails to load while the queue advances on its own is marked
//! unplayable and skipped, moving linearly and never wrapping. A track the
//! user picked stops the queue instead.

pub mod analysis;
pub mod backend;
pub mod cli;
pub mod completion;
pub mod config;
pub mod db;
pub mod events;
pub mod import;
pub mod loop_state;
pub mod model;
pub mod mpd_client;
pub mod now_playing;
pub mod proxy;
pub mod session;
pub mod temporary;
pub mod track;
