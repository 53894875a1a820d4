//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `cadenza` binary.
//!
//! ## Commands
//!
//! - `import`: Scan a directory and add new tracks to the library
//! - `list`: Show the library, optionally filtered
//! - `play`: Play library rows or ad-hoc files through MPD
//! - `resume`: Continue where the last session stopped
//! - `completion`: Print a shell completion script
//!
//! ## Examples
//!
//! ```bash
//! cadenza import ~/Music
//! cadenza play --artist "Miles Davis" --sort time --loop shuffle
//! cadenza play ~/Downloads/demo.flac
//! cadenza resume
//! ```

use crate::loop_state::LoopState;
use crate::track::Column;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

#[derive(Parser, Debug)]
#[command(name = "cadenza")]
#[command(about = "Cadenza: a now-playing queue with loop, shuffle and resumable playback")]
#[command(version)]
pub struct Args {
    /// Keep the library, preferences and session cache here instead of the
    /// platform data directory
    #[arg(long, global = true, env = "CADENZA_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// View-model options shared by `list` and `play`.
#[derive(clap::Args, Debug, Default, Clone, PartialEq, Eq)]
pub struct ViewArgs {
    /// Only rows whose name, artist, album or genre contains this text
    #[arg(long, short)]
    pub filter: Option<String>,

    /// Only rows by this artist
    #[arg(long, conflicts_with_all = ["album", "genre"])]
    pub artist: Option<String>,

    /// Only rows from this album
    #[arg(long, conflicts_with = "genre")]
    pub album: Option<String>,

    /// Only rows of this genre
    #[arg(long)]
    pub genre: Option<String>,

    /// Sort column
    #[arg(long, value_enum)]
    pub sort: Option<Column>,

    /// Sort in descending order
    #[arg(long, requires = "sort")]
    pub descending: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add new tracks from a music directory to the library
    Import {
        /// Root of the music collection
        path: PathBuf,

        /// Maximum scan depth
        #[arg(long, default_value = "10")]
        scan_depth: usize,
    },

    /// List the library
    List {
        #[command(flatten)]
        view: ViewArgs,
    },

    /// Play through MPD
    ///
    /// Without paths, plays the library through the given view. With paths,
    /// plays those files from the temporary playlist.
    Play {
        /// Files to play instead of the library
        paths: Vec<PathBuf>,

        #[command(flatten)]
        view: ViewArgs,

        /// Repeat mode
        #[arg(long = "loop", value_enum, default_value = "no-repeat")]
        loop_state: LoopState,

        /// Row of the view to start at
        #[arg(long, default_value = "0")]
        row: usize,

        /// Continue after a track ends in no-repeat mode
        #[arg(long)]
        auto_next: bool,
    },

    /// Resume the last session, paused at its saved position
    Resume,

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },

    /// Print library titles for shell completion
    #[command(hide = true)]
    CompleteTitles,
}
