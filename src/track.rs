//! Track records and analysis snapshots.
//!
//! A [`TrackRecord`] is one row of a [`MusicModel`](crate::model::MusicModel).
//! An [`AnalysisItem`] is the full snapshot the controller caches for the
//! track that is playing right now.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a track is stored in a row store.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Path of the media file. Empty for URL items.
    pub file_path: String,
    /// Transient online resource. Never persisted into the library.
    #[serde(default)]
    pub url: Option<String>,
    /// Cue sheet (or other index file) that split this track out of
    /// `file_path`.
    #[serde(default)]
    pub track_file_path: Option<String>,
    pub title: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub album: String,
    #[serde(default)]
    pub genre: String,
    /// Playable duration in milliseconds, 0 when unknown.
    #[serde(default)]
    pub duration: u64,
    /// Start of the sub-track inside `file_path`, in milliseconds.
    #[serde(default)]
    pub start_position: Option<u64>,
    #[serde(default)]
    pub play_count: u32,
    /// User rating, 0 to 5.
    #[serde(default)]
    pub rating: u8,
    /// Sticky flag set when reanalysis or loading failed.
    #[serde(default)]
    pub cannot_play: bool,
}

impl TrackRecord {
    /// Record for a local file, titled after its file stem.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            file_path: path.to_string_lossy().into_owned(),
            title,
            ..Self::default()
        }
    }

    /// Record for an online resource.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            title: url.rsplit('/').next().unwrap_or(url).to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_url(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.is_empty())
    }

    /// What the backend should open: the URL for online items, otherwise the
    /// file path.
    #[must_use]
    pub fn resource(&self) -> &str {
        match &self.url {
            Some(url) if !url.is_empty() => url,
            _ => &self.file_path,
        }
    }

    /// Path-only equality, ignoring the sub-track information.
    #[must_use]
    pub fn same_path(&self, other: &TrackRecord) -> bool {
        self.file_path == other.file_path
    }

    /// `(start, duration)` in milliseconds when this record is a sub-track.
    #[must_use]
    pub fn section(&self) -> Option<(u64, u64)> {
        self.start_position.map(|start| (start, self.duration))
    }

    /// Text used by filters, sort keys and categories.
    #[must_use]
    pub fn text(&self, column: Column) -> String {
        match column {
            Column::Name => self.title.clone(),
            Column::Artist => self.artist.clone(),
            Column::Album => self.album.clone(),
            Column::Genre => self.genre.clone(),
            Column::Time => format_duration(self.duration),
            Column::Plays => self.play_count.to_string(),
            Column::Rating => self.rating.to_string(),
            Column::FilePath => self.resource().to_string(),
        }
    }
}

/// Columns a view model can filter, sort or categorise on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum Column {
    Name,
    Artist,
    Album,
    Genre,
    Time,
    Plays,
    Rating,
    FilePath,
}

impl Column {
    /// Columns searched by a filter that names no column.
    pub const TEXT: [Column; 4] = [Column::Name, Column::Artist, Column::Album, Column::Genre];

    /// Numeric columns compare by value, not by their text.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Column::Time | Column::Plays | Column::Rating)
    }
}

/// Full metadata snapshot of the playing track.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnalysisItem {
    pub record: TrackRecord,
    /// Cover art bytes, taken from the row store cache for URL items.
    pub cover_image: Option<Vec<u8>>,
}

impl AnalysisItem {
    #[must_use]
    pub fn new(record: TrackRecord) -> Self {
        Self {
            record,
            cover_image: None,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record.file_path.is_empty() && !self.record.is_url()
    }
}

/// `m:ss` rendering of a millisecond duration.
#[must_use]
pub fn format_duration(millis: u64) -> String {
    let seconds = millis / 1000;
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
