//! Session playlist for files and URLs that are not part of the library.

use crate::config::Configure;
use crate::model::{read, write, MusicModel, RowId, SharedModel, TEMPORARY_MODEL};
use crate::proxy::{ProxyModel, SharedProxy};
use crate::track::TrackRecord;
use log::{debug, warn};
use path_absolutize::Absolutize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

pub const MODEL_DATA: &str = "LastPlayed/ModelData";

#[derive(Debug)]
pub struct TemporaryPlaylist {
    model: SharedModel,
    proxy: SharedProxy,
}

impl Default for TemporaryPlaylist {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporaryPlaylist {
    #[must_use]
    pub fn new() -> Self {
        let model = MusicModel::shared(TEMPORARY_MODEL);
        let proxy = ProxyModel::shared("ProxyModel/Temporary");
        write(&proxy).set_source_model(Some(Arc::clone(&model)));
        Self { model, proxy }
    }

    #[must_use]
    pub fn model(&self) -> SharedModel {
        Arc::clone(&self.model)
    }

    #[must_use]
    pub fn proxy(&self) -> SharedProxy {
        Arc::clone(&self.proxy)
    }

    /// Append local files, skipping ones already in the playlist. Returns the
    /// row of the first requested file, whether new or already present.
    pub fn append_temporary_files<P: AsRef<Path>>(&self, paths: &[P]) -> Option<RowId> {
        let mut model = write(&self.model);
        let mut first = None;
        let mut fresh = Vec::new();

        for path in paths {
            let path = path.as_ref();
            let absolute = match path.absolutize() {
                Ok(absolute) => absolute.into_owned(),
                Err(e) => {
                    warn!("Skipping {}: {e}", path.display());
                    continue;
                }
            };
            let record = TrackRecord::from_path(&absolute);

            let known = model
                .detail_info_path_row(&record)
                .and_then(|row| model.row_id(row));
            match known {
                Some(id) => {
                    first.get_or_insert(Some(id));
                }
                None if fresh.iter().any(|r: &TrackRecord| r.same_path(&record)) => {}
                None => {
                    // The id is known after the batch is appended.
                    first.get_or_insert(None::<RowId>);
                    fresh.push(record);
                }
            }
        }

        let added = model.append_rows(fresh);
        debug!("Temporary playlist gained {} files", added.len());
        match first {
            Some(Some(id)) => Some(id),
            Some(None) => added.first().copied(),
            None => None,
        }
    }

    /// Replace the contents with a single URL row.
    pub fn set_online_url(&self, url: &str) -> RowId {
        let mut model = write(&self.model);
        model.clear();
        model.append_row(TrackRecord::from_url(url))
    }

    pub fn save_model_data(&self, cache: &mut Configure) {
        let model = read(&self.model);
        let records: Vec<&TrackRecord> = model.records().collect();
        match serde_json::to_value(records) {
            Ok(value) => cache.set_data(MODEL_DATA, value),
            Err(e) => warn!("Failed to serialize temporary playlist: {e}"),
        }
    }

    /// Replace the contents with the rows saved in `cache`. Returns the number
    /// of rows restored.
    pub fn load_model_data(&self, cache: &Configure) -> usize {
        let records: Vec<TrackRecord> = cache
            .data(MODEL_DATA)
            .cloned()
            .and_then(|value: Value| serde_json::from_value(value).ok())
            .unwrap_or_default();

        let mut model = write(&self.model);
        model.clear();
        model.append_rows(records).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_skips_duplicates() {
        let playlist = TemporaryPlaylist::new();
        let first = playlist
            .append_temporary_files(&["/music/a.mp3", "/music/b.mp3", "/music/a.mp3"])
            .unwrap();
        assert_eq!(read(&playlist.model).row_count(), 2);
        assert_eq!(read(&playlist.model).row_of(first), Some(0));

        let again = playlist
            .append_temporary_files(&["/music/b.mp3", "/music/c.mp3"])
            .unwrap();
        assert_eq!(read(&playlist.model).row_count(), 3);
        assert_eq!(read(&playlist.model).row_of(again), Some(1));
    }

    #[test]
    fn test_relative_paths_are_absolutized() {
        let playlist = TemporaryPlaylist::new();
        playlist.append_temporary_files(&["song.flac"]);
        let model = read(&playlist.model);
        assert!(Path::new(&model.record(0).unwrap().file_path).is_absolute());
    }

    #[test]
    fn test_online_url_replaces_contents() {
        let playlist = TemporaryPlaylist::new();
        playlist.append_temporary_files(&["/music/a.mp3"]);
        let id = playlist.set_online_url("http://radio.example/live");

        let model = read(&playlist.model);
        assert_eq!(model.row_count(), 1);
        assert!(model.record_by_id(id).unwrap().is_url());
    }

    #[test]
    fn test_model_data_round_trip() {
        let playlist = TemporaryPlaylist::new();
        playlist.append_temporary_files(&["/music/a.mp3", "/music/b.mp3"]);
        let mut cache = Configure::new();
        playlist.save_model_data(&mut cache);

        let restored = TemporaryPlaylist::new();
        assert_eq!(restored.load_model_data(&cache), 2);
        assert_eq!(
            read(&restored.model).record(1).unwrap().file_path,
            "/music/b.mp3"
        );
        assert_eq!(read(&restored.proxy).row_count(), 2);
    }
}
