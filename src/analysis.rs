//! Reanalysis: refresh a track's metadata right before it plays.

use crate::track::AnalysisItem;
use log::debug;
use std::path::Path;

pub trait Reanalyzer: Send + Sync {
    /// Refresh `item` in place. `false` means the track cannot be played.
    fn reanalysis_item(&self, item: &mut AnalysisItem) -> bool;
}

/// Checks that local files still exist.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileReanalyzer;

impl Reanalyzer for FileReanalyzer {
    fn reanalysis_item(&self, item: &mut AnalysisItem) -> bool {
        let record = &mut item.record;
        if record.is_url() {
            return true;
        }

        let path = Path::new(&record.file_path);
        if !path.is_file() {
            debug!("{} is gone", record.file_path);
            return false;
        }

        if record.title.is_empty() {
            if let Some(stem) = path.file_stem() {
                record.title = stem.to_string_lossy().into_owned();
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackRecord;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_fails() {
        let mut item = AnalysisItem::new(TrackRecord::from_path(Path::new("/no/such/file.mp3")));
        assert!(!FileReanalyzer.reanalysis_item(&mut item));
    }

    #[test]
    fn test_existing_file_gets_title() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Opening.ogg");
        fs::write(&path, b"ogg").unwrap();

        let mut item = AnalysisItem::new(TrackRecord {
            file_path: path.to_string_lossy().into_owned(),
            ..TrackRecord::default()
        });
        assert!(FileReanalyzer.reanalysis_item(&mut item));
        assert_eq!(item.record.title, "Opening");
    }

    #[test]
    fn test_urls_pass() {
        let mut item = AnalysisItem::new(TrackRecord::from_url("http://radio.example/live"));
        assert!(FileReanalyzer.reanalysis_item(&mut item));
    }
}
