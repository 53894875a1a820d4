//! Library import: find music files under a directory and commit them into a
//! row store.
//!
//! Scanning and analysis happen without holding the model lock. The new rows
//! are committed by a single `append_rows` under one write lock, so readers
//! see either none or all of an import.

use crate::model::{write, MusicModel, SharedModel};
use crate::track::TrackRecord;
use anyhow::{ensure, Context, Result};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

/// Lower-case suffixes recognised as music files.
pub const SUPPORTED_SUFFIXES: &[&str] = &[
    "aac", "aiff", "ape", "flac", "m4a", "mp3", "ogg", "opus", "wav", "wma", "wv",
];

#[must_use]
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|suffix| suffix.to_str())
        .is_some_and(|suffix| SUPPORTED_SUFFIXES.contains(&suffix.to_lowercase().as_str()))
}

/// Collect music files below `dir`, descending at most `depth` directory
/// levels. Results are sorted by path.
pub fn scan_directory(dir: &Path, depth: usize) -> Result<Vec<PathBuf>> {
    ensure!(dir.is_dir(), "Argument `{}` is not a directory!", dir.display());

    let mut files = Vec::new();
    scan_into(dir, depth, &mut files)?;
    files.sort();
    debug!("Found {} music files in {}", files.len(), dir.display());
    Ok(files)
}

fn scan_into(dir: &Path, depth: usize, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {e}", dir.display());
                continue;
            }
        };

        if path.is_dir() {
            if depth > 0 {
                scan_into(&path, depth - 1, files)?;
            }
        } else if is_supported(&path) {
            files.push(path);
        }
    }
    Ok(())
}

/// Derive a record from a file's location: `Artist - Title.ext`, or
/// `Artist/Album/Title.ext`.
#[must_use]
pub fn analyse_file(path: &Path) -> TrackRecord {
    let mut record = TrackRecord::from_path(path);

    let album_dir = path.parent();
    if let Some(album) = album_dir.and_then(Path::file_name) {
        record.album = album.to_string_lossy().into_owned();
    }

    match record.title.split_once(" - ") {
        Some((artist, title)) => {
            record.artist = artist.trim().to_string();
            record.title = title.trim().to_string();
        }
        None => {
            if let Some(artist) = album_dir.and_then(Path::parent).and_then(Path::file_name) {
                record.artist = artist.to_string_lossy().into_owned();
            }
        }
    }
    record
}

/// Analyse every path in parallel, keeping the input order.
#[must_use]
pub fn analyse_files(paths: &[PathBuf]) -> Vec<TrackRecord> {
    paths.par_iter().map(|path| analyse_file(path)).collect()
}

/// Append the new files found under `dir` to `model`. Files already in the
/// model are skipped. Returns the number of rows added.
pub fn import_into(model: &SharedModel, dir: &Path, depth: usize) -> Result<usize> {
    let files = scan_directory(dir, depth)?;
    let records = analyse_files(&files);

    let mut model = write(model);
    Ok(commit(&mut model, records))
}

fn commit(model: &mut MusicModel, records: Vec<TrackRecord>) -> usize {
    let known: HashSet<String> = model
        .records()
        .map(|record| record.file_path.clone())
        .collect();
    let fresh: Vec<TrackRecord> = records
        .into_iter()
        .filter(|record| !known.contains(&record.file_path))
        .collect();
    model.append_rows(fresh).len()
}

/// Run [`import_into`] on a worker thread, flagging the model as working
/// until it finishes.
pub fn spawn_import(model: SharedModel, dir: PathBuf, depth: usize) -> JoinHandle<Result<usize>> {
    write(&model).set_working(true);
    thread::spawn(move || {
        let result = import_into(&model, &dir, depth);
        write(&model).set_working(false);
        match &result {
            Ok(count) => info!("Imported {count} new tracks from {}", dir.display()),
            Err(e) => warn!("Import from {} failed: {e:#}", dir.display()),
        }
        result
    })
}
