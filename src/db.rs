//! SQLite persistence of the library row store.
//!
//! The whole library is written back in one transaction, so the file always
//! holds either the previous or the new snapshot.

use crate::model::MusicModel;
use crate::track::TrackRecord;
use anyhow::{Context, Result};
use log::{debug, trace};
use rusqlite::{Connection, Row};
use std::fs;
use std::path::Path;

/// Connect to the library at `db_path`, creating the file if needed.
pub fn connect(db_path: &Path) -> Result<Connection> {
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("Rusqlite DB connection refused. DB location: {db_path:?}"))?;
    init(&conn)?;
    Ok(conn)
}

/// Adds the `track` table if it is missing.
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS track (
            id              INTEGER PRIMARY KEY,
            position        INTEGER NOT NULL,
            path            TEXT    NOT NULL,
            track_file_path TEXT,
            title           TEXT    NOT NULL,
            artist          TEXT    NOT NULL DEFAULT '',
            album           TEXT    NOT NULL DEFAULT '',
            genre           TEXT    NOT NULL DEFAULT '',
            duration        INTEGER NOT NULL DEFAULT 0,
            start_position  INTEGER,
            play_count      INTEGER NOT NULL DEFAULT 0,
            rating          INTEGER NOT NULL DEFAULT 0,
            cannot_play     INTEGER NOT NULL DEFAULT 0
        )",
        (),
    )
    .with_context(|| format!("Invalid SQL command when CREATEing track TABLE in `{conn:?}`."))?;
    Ok(())
}

fn to_sql_millis(millis: u64) -> i64 {
    i64::try_from(millis).unwrap_or(i64::MAX)
}

fn from_sql_millis(millis: i64) -> u64 {
    u64::try_from(millis).unwrap_or(0)
}

fn track_from_row(row: &Row<'_>) -> rusqlite::Result<TrackRecord> {
    Ok(TrackRecord {
        file_path: row.get(0)?,
        track_file_path: row.get(1)?,
        title: row.get(2)?,
        artist: row.get(3)?,
        album: row.get(4)?,
        genre: row.get(5)?,
        duration: from_sql_millis(row.get(6)?),
        start_position: row.get::<_, Option<i64>>(7)?.map(from_sql_millis),
        play_count: row.get(8)?,
        rating: row.get(9)?,
        cannot_play: row.get(10)?,
        url: None,
    })
}

/// Append every stored track to `model`, in library order. Returns the
/// number of rows loaded.
pub fn load_library(conn: &Connection, model: &mut MusicModel) -> Result<usize> {
    let mut stmt = conn
        .prepare(
            "SELECT path, track_file_path, title, artist, album, genre, duration,
                    start_position, play_count, rating, cannot_play
             FROM track ORDER BY position",
        )
        .with_context(|| format!("Invalid SQL statement when SELECTing tracks in {conn:?}."))?;

    let records = stmt
        .query_map([], track_from_row)
        .context("Cannot query tracks.")?
        .collect::<Result<Vec<_>, _>>()
        .context("Queried track unwrap failed.")?;

    let count = model.append_rows(records).len();
    debug!("Loaded {count} tracks from the library");
    Ok(count)
}

/// Replace the stored library with the contents of `model`. URL rows are
/// transient and skipped.
pub fn save_library(conn: &mut Connection, model: &MusicModel) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut saved: i64 = 0;

    {
        tx.execute("DELETE FROM track", ())
            .context("Failed to clear the track table")?;

        let mut stmt = tx.prepare(
            "INSERT INTO track (position, path, track_file_path, title, artist, album, genre,
                                duration, start_position, play_count, rating, cannot_play)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;

        for record in model.records().filter(|record| !record.is_url()) {
            trace!("Saving {}", record.file_path);
            stmt.execute((
                saved,
                &record.file_path,
                &record.track_file_path,
                &record.title,
                &record.artist,
                &record.album,
                &record.genre,
                to_sql_millis(record.duration),
                record.start_position.map(to_sql_millis),
                record.play_count,
                record.rating,
                record.cannot_play,
            ))
            .with_context(|| {
                format!("Invalid SQL statement when INSERTing track INTO database!\nTrack: {record:?}")
            })?;
            saved += 1;
        }
    }

    tx.commit().context("Commiting SQL transaction failed.")?;
    debug!("Saved {saved} tracks to the library");
    Ok(usize::try_from(saved).unwrap_or_default())
}

pub fn count_tracks(conn: &Connection) -> Result<usize> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM track", [], |row| row.get(0))
        .context("Could not count database entries.")?;
    Ok(usize::try_from(count).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LIBRARY_MODEL;
    use tempfile::TempDir;

    fn sample_model() -> MusicModel {
        let mut model = MusicModel::new(LIBRARY_MODEL);
        model.append_rows(vec![
            TrackRecord {
                file_path: "/music/live.flac".to_string(),
                track_file_path: Some("/music/live.cue".to_string()),
                title: "Opening".to_string(),
                artist: "Band".to_string(),
                duration: 240_000,
                start_position: Some(0),
                play_count: 4,
                rating: 5,
                ..TrackRecord::default()
            },
            TrackRecord {
                file_path: "/music/broken.mp3".to_string(),
                title: "Broken".to_string(),
                cannot_play: true,
                ..TrackRecord::default()
            },
        ]);
        model.append_row(TrackRecord::from_url("http://radio.example/live"));
        model
    }

    #[test]
    fn test_library_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = connect(&dir.path().join("library.db"))?;

        let model = sample_model();
        assert_eq!(save_library(&mut conn, &model)?, 2);
        assert_eq!(count_tracks(&conn)?, 2);

        let mut loaded = MusicModel::new(LIBRARY_MODEL);
        assert_eq!(load_library(&conn, &mut loaded)?, 2);
        assert_eq!(loaded.record(0), model.record(0));
        assert_eq!(loaded.record(1), model.record(1));
        Ok(())
    }

    #[test]
    fn test_save_replaces_previous_snapshot() -> Result<()> {
        let dir = TempDir::new()?;
        let mut conn = connect(&dir.path().join("library.db"))?;

        let mut model = sample_model();
        save_library(&mut conn, &model)?;
        model.remove_rows(0, 1);
        save_library(&mut conn, &model)?;

        assert_eq!(count_tracks(&conn)?, 1);
        Ok(())
    }
}
