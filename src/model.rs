//! # Music Model (row store)
//!
//! A [`MusicModel`] owns an ordered list of [`TrackRecord`]s. Every row gets a
//! [`RowId`] when it enters the model; the id never changes while the row
//! lives and is never reused, so a playing marker stored as a `RowId` follows
//! its row through inserts, moves and removals of other rows and simply stops
//! resolving once its own row is gone.
//!
//! Observers subscribe to [`ModelEvent`]s. When a removal includes the playing
//! row, [`ModelEvent::PlayingItemRemoved`] is emitted before the generic
//! removal event so the now-playing controller can react first.
//!
//! Models are shared as [`SharedModel`] (`Arc<RwLock<MusicModel>>`). The
//! background importer commits whole batches under one write lock, so readers
//! only ever see fully-populated rows.

use crate::events::Broadcaster;
use crate::track::{AnalysisItem, TrackRecord};
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Identifier of the persistent library model.
pub const LIBRARY_MODEL: &str = "MusicModel/Library";
/// Identifier of the session-only temporary playlist.
pub const TEMPORARY_MODEL: &str = "MusicModel/TemporaryModel";

pub type SharedModel = Arc<RwLock<MusicModel>>;

/// Read-lock, recovering the data from a poisoned lock.
pub fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

/// Write-lock, recovering the data from a poisoned lock.
pub fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// Stable handle of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(u64);

/// Process-unique identity of a model instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelId(u64);

static NEXT_MODEL_ID: AtomicU64 = AtomicU64::new(1);

/// Change notifications of a music model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelEvent {
    RowsInserted { first: usize, count: usize },
    /// The playing row is about to disappear. Always precedes the
    /// `RowsRemoved` or `Reset` that removes it.
    PlayingItemRemoved,
    RowsRemoved { first: usize, count: usize },
    RowsMoved { from: usize, to: usize },
    DataChanged { first: usize, last: usize },
    Reset,
    WorkingChanged(bool),
}

#[derive(Debug, Clone)]
struct Row {
    id: RowId,
    record: TrackRecord,
}

#[derive(Debug)]
pub struct MusicModel {
    id: ModelId,
    identifier: String,
    rows: Vec<Row>,
    positions: HashMap<RowId, usize>,
    next_row_id: u64,
    playing: Option<RowId>,
    artwork: HashMap<RowId, Vec<u8>>,
    working: bool,
    revision: u64,
    events: Broadcaster<ModelEvent>,
}

impl MusicModel {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            id: ModelId(NEXT_MODEL_ID.fetch_add(1, Ordering::Relaxed)),
            identifier: identifier.into(),
            rows: Vec::new(),
            positions: HashMap::new(),
            next_row_id: 0,
            playing: None,
            artwork: HashMap::new(),
            working: false,
            revision: 0,
            events: Broadcaster::new(),
        }
    }

    /// A new empty model behind an `Arc<RwLock<_>>`.
    pub fn shared(identifier: impl Into<String>) -> SharedModel {
        Arc::new(RwLock::new(Self::new(identifier)))
    }

    #[must_use]
    pub fn id(&self) -> ModelId {
        self.id
    }

    /// Stable string used for persistence lookups only.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Bumped by every mutation. View models key their mapping cache on it.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn subscribe(&mut self) -> Receiver<ModelEvent> {
        self.events.subscribe()
    }

    // ----- structure -----

    pub fn append_row(&mut self, record: TrackRecord) -> RowId {
        let row = self.rows.len();
        let ids = self.splice_in(row, vec![record]);
        ids[0]
    }

    pub fn append_rows(&mut self, records: Vec<TrackRecord>) -> Vec<RowId> {
        let row = self.rows.len();
        self.splice_in(row, records)
    }

    /// Insert before `row`. `None` when `row` is past the end.
    pub fn insert_row(&mut self, row: usize, record: TrackRecord) -> Option<RowId> {
        self.insert_rows(row, vec![record]).map(|ids| ids[0])
    }

    pub fn insert_rows(&mut self, row: usize, records: Vec<TrackRecord>) -> Option<Vec<RowId>> {
        if row > self.rows.len() {
            return None;
        }
        Some(self.splice_in(row, records))
    }

    fn splice_in(&mut self, row: usize, records: Vec<TrackRecord>) -> Vec<RowId> {
        if records.is_empty() {
            return Vec::new();
        }
        let count = records.len();
        let new_rows: Vec<Row> = records
            .into_iter()
            .map(|record| {
                let id = RowId(self.next_row_id);
                self.next_row_id += 1;
                Row { id, record }
            })
            .collect();
        let ids = new_rows.iter().map(|r| r.id).collect();

        self.rows.splice(row..row, new_rows);
        self.reindex(row);
        self.revision += 1;
        trace!("{}: inserted {count} rows at {row}", self.identifier);
        self.events.emit(ModelEvent::RowsInserted { first: row, count });
        ids
    }

    /// Remove `count` rows starting at `first`.
    pub fn remove_rows(&mut self, first: usize, count: usize) -> bool {
        if count == 0 {
            return true;
        }
        let Some(end) = first.checked_add(count).filter(|end| *end <= self.rows.len()) else {
            return false;
        };

        let playing_row = self.playing_row();
        if playing_row.is_some_and(|row| (first..end).contains(&row)) {
            debug!("{}: playing row removed", self.identifier);
            self.events.emit(ModelEvent::PlayingItemRemoved);
            self.playing = None;
        }

        for row in self.rows.drain(first..end) {
            self.positions.remove(&row.id);
            self.artwork.remove(&row.id);
        }
        self.reindex(first);
        self.revision += 1;
        self.events.emit(ModelEvent::RowsRemoved { first, count });
        true
    }

    /// Remove an arbitrary set of rows, one contiguous run at a time from the
    /// bottom up.
    pub fn remove_row_list(&mut self, mut rows: Vec<usize>) {
        let len = self.rows.len();
        rows.retain(|row| *row < len);
        rows.sort_unstable();
        rows.dedup();

        while let Some(last) = rows.pop() {
            let mut first = last;
            while first > 0 && rows.last() == Some(&(first - 1)) {
                rows.pop();
                first -= 1;
            }
            self.remove_rows(first, last - first + 1);
        }
    }

    /// Move one row so it ends up at index `to`.
    pub fn move_row(&mut self, from: usize, to: usize) -> bool {
        if from >= self.rows.len() || to >= self.rows.len() {
            return false;
        }
        if from == to {
            return true;
        }
        let row = self.rows.remove(from);
        self.rows.insert(to, row);
        self.reindex(from.min(to));
        self.revision += 1;
        self.events.emit(ModelEvent::RowsMoved { from, to });
        true
    }

    pub fn clear(&mut self) {
        if self.playing_index().is_some() {
            self.events.emit(ModelEvent::PlayingItemRemoved);
        }
        self.playing = None;
        self.rows.clear();
        self.positions.clear();
        self.artwork.clear();
        self.revision += 1;
        self.events.emit(ModelEvent::Reset);
    }

    fn reindex(&mut self, from: usize) {
        for (row, entry) in self.rows.iter().enumerate().skip(from) {
            self.positions.insert(entry.id, row);
        }
    }

    // ----- data -----

    /// Replace a row with freshly analysed data. Play count and rating are
    /// user data and survive the update.
    pub fn update_row(&mut self, row: usize, item: &AnalysisItem) -> bool {
        let Some(entry) = self.rows.get_mut(row) else {
            return false;
        };
        let play_count = entry.record.play_count;
        let rating = entry.record.rating;
        entry.record = TrackRecord {
            play_count,
            rating,
            ..item.record.clone()
        };
        self.data_changed(row);
        true
    }

    /// Plain replacement, user data included.
    pub fn replace_row(&mut self, row: usize, record: TrackRecord) -> bool {
        let Some(entry) = self.rows.get_mut(row) else {
            return false;
        };
        entry.record = record;
        self.data_changed(row);
        true
    }

    /// Count one natural completion of the row.
    pub fn add_playing_times(&mut self, id: RowId) -> bool {
        let Some(row) = self.row_of(id) else {
            return false;
        };
        self.rows[row].record.play_count += 1;
        self.data_changed(row);
        true
    }

    pub fn set_cannot_play(&mut self, id: RowId, cannot_play: bool) -> bool {
        let Some(row) = self.row_of(id) else {
            return false;
        };
        if self.rows[row].record.cannot_play != cannot_play {
            self.rows[row].record.cannot_play = cannot_play;
            self.data_changed(row);
        }
        true
    }

    pub fn set_rating(&mut self, row: usize, rating: u8) -> bool {
        let Some(entry) = self.rows.get_mut(row) else {
            return false;
        };
        entry.record.rating = rating.min(5);
        self.data_changed(row);
        true
    }

    fn data_changed(&mut self, row: usize) {
        self.revision += 1;
        self.events.emit(ModelEvent::DataChanged {
            first: row,
            last: row,
        });
    }

    // ----- lookups -----

    #[must_use]
    pub fn row_id(&self, row: usize) -> Option<RowId> {
        self.rows.get(row).map(|entry| entry.id)
    }

    #[must_use]
    pub fn row_of(&self, id: RowId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    #[must_use]
    pub fn contains(&self, id: RowId) -> bool {
        self.positions.contains_key(&id)
    }

    #[must_use]
    pub fn record(&self, row: usize) -> Option<&TrackRecord> {
        self.rows.get(row).map(|entry| &entry.record)
    }

    #[must_use]
    pub fn record_by_id(&self, id: RowId) -> Option<&TrackRecord> {
        self.row_of(id).and_then(|row| self.record(row))
    }

    pub fn records(&self) -> impl Iterator<Item = &TrackRecord> {
        self.rows.iter().map(|entry| &entry.record)
    }

    pub fn entries(&self) -> impl Iterator<Item = (RowId, &TrackRecord)> {
        self.rows.iter().map(|entry| (entry.id, &entry.record))
    }

    /// First row equal to `record` in every field.
    #[must_use]
    pub fn detail_info_row(&self, record: &TrackRecord) -> Option<usize> {
        self.rows.iter().position(|entry| &entry.record == record)
    }

    /// First row with the same file path as `record`.
    #[must_use]
    pub fn detail_info_path_row(&self, record: &TrackRecord) -> Option<usize> {
        self.rows
            .iter()
            .position(|entry| entry.record.same_path(record))
    }

    /// Sum of all durations, in milliseconds.
    #[must_use]
    pub fn total_duration(&self) -> u64 {
        self.rows.iter().map(|entry| entry.record.duration).sum()
    }

    // ----- playing marker -----

    /// Replace the playing marker. A handle this model does not know clears
    /// the marker.
    pub fn set_playing_index(&mut self, id: Option<RowId>) {
        self.playing = id.filter(|id| self.contains(*id));
    }

    #[must_use]
    pub fn playing_index(&self) -> Option<RowId> {
        self.playing.filter(|id| self.contains(*id))
    }

    #[must_use]
    pub fn playing_row(&self) -> Option<usize> {
        self.playing.and_then(|id| self.row_of(id))
    }

    // ----- misc -----

    /// True while a background import is committing into this model.
    #[must_use]
    pub fn is_working(&self) -> bool {
        self.working
    }

    pub fn set_working(&mut self, working: bool) {
        if self.working != working {
            self.working = working;
            self.events.emit(ModelEvent::WorkingChanged(working));
        }
    }

    #[must_use]
    pub fn artwork(&self, id: RowId) -> Option<Vec<u8>> {
        self.artwork.get(&id).cloned()
    }

    pub fn set_artwork(&mut self, id: RowId, image: Vec<u8>) {
        if self.contains(id) {
            self.artwork.insert(id, image);
        }
    }
}

/// Explicit identifier → model lookup, handed to whoever needs to resolve a
/// persisted model identifier.
#[derive(Debug, Default, Clone)]
pub struct ModelRegistry {
    models: HashMap<String, SharedModel>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the model's own identifier, returning any model it
    /// replaced.
    pub fn register(&mut self, model: SharedModel) -> Option<SharedModel> {
        let identifier = read(&model).identifier().to_string();
        self.models.insert(identifier, model)
    }

    #[must_use]
    pub fn get(&self, identifier: &str) -> Option<SharedModel> {
        self.models.get(identifier).cloned()
    }

    pub fn remove(&mut self, identifier: &str) -> Option<SharedModel> {
        self.models.remove(identifier)
    }
}
