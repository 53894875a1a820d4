//! # Proxy Model (view model)
//!
//! A [`ProxyModel`] is a non-owning, filtered / sorted / categorised
//! projection of one [`MusicModel`]. Its configuration lives in a
//! serialisable [`ProxyState`]; the row mapping is derived from that state
//! and the source contents only, and cached until either changes.
//!
//! Detaching the source keeps the configuration so it can be applied to the
//! next source unchanged.

use crate::model::{read, ModelId, MusicModel, RowId, SharedModel};
use crate::track::{Column, TrackRecord};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

pub type SharedProxy = Arc<RwLock<ProxyModel>>;

/// One filter predicate: a case-insensitive substring match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchBlock {
    /// Column to search; `None` searches every text column.
    #[serde(default)]
    pub column: Option<Column>,
    pub text: String,
}

impl SearchBlock {
    pub fn new(column: Option<Column>, text: impl Into<String>) -> Self {
        Self {
            column,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn matches(&self, record: &TrackRecord) -> bool {
        let needle = self.text.to_lowercase();
        if needle.is_empty() {
            return true;
        }
        match self.column {
            Some(column) => record.text(column).to_lowercase().contains(&needle),
            None => Column::TEXT
                .iter()
                .any(|column| record.text(*column).to_lowercase().contains(&needle)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: Column,
    pub order: SortOrder,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl SortKey {
    fn compare(&self, a: &TrackRecord, b: &TrackRecord) -> Ordering {
        let ordering = if self.column.is_numeric() {
            numeric(a, self.column).cmp(&numeric(b, self.column))
        } else if self.case_sensitive {
            a.text(self.column).cmp(&b.text(self.column))
        } else {
            a.text(self.column)
                .to_lowercase()
                .cmp(&b.text(self.column).to_lowercase())
        };

        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

fn numeric(record: &TrackRecord, column: Column) -> u64 {
    match column {
        Column::Time => record.duration,
        Column::Plays => u64::from(record.play_count),
        Column::Rating => u64::from(record.rating),
        _ => 0,
    }
}

/// Restriction to one artist / album / genre.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub column: Column,
    pub content: String,
}

impl Category {
    pub fn new(column: Column, content: impl Into<String>) -> Self {
        Self {
            column,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn matches(&self, record: &TrackRecord) -> bool {
        record.text(self.column).to_lowercase() == self.content.to_lowercase()
    }
}

/// Transportable filter + sort + category configuration.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyState {
    #[serde(default)]
    pub search_blocks: Vec<SearchBlock>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub sort: Option<SortKey>,
}

impl ProxyState {
    #[must_use]
    pub fn accepts(&self, record: &TrackRecord) -> bool {
        self.category
            .as_ref()
            .map_or(true, |category| category.matches(record))
            && self.search_blocks.iter().all(|block| block.matches(record))
    }
}

struct Mapping {
    model: ModelId,
    revision: u64,
    rows: Vec<RowId>,
    proxy_rows: HashMap<RowId, usize>,
}

impl Mapping {
    fn build(model: &MusicModel, state: &ProxyState) -> Self {
        let mut accepted: Vec<(RowId, &TrackRecord)> = model
            .entries()
            .filter(|(_, record)| state.accepts(record))
            .collect();

        // Stable: equal keys keep source order.
        if let Some(sort) = &state.sort {
            accepted.sort_by(|(_, a), (_, b)| sort.compare(a, b));
        }

        let rows: Vec<RowId> = accepted.into_iter().map(|(id, _)| id).collect();
        let proxy_rows = rows.iter().enumerate().map(|(row, id)| (*id, row)).collect();

        Self {
            model: model.id(),
            revision: model.revision(),
            rows,
            proxy_rows,
        }
    }
}

pub struct ProxyModel {
    identifier: String,
    source: Option<SharedModel>,
    state: ProxyState,
    mapping: Mutex<Option<Mapping>>,
}

impl fmt::Debug for ProxyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyModel")
            .field("identifier", &self.identifier)
            .field("has_source", &self.source.is_some())
            .field("state", &self.state)
            .finish()
    }
}

impl ProxyModel {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            source: None,
            state: ProxyState::default(),
            mapping: Mutex::new(None),
        }
    }

    pub fn shared(identifier: impl Into<String>) -> SharedProxy {
        Arc::new(RwLock::new(Self::new(identifier)))
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Attach a new source, or detach with `None`. The configuration is kept.
    pub fn set_source_model(&mut self, source: Option<SharedModel>) {
        self.source = source;
        self.invalidate();
    }

    #[must_use]
    pub fn source_model(&self) -> Option<SharedModel> {
        self.source.clone()
    }

    /// True when `model` is this proxy's current source.
    #[must_use]
    pub fn is_source(&self, model: &SharedModel) -> bool {
        self.source
            .as_ref()
            .is_some_and(|source| Arc::ptr_eq(source, model))
    }

    // ----- configuration -----

    #[must_use]
    pub fn search_blocks(&self) -> &[SearchBlock] {
        &self.state.search_blocks
    }

    pub fn set_search_blocks(&mut self, blocks: Vec<SearchBlock>) {
        self.state.search_blocks = blocks;
        self.invalidate();
    }

    pub fn add_search_block(&mut self, block: SearchBlock) {
        self.state.search_blocks.push(block);
        self.invalidate();
    }

    pub fn clear_search_block(&mut self) {
        self.state.search_blocks.clear();
        self.invalidate();
    }

    #[must_use]
    pub fn category(&self) -> Option<&Category> {
        self.state.category.as_ref()
    }

    pub fn set_category(&mut self, category: Option<Category>) {
        self.state.category = category;
        self.invalidate();
    }

    /// Sort on `column`. Case sensitivity of an existing sort is kept.
    pub fn sort(&mut self, column: Column, order: SortOrder) {
        let case_sensitive = self.state.sort.is_some_and(|sort| sort.case_sensitive);
        self.state.sort = Some(SortKey {
            column,
            order,
            case_sensitive,
        });
        self.invalidate();
    }

    pub fn set_sort_case_sensitivity(&mut self, case_sensitive: bool) {
        if let Some(sort) = &mut self.state.sort {
            sort.case_sensitive = case_sensitive;
            self.invalidate();
        }
    }

    pub fn clear_sort(&mut self) {
        self.state.sort = None;
        self.invalidate();
    }

    #[must_use]
    pub fn sort_key(&self) -> Option<SortKey> {
        self.state.sort
    }

    #[must_use]
    pub fn proxy_state(&self) -> ProxyState {
        self.state.clone()
    }

    pub fn load_proxy_state(&mut self, state: ProxyState) {
        self.state = state;
        self.invalidate();
    }

    /// Deep copy of another proxy's configuration and source.
    pub fn copy_configuration_from(&mut self, other: &ProxyModel) {
        // Detach first so the intermediate states never get mapped.
        self.source = None;
        self.state = other.state.clone();
        self.source = other.source.clone();
        self.invalidate();
    }

    fn invalidate(&mut self) {
        *self.mapping.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
    }

    // ----- mapping -----

    fn with_mapping<R>(&self, f: impl FnOnce(&MusicModel, &Mapping) -> R) -> Option<R> {
        let source = self.source.as_ref()?;
        let model = read(source);
        let mut cache = self.mapping.lock().unwrap_or_else(PoisonError::into_inner);

        let fresh = cache
            .as_ref()
            .is_some_and(|m| m.model == model.id() && m.revision == model.revision());
        if !fresh {
            *cache = Some(Mapping::build(&model, &self.state));
        }
        cache.as_ref().map(|mapping| f(&model, mapping))
    }

    /// Rows visible through this proxy; 0 without a source.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.with_mapping(|_, mapping| mapping.rows.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn map_to_source(&self, proxy_row: usize) -> Option<RowId> {
        self.with_mapping(|_, mapping| mapping.rows.get(proxy_row).copied())
            .flatten()
    }

    #[must_use]
    pub fn map_to_source_row(&self, proxy_row: usize) -> Option<usize> {
        self.with_mapping(|model, mapping| {
            mapping
                .rows
                .get(proxy_row)
                .and_then(|id| model.row_of(*id))
        })
        .flatten()
    }

    /// Proxy row of a source handle; `None` when filtered out or stale.
    #[must_use]
    pub fn map_from_source(&self, id: RowId) -> Option<usize> {
        self.with_mapping(|_, mapping| mapping.proxy_rows.get(&id).copied())
            .flatten()
    }

    #[must_use]
    pub fn map_from_source_row(&self, source_row: usize) -> Option<usize> {
        self.with_mapping(|model, mapping| {
            model
                .row_id(source_row)
                .and_then(|id| mapping.proxy_rows.get(&id).copied())
        })
        .flatten()
    }

    /// Source handles in proxy order.
    #[must_use]
    pub fn source_rows(&self) -> Vec<RowId> {
        self.with_mapping(|_, mapping| mapping.rows.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{write, MusicModel, LIBRARY_MODEL};

    fn library() -> SharedModel {
        let model = MusicModel::shared(LIBRARY_MODEL);
        let rows = [
            ("Intro", "Bravo", "First", 90_000, 3),
            ("Ballad", "alpha", "Second", 240_000, 0),
            ("Coda", "Bravo", "First", 30_000, 7),
            ("Anthem", "Charlie", "Third", 180_000, 1),
        ];
        write(&model).append_rows(
            rows.iter()
                .map(|(title, artist, album, duration, plays)| TrackRecord {
                    file_path: format!("/music/{title}.flac"),
                    title: (*title).to_string(),
                    artist: (*artist).to_string(),
                    album: (*album).to_string(),
                    duration: *duration,
                    play_count: *plays,
                    ..TrackRecord::default()
                })
                .collect(),
        );
        model
    }

    fn titles(proxy: &ProxyModel, model: &SharedModel) -> Vec<String> {
        let rows = proxy.source_rows();
        let model = read(model);
        rows.into_iter()
            .map(|id| model.record_by_id(id).unwrap().title.clone())
            .collect()
    }

    #[test]
    fn test_identity_mapping_without_configuration() {
        let model = library();
        let mut proxy = ProxyModel::new("ProxyModel/Test");
        proxy.set_source_model(Some(Arc::clone(&model)));

        assert_eq!(proxy.row_count(), 4);
        for row in 0..4 {
            assert_eq!(proxy.map_to_source_row(row), Some(row));
            assert_eq!(proxy.map_from_source_row(row), Some(row));
        }
        assert_eq!(proxy.map_to_source(4), None);
    }

    #[test]
    fn test_filter_and_category() {
        let model = library();
        let mut proxy = ProxyModel::new("ProxyModel/Test");
        proxy.set_source_model(Some(Arc::clone(&model)));
        proxy.set_category(Some(Category::new(Column::Artist, "bravo")));
        assert_eq!(titles(&proxy, &model), vec!["Intro", "Coda"]);

        proxy.add_search_block(SearchBlock::new(None, "co"));
        assert_eq!(titles(&proxy, &model), vec!["Coda"]);
        // Intro is filtered out, so it has no proxy row.
        assert_eq!(proxy.map_from_source_row(0), None);
        assert_eq!(proxy.map_from_source_row(2), Some(0));
    }

    #[test]
    fn test_sorting_text_and_numbers() {
        let model = library();
        let mut proxy = ProxyModel::new("ProxyModel/Test");
        proxy.set_source_model(Some(Arc::clone(&model)));

        proxy.sort(Column::Artist, SortOrder::Ascending);
        assert_eq!(titles(&proxy, &model), vec!["Ballad", "Intro", "Coda", "Anthem"]);

        proxy.set_sort_case_sensitivity(true);
        // Upper case sorts before lower case.
        assert_eq!(titles(&proxy, &model), vec!["Intro", "Coda", "Anthem", "Ballad"]);

        proxy.sort(Column::Plays, SortOrder::Descending);
        assert_eq!(titles(&proxy, &model), vec!["Coda", "Intro", "Anthem", "Ballad"]);
        assert_eq!(proxy.map_to_source_row(0), Some(2));
    }

    #[test]
    fn test_mapping_follows_source_changes() {
        let model = library();
        let mut proxy = ProxyModel::new("ProxyModel/Test");
        proxy.set_source_model(Some(Arc::clone(&model)));
        proxy.sort(Column::Name, SortOrder::Ascending);
        assert_eq!(proxy.row_count(), 4);
        let first = proxy.map_to_source(0);
        assert_eq!(proxy.map_to_source(0), first);

        write(&model).append_row(TrackRecord {
            title: "Aardvark".to_string(),
            ..TrackRecord::default()
        });
        assert_eq!(proxy.row_count(), 5);
        assert_eq!(titles(&proxy, &model)[0], "Aardvark");
    }

    #[test]
    fn test_detach_keeps_configuration() {
        let model = library();
        let mut proxy = ProxyModel::new("ProxyModel/Test");
        proxy.set_source_model(Some(Arc::clone(&model)));
        proxy.set_category(Some(Category::new(Column::Album, "First")));

        proxy.set_source_model(None);
        assert_eq!(proxy.row_count(), 0);
        assert_eq!(proxy.map_to_source(0), None);

        proxy.set_source_model(Some(Arc::clone(&model)));
        assert_eq!(proxy.row_count(), 2);
    }

    #[test]
    fn test_proxy_state_survives_json() {
        let mut proxy = ProxyModel::new("ProxyModel/Test");
        proxy.add_search_block(SearchBlock::new(Some(Column::Genre), "jazz"));
        proxy.sort(Column::Time, SortOrder::Descending);

        let json = serde_json::to_value(proxy.proxy_state()).unwrap();
        let restored: ProxyState = serde_json::from_value(json).unwrap();

        let mut other = ProxyModel::new("ProxyModel/Other");
        other.load_proxy_state(restored);
        assert_eq!(other.proxy_state(), proxy.proxy_state());
    }

    #[test]
    fn test_copy_configuration() {
        let model = library();
        let mut live = ProxyModel::new("ProxyModel/Live");
        live.set_source_model(Some(Arc::clone(&model)));
        live.sort(Column::Time, SortOrder::Ascending);

        let mut shadow = ProxyModel::new("ProxyModel/Shadow");
        shadow.copy_configuration_from(&live);
        assert!(shadow.is_source(&model));
        assert_eq!(shadow.source_rows(), live.source_rows());
    }
}
