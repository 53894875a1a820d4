//! # Now Playing
//!
//! [`NowPlaying`] decides what plays and what plays next. It owns:
//!
//! - the active view model (a tab's proxy, its own shadow copy, or the
//!   temporary playlist),
//! - the playing marker, a [`RowId`] in the active view model's source,
//! - the analysis snapshot of the playing track,
//! - the loop state and the shuffle generator.
//!
//! ## Life of a row
//!
//! ```text
//! play_music_row ─► play_row ─► reanalysis ─► backend load ──► LoadSuccess ─► play
//!                      ▲            │ fail          │              LoadFailed ─┐
//!                      │            ▼               ▼                          │
//!                      └──── next row (no loop) ◄── automatic? ◄───────────────┘
//!                                                   manual: stop, keep marker
//! ```
//!
//! Backend answers carry the [`LoadTicket`] of their load. Answers for
//! anything but the newest load are dropped, so a late `LoadFailed` for a
//! track the user already skipped cannot move the queue.
//!
//! The controller is single threaded. Backend and row-store notifications
//! arrive over channels and are applied by [`NowPlaying::process_events`].

use crate::analysis::Reanalyzer;
use crate::backend::{BackendEvent, LoadTicket, MusicBackend};
use crate::config::{Configure, NORMAL_AUTO_NEXT, SAVE_LAST_PLAYED};
use crate::events::Broadcaster;
use crate::loop_state::LoopState;
use crate::model::{read, write, ModelEvent, ModelRegistry, RowId, SharedModel, TEMPORARY_MODEL};
use crate::proxy::{ProxyModel, ProxyState, SharedProxy};
use crate::temporary::{TemporaryPlaylist, MODEL_DATA};
use crate::track::AnalysisItem;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

pub const LAST_PLAYED_MODEL: &str = "LastPlayed/Model";
pub const LAST_PLAYED_PROXY_MODEL: &str = "LastPlayed/ProxyModel";
pub const LAST_PLAYED_PROXY_MODEL_DATA: &str = "LastPlayed/ProxyModelData";
pub const LAST_PLAYED_INDEX: &str = "LastPlayed/Index";
pub const LAST_PLAYED_POSITION: &str = "LastPlayed/Position";

/// Broadcast to everything that renders now-playing state.
#[derive(Debug, Clone)]
pub enum NowPlayingNotice {
    NowPlayingChanged(AnalysisItem),
    NowPlayingReset,
    LoopStateChanged(LoopState),
    ModelChanged(Option<SharedProxy>),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    /// No marker.
    #[default]
    Idle,
    /// Load requested, answer pending.
    Loading,
    Playing,
    Paused,
    /// The current row could not be played and the controller is waiting for
    /// the user.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NowPlayingPreferences {
    pub normal_auto_next: bool,
    pub save_last_played: bool,
}

impl Default for NowPlayingPreferences {
    fn default() -> Self {
        Self {
            normal_auto_next: false,
            save_last_played: true,
        }
    }
}

impl NowPlayingPreferences {
    #[must_use]
    pub fn from_configure(configure: &Configure) -> Self {
        let defaults = Self::default();
        Self {
            normal_auto_next: configure.data_or(NORMAL_AUTO_NEXT, defaults.normal_auto_next),
            save_last_played: configure.data_or(SAVE_LAST_PLAYED, defaults.save_last_played),
        }
    }
}

/// What a library tab can do for the now-playing panel.
pub trait MusicTab: Send + Sync {
    fn title(&self) -> String;

    /// The tab owns the proxy model it asked to play from.
    fn provides_proxy_model(&self) -> bool {
        false
    }
}

/// Outcome of one step through the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Row(usize),
    /// Ran off the end of the queue.
    Stop,
    /// Nothing to advance through.
    Ignore,
}

enum RowLoad {
    Started,
    Failed,
    Ignored,
}

/// Shuffle pick relative to `current`: a uniform non-zero gap, applied
/// forwards or backwards and wrapped around `count`. Never returns `current`
/// when `count > 1`.
pub fn shuffle_target<R: Rng>(rng: &mut R, current: usize, count: usize, forward: bool) -> usize {
    if count <= 1 {
        return 0;
    }
    let gap = rng.gen_range(1..count);
    if forward {
        (current + gap) % count
    } else {
        (current + count - gap) % count
    }
}

/// Linear step from `current`. Only repeat-all wraps, and never while
/// recovering from a failure (`no_loop`).
#[must_use]
pub fn linear_target(
    current: usize,
    count: usize,
    forward: bool,
    no_loop: bool,
    loop_state: LoopState,
) -> Option<usize> {
    let wraps = loop_state == LoopState::RepeatAll;
    if forward {
        if current + 1 < count {
            Some(current + 1)
        } else if wraps && !no_loop {
            Some(0)
        } else {
            None
        }
    } else if current > 0 {
        Some(current - 1)
    } else if wraps {
        count.checked_sub(1)
    } else {
        None
    }
}

pub struct NowPlaying {
    backend: Option<Box<dyn MusicBackend>>,
    backend_events: Option<Receiver<BackendEvent>>,
    reanalyzer: Arc<dyn Reanalyzer>,
    preferences: NowPlayingPreferences,

    playing_proxy: Option<SharedProxy>,
    shadow_proxy: SharedProxy,
    temporary: TemporaryPlaylist,
    playing_tab: Option<Arc<dyn MusicTab>>,

    // The marker lives in `playing_model`, the watched source.
    playing_model: Option<SharedModel>,
    model_events: Option<Receiver<ModelEvent>>,
    playing_row: Option<RowId>,
    playing_item: AnalysisItem,

    loop_state: LoopState,
    manual_played: bool,
    phase: PlaybackPhase,
    issued_tickets: u64,
    current_ticket: Option<LoadTicket>,
    // Load that settles paused instead of starting playback.
    paused_ticket: Option<LoadTicket>,
    rng: StdRng,
    notices: Broadcaster<NowPlayingNotice>,
}

impl NowPlaying {
    pub fn new(reanalyzer: Arc<dyn Reanalyzer>) -> Self {
        Self {
            backend: None,
            backend_events: None,
            reanalyzer,
            preferences: NowPlayingPreferences::default(),
            playing_proxy: None,
            shadow_proxy: ProxyModel::shared("ProxyModel/Shadow"),
            temporary: TemporaryPlaylist::new(),
            playing_tab: None,
            playing_model: None,
            model_events: None,
            playing_row: None,
            playing_item: AnalysisItem::default(),
            loop_state: LoopState::default(),
            manual_played: false,
            phase: PlaybackPhase::Idle,
            issued_tickets: 0,
            current_ticket: None,
            paused_ticket: None,
            rng: StdRng::from_entropy(),
            notices: Broadcaster::new(),
        }
    }

    #[must_use]
    pub fn with_preferences(mut self, preferences: NowPlayingPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    /// Replace the entropy-seeded shuffle generator with a reproducible one.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn subscribe(&mut self) -> Receiver<NowPlayingNotice> {
        self.notices.subscribe()
    }

    pub fn set_preferences(&mut self, preferences: NowPlayingPreferences) {
        self.preferences = preferences;
    }

    #[must_use]
    pub fn preferences(&self) -> NowPlayingPreferences {
        self.preferences
    }

    // ----- backend -----

    /// Attach a backend together with the channel it answers on.
    pub fn set_backend(&mut self, backend: Box<dyn MusicBackend>, events: Receiver<BackendEvent>) {
        self.clear_backend();
        self.backend = Some(backend);
        self.backend_events = Some(events);
    }

    pub fn clear_backend(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.reset();
        }
        self.backend_events = None;
        self.current_ticket = None;
    }

    #[must_use]
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    // ----- accessors -----

    #[must_use]
    pub fn playing_model(&self) -> Option<SharedProxy> {
        self.playing_proxy.clone()
    }

    /// Source of the active view model.
    #[must_use]
    pub fn playing_music_model(&self) -> Option<SharedModel> {
        self.playing_proxy
            .as_ref()
            .and_then(|proxy| read(proxy).source_model())
    }

    #[must_use]
    pub fn loop_state(&self) -> LoopState {
        self.loop_state
    }

    #[must_use]
    pub fn playing_index(&self) -> Option<RowId> {
        self.playing_row
    }

    /// Source row of the marker, if it still resolves.
    #[must_use]
    pub fn playing_source_row(&self) -> Option<usize> {
        let id = self.playing_row?;
        read(self.playing_model.as_ref()?).row_of(id)
    }

    /// Proxy row of the marker in the active view model.
    #[must_use]
    pub fn playing_proxy_row(&self) -> Option<usize> {
        let proxy = self.playing_proxy.as_ref()?;
        self.current_proxy_row(&read(proxy))
    }

    #[must_use]
    pub fn playing_item(&self) -> &AnalysisItem {
        &self.playing_item
    }

    #[must_use]
    pub fn playing_tab(&self) -> Option<Arc<dyn MusicTab>> {
        self.playing_tab.clone()
    }

    #[must_use]
    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    /// Ticket of the load the controller is waiting for.
    #[must_use]
    pub fn pending_ticket(&self) -> Option<LoadTicket> {
        self.current_ticket
    }

    #[must_use]
    pub fn temporary(&self) -> &TemporaryPlaylist {
        &self.temporary
    }

    #[must_use]
    pub fn shadow_model(&self) -> SharedProxy {
        Arc::clone(&self.shadow_proxy)
    }

    // ----- playing -----

    /// Play `row` of `proxy` on behalf of the user.
    pub fn play_music_row(&mut self, proxy: &SharedProxy, row: usize, tab: Option<Arc<dyn MusicTab>>) {
        let source = read(proxy).source_model();
        let same_proxy = self
            .playing_proxy
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, proxy));
        let same_source = match (&source, &self.playing_model) {
            (Some(source), Some(watched)) => Arc::ptr_eq(source, watched),
            (None, None) => true,
            _ => false,
        };

        if !same_proxy || !same_source {
            self.watch_model(None);
            self.playing_proxy = Some(Arc::clone(proxy));
            self.notices
                .emit(NowPlayingNotice::ModelChanged(Some(Arc::clone(proxy))));
            self.playing_tab = tab;
            self.watch_model(source);
        }

        self.playing_row = None;
        self.manual_played = true;
        self.play_row(row);
    }

    /// Play `proxy_row` of the active view model. Out of range rows are
    /// ignored.
    pub fn play_row(&mut self, proxy_row: usize) {
        let mut next = Some(proxy_row);
        while let Some(row) = next {
            next = match self.load_row(row) {
                RowLoad::Failed => self.recover_from_failure(),
                RowLoad::Started | RowLoad::Ignored => None,
            };
        }
    }

    pub fn play_next(&mut self) {
        self.play_next_row(false);
    }

    pub fn play_previous(&mut self) {
        match self.advance(false, false) {
            Advance::Row(row) => self.play_row(row),
            Advance::Stop => self.reset_current_playing(),
            Advance::Ignore => {}
        }
    }

    /// Play an online resource through the temporary playlist.
    pub fn play_url(&mut self, url: &str) {
        let id = self.temporary.set_online_url(url);
        self.play_temporary_row(id);
    }

    /// Add files to the temporary playlist and play the first of them.
    pub fn play_temporary_files<P: AsRef<Path>>(&mut self, paths: &[P]) {
        match self.temporary.append_temporary_files(paths) {
            Some(id) => self.play_temporary_row(id),
            None => debug!("No playable temporary files"),
        }
    }

    fn play_temporary_row(&mut self, id: RowId) {
        let proxy = self.temporary.proxy();
        let row = read(&proxy).map_from_source(id);
        if let Some(row) = row {
            self.play_music_row(&proxy, row, None);
        }
    }

    // ----- transport -----

    pub fn play(&mut self) {
        if self.phase == PlaybackPhase::Loading {
            self.paused_ticket = None;
            return;
        }
        if self.playing_item.is_empty() {
            return;
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.play();
            self.phase = PlaybackPhase::Playing;
        }
    }

    pub fn pause(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.pause();
            match self.phase {
                PlaybackPhase::Playing => self.phase = PlaybackPhase::Paused,
                PlaybackPhase::Loading => self.paused_ticket = self.current_ticket,
                _ => {}
            }
        }
    }

    pub fn toggle_play_pause(&mut self) {
        match self.phase {
            PlaybackPhase::Playing => self.pause(),
            PlaybackPhase::Paused => self.play(),
            _ => {}
        }
    }

    pub fn set_position(&mut self, position: i64) {
        if let Some(backend) = self.backend.as_mut() {
            backend.set_position(position);
        }
    }

    /// Backend position in milliseconds, -1 without a backend.
    #[must_use]
    pub fn position(&self) -> i64 {
        self.backend.as_ref().map_or(-1, |backend| backend.position())
    }

    // ----- loop state and rating -----

    pub fn change_loop_state(&mut self) {
        self.set_loop_state(self.loop_state.next());
    }

    pub fn set_loop_state(&mut self, state: LoopState) {
        self.loop_state = state;
        debug!("Loop state is now {state}");
        self.notices.emit(NowPlayingNotice::LoopStateChanged(state));
    }

    pub fn set_playing_rating(&mut self, rating: u8) {
        let (Some(model), Some(id)) = (&self.playing_model, self.playing_row) else {
            return;
        };
        let mut model = write(model);
        let Some(row) = model.row_of(id) else {
            return;
        };
        if model.set_rating(row, rating) {
            if let Some(record) = model.record(row) {
                self.playing_item.record.rating = record.rating;
            }
        }
    }

    // ----- view model lifetime -----

    /// Move playback onto the private shadow copy of the active view model,
    /// so the live one can be reconfigured or dropped.
    pub fn shadow_playing_model(&mut self) {
        let Some(live) = self.playing_proxy.clone() else {
            return;
        };
        if Arc::ptr_eq(&live, &self.shadow_proxy) {
            return;
        }

        write(&self.shadow_proxy).copy_configuration_from(&read(&live));
        self.playing_proxy = Some(Arc::clone(&self.shadow_proxy));
        debug!("Playing from the shadow of {}", read(&live).identifier());
        self.notices.emit(NowPlayingNotice::ModelChanged(Some(Arc::clone(
            &self.shadow_proxy,
        ))));
    }

    /// Stop everything and forget the active view model.
    pub fn reset(&mut self) {
        self.reset_current_playing();
        {
            let mut shadow = write(&self.shadow_proxy);
            shadow.set_source_model(None);
            shadow.load_proxy_state(ProxyState::default());
        }
        self.watch_model(None);
        self.playing_proxy = None;
        self.notices.emit(NowPlayingNotice::ModelChanged(None));
    }

    /// A row store is about to go away.
    pub fn on_model_removed(&mut self, model: &SharedModel) {
        let playing = self
            .playing_music_model()
            .is_some_and(|current| Arc::ptr_eq(&current, model));
        if playing {
            info!("Playing model {} removed", read(model).identifier());
            self.reset();
            self.playing_tab = None;
        }
    }

    // ----- events -----

    /// Apply every pending row-store and backend notification.
    pub fn process_events(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.tick();
        }

        while let Some(event) = self.model_events.as_ref().and_then(|rx| rx.try_recv().ok()) {
            match event {
                ModelEvent::PlayingItemRemoved => self.on_playing_item_removed(),
                // Rows may have shifted since the change, so the range is not trusted.
                ModelEvent::DataChanged { .. } => self.refresh_playing_record(),
                _ => {}
            }
        }

        while let Some(event) = self.backend_events.as_ref().and_then(|rx| rx.try_recv().ok()) {
            match event {
                BackendEvent::LoadSuccess(ticket) => self.on_load_success(ticket),
                BackendEvent::LoadFailed(ticket) => self.on_load_failed(ticket),
                BackendEvent::Finished(ticket) => self.on_backend_finished(ticket),
            }
        }
    }

    fn is_current(&self, ticket: LoadTicket) -> bool {
        if self.current_ticket == Some(ticket) {
            true
        } else {
            debug!("Dropping answer for stale load {ticket}");
            false
        }
    }

    pub fn on_load_success(&mut self, ticket: LoadTicket) {
        if !self.is_current(ticket) {
            return;
        }

        if let (Some(model), Some(id)) = (&self.playing_model, self.playing_row) {
            write(model).set_cannot_play(id, false);
            self.playing_item.record.cannot_play = false;
            self.notices
                .emit(NowPlayingNotice::NowPlayingChanged(self.playing_item.clone()));
        }

        if self.paused_ticket.take() == Some(ticket) {
            // Restored sessions wait paused at their saved position.
            self.phase = PlaybackPhase::Paused;
            return;
        }
        if let Some(backend) = self.backend.as_mut() {
            backend.play();
            self.phase = PlaybackPhase::Playing;
        }
    }

    pub fn on_load_failed(&mut self, ticket: LoadTicket) {
        if !self.is_current(ticket) {
            return;
        }
        if let Some(row) = self.recover_from_failure() {
            self.play_row(row);
        }
    }

    pub fn on_backend_finished(&mut self, ticket: LoadTicket) {
        if !self.is_current(ticket) {
            return;
        }

        if let (Some(model), Some(id)) = (&self.playing_model, self.playing_row) {
            write(model).add_playing_times(id);
        }
        self.manual_played = false;

        match self.loop_state {
            LoopState::RepeatTrack => {
                if self.playing_item.record.is_url() {
                    self.reset();
                    return;
                }
                if self.playing_item.record.duration == 0 {
                    return;
                }
                if let Some(backend) = self.backend.as_mut() {
                    backend.play();
                    self.phase = PlaybackPhase::Playing;
                }
            }
            LoopState::NoRepeat if !self.preferences.normal_auto_next => self.reset(),
            _ => self.play_next_row(false),
        }
    }

    pub fn on_playing_item_removed(&mut self) {
        // A marker that still resolves was set after the removal.
        let alive = match (&self.playing_model, self.playing_row) {
            (Some(model), Some(id)) => read(model).contains(id),
            _ => false,
        };
        if alive || self.playing_row.is_none() {
            return;
        }
        debug!("Playing row removed");
        self.reset_current_playing();
    }

    pub fn on_model_data_changed(&mut self, first: usize, last: usize) {
        if self
            .playing_source_row()
            .is_some_and(|row| (first..=last).contains(&row))
        {
            self.refresh_playing_record();
        }
    }

    /// Pick up edits to the playing row's record. Writes the controller made
    /// itself compare equal and stay silent.
    fn refresh_playing_record(&mut self) {
        let record = match (&self.playing_model, self.playing_row) {
            (Some(model), Some(id)) => read(model).record_by_id(id).cloned(),
            _ => None,
        };
        if let Some(record) = record {
            if record != self.playing_item.record {
                self.playing_item.record = record;
                self.notices
                    .emit(NowPlayingNotice::NowPlayingChanged(self.playing_item.clone()));
            }
        }
    }

    // ----- persistence -----

    /// Write the last played record into `cache`.
    pub fn save_configure(&self, cache: &mut Configure) {
        if !self.preferences.save_last_played {
            return;
        }

        match &self.playing_proxy {
            Some(proxy) => {
                let proxy = read(proxy);
                cache.set_data(LAST_PLAYED_PROXY_MODEL, proxy.identifier());
                match serde_json::to_value(proxy.proxy_state()) {
                    Ok(state) => cache.set_data(LAST_PLAYED_PROXY_MODEL_DATA, state),
                    Err(e) => warn!("Failed to serialize proxy state: {e}"),
                }
            }
            None => {
                cache.set_data(LAST_PLAYED_PROXY_MODEL, "");
                cache.set_data(LAST_PLAYED_PROXY_MODEL_DATA, Value::Null);
            }
        }

        let identifier = self
            .playing_music_model()
            .map(|model| read(&model).identifier().to_string())
            .unwrap_or_default();
        if identifier == TEMPORARY_MODEL {
            self.temporary.save_model_data(cache);
        } else {
            cache.remove(MODEL_DATA);
        }
        cache.set_data(LAST_PLAYED_MODEL, identifier);

        let index = self
            .playing_source_row()
            .and_then(|row| i64::try_from(row).ok())
            .unwrap_or(-1);
        cache.set_data(LAST_PLAYED_INDEX, index);
        cache.set_data(LAST_PLAYED_POSITION, self.position());
    }

    /// Restore the last played record: rebuild the view model on the shadow,
    /// load the saved row, pause and seek to the saved position.
    pub fn load_configure(&mut self, cache: &Configure, models: &ModelRegistry) {
        let identifier: String = cache.data_or(LAST_PLAYED_MODEL, String::new());
        let model = if identifier == TEMPORARY_MODEL {
            let restored = self.temporary.load_model_data(cache);
            debug!("Restored {restored} temporary rows");
            Some(self.temporary.model())
        } else {
            models.get(&identifier)
        };
        let Some(model) = model else {
            debug!("No last played model to restore");
            return;
        };

        let state: ProxyState = cache
            .data(LAST_PLAYED_PROXY_MODEL_DATA)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default();
        {
            let mut shadow = write(&self.shadow_proxy);
            shadow.set_source_model(Some(Arc::clone(&model)));
            shadow.load_proxy_state(state);
        }
        self.watch_model(None);
        self.playing_proxy = Some(Arc::clone(&self.shadow_proxy));
        self.notices.emit(NowPlayingNotice::ModelChanged(Some(Arc::clone(
            &self.shadow_proxy,
        ))));
        self.watch_model(Some(Arc::clone(&model)));

        let index: i64 = cache.data_or(LAST_PLAYED_INDEX, -1);
        let Some(id) = usize::try_from(index)
            .ok()
            .and_then(|row| read(&model).row_id(row))
        else {
            return;
        };
        write(&model).set_playing_index(Some(id));
        self.playing_row = Some(id);

        let Some(proxy_row) = read(&self.shadow_proxy).map_from_source(id) else {
            return;
        };
        info!("Resuming {identifier} at row {index}");
        // A saved row that fails to load moves on like an automatic failure.
        self.manual_played = false;
        self.play_row(proxy_row);

        // The saved position only applies to the saved row.
        if self.phase != PlaybackPhase::Loading || self.playing_row != Some(id) {
            return;
        }
        self.paused_ticket = self.current_ticket;
        let position: i64 = cache.data_or(LAST_PLAYED_POSITION, -1);
        if let Some(backend) = self.backend.as_mut() {
            backend.pause();
            if position >= 0 {
                backend.set_position(position);
            }
        }
    }

    // ----- internals -----

    /// Follow `model` as the marker's row store, dropping the previous one's
    /// marker and subscription.
    fn watch_model(&mut self, model: Option<SharedModel>) {
        let unchanged = match (&model, &self.playing_model) {
            (Some(model), Some(watched)) => Arc::ptr_eq(model, watched),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if let Some(old) = self.playing_model.take() {
            write(&old).set_playing_index(None);
        }
        self.model_events = None;

        if let Some(model) = model {
            self.model_events = Some(write(&model).subscribe());
            self.playing_model = Some(model);
        }
    }

    fn issue_ticket(&mut self) -> LoadTicket {
        self.issued_tickets += 1;
        let ticket = LoadTicket(self.issued_tickets);
        self.current_ticket = Some(ticket);
        self.paused_ticket = None;
        ticket
    }

    fn load_row(&mut self, proxy_row: usize) -> RowLoad {
        let Some(proxy) = self.playing_proxy.clone() else {
            debug!("No playing model, ignoring row {proxy_row}");
            return RowLoad::Ignored;
        };
        let target = {
            let proxy = read(&proxy);
            if proxy_row >= proxy.row_count() {
                debug!("Row {proxy_row} is out of range");
                return RowLoad::Ignored;
            }
            proxy.source_model().zip(proxy.map_to_source(proxy_row))
        };
        let Some((model, id)) = target else {
            return RowLoad::Ignored;
        };

        self.watch_model(Some(Arc::clone(&model)));
        self.playing_row = Some(id);
        self.playing_item = AnalysisItem::default();
        let ticket = self.issue_ticket();
        self.phase = PlaybackPhase::Loading;

        let (source_row, record) = {
            let mut model = write(&model);
            model.set_playing_index(Some(id));
            (model.row_of(id), model.record_by_id(id).cloned())
        };
        let (Some(source_row), Some(record)) = (source_row, record) else {
            return RowLoad::Ignored;
        };

        let mut item = AnalysisItem::new(record);
        if !self.reanalyzer.reanalysis_item(&mut item) {
            warn!("Cannot analyse {}", item.record.resource());
            return RowLoad::Failed;
        }
        if item.record.is_url() {
            item.cover_image = read(&model).artwork(id);
        } else {
            write(&model).update_row(source_row, &item);
        }
        self.playing_item = item;

        let Some(backend) = self.backend.as_mut() else {
            warn!("No backend to play {}", self.playing_item.record.resource());
            return RowLoad::Failed;
        };
        let record = &self.playing_item.record;
        debug!("Loading {} as {ticket}", record.resource());
        match record.section() {
            Some((start, duration)) => {
                backend.load_music_section(ticket, record.resource(), start, duration);
            }
            None => backend.load_music(ticket, record.resource()),
        }
        RowLoad::Started
    }

    /// Mark the current row unplayable and pick where to go next.
    fn recover_from_failure(&mut self) -> Option<usize> {
        if let (Some(model), Some(id)) = (&self.playing_model, self.playing_row) {
            write(model).set_cannot_play(id, true);
        }

        if self.manual_played {
            self.reset_current_playing_model_data();
            self.phase = PlaybackPhase::Failed;
            return None;
        }

        match self.advance(true, true) {
            Advance::Row(row) => Some(row),
            Advance::Stop => {
                self.reset_current_playing();
                None
            }
            Advance::Ignore => None,
        }
    }

    fn play_next_row(&mut self, no_loop: bool) {
        match self.advance(true, no_loop) {
            Advance::Row(row) => self.play_row(row),
            Advance::Stop => self.reset_current_playing(),
            Advance::Ignore => {}
        }
    }

    fn current_proxy_row(&self, proxy: &ProxyModel) -> Option<usize> {
        let id = self.playing_row?;
        let model = self.playing_model.as_ref()?;
        if !proxy.is_source(model) || !read(model).contains(id) {
            return None;
        }
        proxy.map_from_source(id)
    }

    fn advance(&mut self, forward: bool, no_loop: bool) -> Advance {
        let Some(proxy) = self.playing_proxy.clone() else {
            return Advance::Ignore;
        };
        let proxy = read(&proxy);
        let count = proxy.row_count();
        if count == 0 {
            return Advance::Ignore;
        }

        // A marker that no longer resolves in this view restarts the queue.
        let Some(current) = self.current_proxy_row(&proxy) else {
            return Advance::Row(if forward { 0 } else { count - 1 });
        };

        if self.loop_state == LoopState::Shuffle && !no_loop {
            return Advance::Row(shuffle_target(&mut self.rng, current, count, forward));
        }
        match linear_target(current, count, forward, no_loop, self.loop_state) {
            Some(row) => Advance::Row(row),
            None => Advance::Stop,
        }
    }

    fn reset_current_playing_model_data(&mut self) {
        if let Some(backend) = self.backend.as_mut() {
            backend.reset();
        }
        if let Some(model) = &self.playing_model {
            write(model).set_playing_index(None);
        }
        self.current_ticket = None;
        self.paused_ticket = None;
        self.notices.emit(NowPlayingNotice::NowPlayingReset);
    }

    fn reset_current_playing(&mut self) {
        self.reset_current_playing_model_data();
        self.playing_row = None;
        self.playing_item = AnalysisItem::default();
        self.phase = PlaybackPhase::Idle;
    }
}
