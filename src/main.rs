//! # Cadenza
//!
//! Command-line front end: imports a library, configures a view over it and
//! hands rows to the now-playing controller, which drives MPD.
//!
//! ## Usage
//!
//! ```bash
//! # Add a music directory to the library
//! cadenza import /path/to/music
//!
//! # Browse
//! cadenza list --genre jazz --sort plays --descending
//!
//! # Play the filtered view in shuffle
//! cadenza play --filter "live" --loop shuffle
//!
//! # Pick up where the last session stopped
//! cadenza resume
//! ```
//!
//! While playing, type `next`, `prev`, `pause`, `loop`, `rate N`, `status`
//! or `quit` followed by enter.

use anyhow::{ensure, Result};
use cadenza::analysis::FileReanalyzer;
use cadenza::cli::{self, ViewArgs};
use cadenza::config::{Configure, RuntimeConfig};
use cadenza::loop_state::LoopState;
use cadenza::model::{read, write, ModelRegistry, MusicModel, SharedModel, LIBRARY_MODEL};
use cadenza::mpd_client::{self, MpdBackend};
use cadenza::now_playing::{MusicTab, NowPlaying, NowPlayingPreferences};
use cadenza::proxy::{Category, ProxyModel, SearchBlock, SortOrder};
use cadenza::track::{format_duration, Column};
use cadenza::{completion, db, import, session};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use std::path::PathBuf;
use std::sync::Arc;

const LIBRARY_PROXY: &str = "ProxyModel/Library";

/// The library listing the user played from.
struct LibraryTab;

impl MusicTab for LibraryTab {
    fn title(&self) -> String {
        "Library".to_string()
    }

    fn provides_proxy_model(&self) -> bool {
        true
    }
}

fn open_library(config: &RuntimeConfig) -> Result<SharedModel> {
    let conn = db::connect(&config.db_path)?;
    let library = MusicModel::shared(LIBRARY_MODEL);
    let count = db::load_library(&conn, &mut write(&library))?;
    debug!("Loaded {count} library rows");
    Ok(library)
}

fn apply_view(proxy: &mut ProxyModel, view: &ViewArgs) {
    if let Some(text) = &view.filter {
        proxy.add_search_block(SearchBlock::new(None, text.as_str()));
    }

    let category = [
        (Column::Artist, &view.artist),
        (Column::Album, &view.album),
        (Column::Genre, &view.genre),
    ]
    .into_iter()
    .find_map(|(column, content)| content.as_ref().map(|content| Category::new(column, content.as_str())));
    proxy.set_category(category);

    if let Some(column) = view.sort {
        let order = if view.descending {
            SortOrder::Descending
        } else {
            SortOrder::Ascending
        };
        proxy.sort(column, order);
    }
}

fn library_view(library: &SharedModel, view: &ViewArgs) -> ProxyModel {
    let mut proxy = ProxyModel::new(LIBRARY_PROXY);
    proxy.set_source_model(Some(Arc::clone(library)));
    apply_view(&mut proxy, view);
    proxy
}

fn list(config: &RuntimeConfig, view: &ViewArgs) -> Result<()> {
    let library = open_library(config)?;
    // The view reads the library itself, so map before locking it here.
    let rows = library_view(&library, view).source_rows();
    let model = read(&library);

    for (row, id) in rows.iter().enumerate() {
        let Some(record) = model.record_by_id(*id) else {
            continue;
        };
        let flag = if record.cannot_play { " (unplayable)" } else { "" };
        println!(
            "{row:>5}  {} - {} [{}] {}{flag}",
            record.artist,
            record.title,
            record.album,
            format_duration(record.duration)
        );
    }
    println!(
        "{} of {} tracks, {} in total",
        rows.len(),
        model.row_count(),
        format_duration(model.total_duration())
    );
    Ok(())
}

fn controller(config: &RuntimeConfig, auto_next: bool) -> Result<NowPlaying> {
    let configure = Configure::load(&config.configure_path)?;
    let mut preferences = NowPlayingPreferences::from_configure(&configure);
    preferences.normal_auto_next |= auto_next;

    let mut now_playing = NowPlaying::new(Arc::new(FileReanalyzer)).with_preferences(preferences);
    let (backend, events) = MpdBackend::new();
    now_playing.set_backend(Box::new(backend), events);
    Ok(now_playing)
}

fn finish(mut now_playing: NowPlaying, library: &SharedModel, config: &RuntimeConfig) -> Result<()> {
    let commands = session::spawn_stdin_reader();
    session::run(&mut now_playing, &commands);
    session::save_session(&now_playing, library, config)?;
    now_playing.clear_backend();
    Ok(())
}

fn play(
    config: &RuntimeConfig,
    paths: &[PathBuf],
    view: &ViewArgs,
    loop_state: LoopState,
    row: usize,
    auto_next: bool,
) -> Result<()> {
    mpd_client::get_client()?;
    let library = open_library(config)?;
    let mut now_playing = controller(config, auto_next)?;
    now_playing.set_loop_state(loop_state);

    match paths {
        [] => {
            let proxy = ProxyModel::shared(LIBRARY_PROXY);
            *write(&proxy) = library_view(&library, view);
            let rows = read(&proxy).row_count();
            ensure!(row < rows, "Row {row} is out of range, the view has {rows} rows");

            now_playing.play_music_row(&proxy, row, Some(Arc::new(LibraryTab)));
            // The command-line view dies with this function.
            now_playing.shadow_playing_model();
        }
        [url] if url.to_string_lossy().contains("://") => {
            now_playing.play_url(&url.to_string_lossy());
        }
        paths => now_playing.play_temporary_files(paths),
    }

    finish(now_playing, &library, config)
}

fn resume(config: &RuntimeConfig) -> Result<()> {
    mpd_client::get_client()?;
    let library = open_library(config)?;
    let mut models = ModelRegistry::new();
    models.register(Arc::clone(&library));

    let mut now_playing = controller(config, false)?;
    let cache = Configure::load(&config.cache_path)?;
    now_playing.load_configure(&cache, &models);
    now_playing.process_events();
    if now_playing.playing_index().is_none() {
        println!("Nothing to resume.");
        return Ok(());
    }
    println!("Paused at the last position, type `pause` to continue.");

    finish(now_playing, &library, config)
}

/// Main entry point.
///
/// Logging is controlled through `RUST_LOG`, for example
/// `RUST_LOG=cadenza=debug cadenza play`.
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();
    let config = match args.data_dir {
        Some(dir) => RuntimeConfig::with_data_dir(dir),
        None => RuntimeConfig::new()?,
    };

    match args.command {
        cli::Command::Import { path, scan_depth } => {
            info!("Importing music from: {}", path.display());
            let library = open_library(&config)?;
            let added = match import::spawn_import(Arc::clone(&library), path, scan_depth).join() {
                Ok(result) => result?,
                Err(_) => anyhow::bail!("Import thread panicked"),
            };
            let mut conn = db::connect(&config.db_path)?;
            let total = db::save_library(&mut conn, &read(&library))?;
            println!("Added {added} tracks, {total} in the library");
        }
        cli::Command::List { view } => list(&config, &view)?,
        cli::Command::Play {
            paths,
            view,
            loop_state,
            row,
            auto_next,
        } => play(&config, &paths, &view, loop_state, row, auto_next)?,
        cli::Command::Resume => resume(&config)?,
        cli::Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(shell), &mut cmd);
        }
        cli::Command::CompleteTitles => {
            let library = open_library(&config)?;
            completion::print_title_completions(&read(&library));
        }
    }

    Ok(())
}
