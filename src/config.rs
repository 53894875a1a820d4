//! # Configuration Module
//!
//! Data directory layout and the key/value configure store.
//!
//! Cadenza keeps everything in the platform data directory:
//! - Linux: `~/.local/share/cadenza/`
//! - macOS: `~/Library/Application Support/cadenza/`
//! - Windows: `%APPDATA%\cadenza\`
//!
//! | file             | contents                                  |
//! |------------------|-------------------------------------------|
//! | `library.db`     | SQLite library (see [`crate::db`])        |
//! | `configure.json` | user preferences                          |
//! | `cache.json`     | last played record and temporary playlist |
//!
//! Both JSON files are [`Configure`] trees addressed with `/`-separated keys
//! such as `"LastPlayed/Index"`.

use anyhow::{Context, Result};
use log::debug;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Keep the last played record across sessions. Default `true`.
pub const SAVE_LAST_PLAYED: &str = "Music/SaveLastPlayed";
/// Advance to the next row after a natural end in no-repeat mode.
/// Default `false`.
pub const NORMAL_AUTO_NEXT: &str = "Music/NowPlaying/NormalAutoNext";

/// Returns the platform-appropriate data directory, creating it if needed.
///
/// # Errors
///
/// Fails when the system data directory cannot be determined or the
/// `cadenza` subdirectory cannot be created.
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let cadenza_dir = data_dir.join("cadenza");
    fs::create_dir_all(&cadenza_dir).with_context(|| {
        format!(
            "Failed to create Cadenza data directory at {}. Please check file permissions.",
            cadenza_dir.display()
        )
    })?;

    Ok(cadenza_dir)
}

/// Path of the SQLite library.
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("library.db"))
}

/// Path of the user preference file.
pub fn get_configure_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("configure.json"))
}

/// Path of the session cache file.
pub fn get_cache_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join("cache.json"))
}

/// Configuration for runtime behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub configure_path: PathBuf,
    pub cache_path: PathBuf,
}

impl RuntimeConfig {
    /// Configuration rooted in the platform data directory.
    pub fn new() -> Result<Self> {
        Ok(Self::with_data_dir(get_data_dir()?))
    }

    /// Configuration rooted in an explicit directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            db_path: data_dir.join("library.db"),
            configure_path: data_dir.join("configure.json"),
            cache_path: data_dir.join("cache.json"),
            data_dir,
        }
    }
}

/// Path-addressed JSON key/value tree.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Configure {
    root: Map<String, Value>,
}

impl Configure {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a configure file. A missing file is an empty configure.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No configure at {}, starting empty", path.display());
            return Ok(Self::new());
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configure file {}", path.display()))?;
        if text.trim().is_empty() {
            return Ok(Self::new());
        }

        let root: Map<String, Value> = serde_json::from_str(&text)
            .with_context(|| format!("Configure file {} is not a JSON object", path.display()))?;
        Ok(Self { root })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(&self.root)
            .context("Failed to serialize configure")?;
        fs::write(path, text)
            .with_context(|| format!("Failed to write configure file {}", path.display()))
    }

    /// The value at `key`, if any.
    #[must_use]
    pub fn data(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('/');
        let first = parts.next()?;
        parts.try_fold(self.root.get(first)?, |value, part| value.get(part))
    }

    /// The value at `key` converted to `T`, or `default` when it is missing
    /// or has the wrong shape.
    #[must_use]
    pub fn data_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.data(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or(default)
    }

    /// Store `value` at `key`, creating (or overwriting) the namespaces on the
    /// way.
    pub fn set_data(&mut self, key: &str, value: impl Into<Value>) {
        let mut parts: Vec<&str> = key.split('/').collect();
        let Some(last) = parts.pop() else {
            return;
        };

        let mut node = &mut self.root;
        for part in parts {
            let entry = node
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(map) = entry else {
                return;
            };
            node = map;
        }
        node.insert(last.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let (parent, last) = match key.rsplit_once('/') {
            Some((parent, last)) => (Some(parent), last),
            None => (None, key),
        };

        match parent {
            None => self.root.remove(last),
            Some(parent) => {
                let mut node = &mut self.root;
                for part in parent.split('/') {
                    node = node.get_mut(part)?.as_object_mut()?;
                }
                node.remove(last)
            }
        }
    }
}
