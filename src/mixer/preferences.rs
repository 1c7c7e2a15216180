//! Volume preferences
//!
//! Per-layer volumes persist in a string key/value store so a restarted
//! session comes back at the levels the listener last chose.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::bus::BusName;
use crate::engine::lock;
use crate::error::Result;

/// Volume used when nothing valid is stored.
pub const DEFAULT_VOLUME: f64 = 0.5;

/// String key/value storage.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        lock(&self.values).insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Store backed by a pretty-printed JSON object on disk.
///
/// The file is read once on open and rewritten on every `set`.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let values = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, values: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(values)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl PreferenceStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        lock(&self.values).get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = lock(&self.values);
        values.insert(key.to_string(), value.to_string());
        self.save(&values)
    }
}

/// Typed access to per-bus volumes.
#[derive(Clone)]
pub struct VolumePreferences {
    store: Arc<dyn PreferenceStore>,
}

impl VolumePreferences {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    /// In-memory preferences, all at the default volume.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Stored volume for `key`, or `fallback` when missing or unparseable.
    pub fn read_volume_preference(&self, key: &str, fallback: f64) -> f64 {
        match self.store.get(key) {
            Some(raw) => match raw.trim().parse::<f64>() {
                Ok(value) if value.is_finite() => value.clamp(0.0, 1.0),
                _ => {
                    warn!(key, raw = %raw, "Ignoring invalid stored volume");
                    fallback
                }
            },
            None => fallback,
        }
    }

    /// Persist `value` for `key`, clamped to `[0, 1]`.
    pub fn save_volume_preference(&self, key: &str, value: f64) -> Result<f64> {
        let value = if value.is_finite() {
            value.clamp(0.0, 1.0)
        } else {
            DEFAULT_VOLUME
        };
        self.store.set(key, &value.to_string())?;
        Ok(value)
    }

    /// Saved volume of a bus.
    pub fn volume(&self, bus: BusName) -> f64 {
        self.read_volume_preference(bus.preference_key(), DEFAULT_VOLUME)
    }

    pub fn set_volume(&self, bus: BusName, value: f64) -> Result<f64> {
        self.save_volume_preference(bus.preference_key(), value)
    }
}
