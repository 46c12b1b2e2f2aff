//! # Local Persistence
//!
//! A small key-value store for client state, one JSON file per key under a
//! directory (`~/.wayfarer/local/` by default).
//!
//! Every failure here is logged and swallowed: losing the local copy of a
//! conversation must never break the chat itself. Writes use atomic rename
//! (write `.tmp`, then `rename()`).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::core::turn::Turn;

/// Key holding the serialized turns of the current conversation.
pub const HISTORY_KEY: &str = "chat-history";
/// Key holding the serialized `ChatSettings`.
pub const SETTINGS_KEY: &str = "chat-settings";

#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Reads and decodes `key`. Missing keys and unreadable values are `None`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path_for(key);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring malformed {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Encodes and writes `value` under `key`.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        match self.try_set(key, value) {
            Ok(()) => debug!("Saved local key {}", key),
            Err(e) => warn!("Failed to save local key {}: {}", key, e),
        }
    }

    pub fn remove(&self, key: &str) {
        let path = self.path_for(key);
        if let Err(e) = fs::remove_file(&path)
            && e.kind() != io::ErrorKind::NotFound
        {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }

    fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp_path = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }

    pub fn load_turns(&self) -> Vec<Turn> {
        self.get(HISTORY_KEY).unwrap_or_default()
    }

    pub fn save_turns(&self, turns: &[Turn]) {
        self.set(HISTORY_KEY, turns);
    }
}
