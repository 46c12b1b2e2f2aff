//! # Conversation History
//!
//! Saved conversations under `<data_dir>/conversations/`.
//!
//! Each conversation is a JSON document (`<uuid>.json`) holding its record
//! and its messages, plus a lightweight index (`index.json`) so listing
//! doesn't load every document.
//!
//! All writes use atomic rename (write `.tmp`, then `rename()`) for crash
//! safety. A mutex serializes writers so the index never loses an update.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::turn::Role;

pub const DEFAULT_TITLE: &str = "New Chat";
const INDEX_FILE: &str = "index.json";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A conversation with its messages, oldest first.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ConversationWithMessages {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<StoredMessage>,
}

#[derive(Serialize, Deserialize, Default, Debug)]
struct ConversationIndex {
    conversations: Vec<Conversation>,
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("conversation not found: {0}")]
    NotFound(String),
    #[error("history I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("history data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub struct HistoryStore {
    dir: PathBuf,
    /// Last timestamp handed out. Doubles as the writer lock.
    clock: Mutex<DateTime<Utc>>,
}

impl HistoryStore {
    /// Opens (creating if needed) the store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, HistoryError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!("Conversation history at {}", dir.display());
        Ok(Self {
            dir,
            clock: Mutex::new(DateTime::<Utc>::MIN_UTC),
        })
    }

    pub fn create(&self, title: Option<&str>) -> Result<Conversation, HistoryError> {
        let mut clock = self.lock();
        let now = tick(&mut clock);
        let title = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TITLE);

        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.write_document(&ConversationWithMessages {
            conversation: conversation.clone(),
            messages: Vec::new(),
        })?;
        self.update_index(|index| index.conversations.push(conversation.clone()))?;

        debug!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    /// All conversations, most recently updated first.
    pub fn list(&self) -> Result<Vec<Conversation>, HistoryError> {
        let _guard = self.lock();
        let mut conversations = self.load_index()?.conversations;
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    pub fn get(&self, id: &str) -> Result<ConversationWithMessages, HistoryError> {
        let _guard = self.lock();
        let mut document = self.read_document(id)?;
        document.messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(document)
    }

    /// Adds a message and bumps the conversation's `updated_at`.
    pub fn append_message(
        &self,
        id: &str,
        role: Role,
        content: &str,
        model: Option<&str>,
    ) -> Result<StoredMessage, HistoryError> {
        let mut clock = self.lock();
        let mut document = self.read_document(id)?;
        let now = tick(&mut clock);

        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: document.conversation.id.clone(),
            role,
            content: content.to_string(),
            model: model.map(str::to_string),
            created_at: now,
        };
        document.messages.push(message.clone());
        document.conversation.updated_at = now;

        self.write_document(&document)?;
        self.update_index(|index| replace_entry(index, &document.conversation))?;
        Ok(message)
    }

    pub fn rename(&self, id: &str, title: &str) -> Result<Conversation, HistoryError> {
        let mut clock = self.lock();
        let mut document = self.read_document(id)?;
        document.conversation.title = title.trim().to_string();
        document.conversation.updated_at = tick(&mut clock);

        self.write_document(&document)?;
        self.update_index(|index| replace_entry(index, &document.conversation))?;
        Ok(document.conversation)
    }

    /// Removes the conversation and its messages.
    pub fn delete(&self, id: &str) -> Result<(), HistoryError> {
        let _guard = self.lock();
        let path = self.document_path(id)?;
        if !path.exists() {
            return Err(HistoryError::NotFound(id.to_string()));
        }
        fs::remove_file(&path)?;
        self.update_index(|index| index.conversations.retain(|c| c.id != id))?;
        debug!("Deleted conversation {}", id);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        self.clock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Only UUIDs name documents, so ids can't escape the directory.
    fn document_path(&self, id: &str) -> Result<PathBuf, HistoryError> {
        let uuid = Uuid::parse_str(id).map_err(|_| HistoryError::NotFound(id.to_string()))?;
        Ok(self.dir.join(format!("{uuid}.json")))
    }

    fn read_document(&self, id: &str) -> Result<ConversationWithMessages, HistoryError> {
        let path = self.document_path(id)?;
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(HistoryError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&json)?)
    }

    fn write_document(&self, document: &ConversationWithMessages) -> Result<(), HistoryError> {
        let path = self.document_path(&document.conversation.id)?;
        atomic_write_json(&path, document)
    }

    fn load_index(&self) -> Result<ConversationIndex, HistoryError> {
        let path = self.dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(ConversationIndex::default());
        }
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    fn update_index(&self, edit: impl FnOnce(&mut ConversationIndex)) -> Result<(), HistoryError> {
        let mut index = self.load_index()?;
        edit(&mut index);
        atomic_write_json(&self.dir.join(INDEX_FILE), &index)
    }
}

/// Hands out strictly increasing timestamps so ordering by time is total.
fn tick(last: &mut DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now().max(*last + Duration::microseconds(1));
    *last = now;
    now
}

fn replace_entry(index: &mut ConversationIndex, conversation: &Conversation) {
    index.conversations.retain(|c| c.id != conversation.id);
    index.conversations.push(conversation.clone());
}

fn atomic_write_json<T: Serialize>(path: &Path, data: &T) -> Result<(), HistoryError> {
    let tmp_path = path.with_extension("tmp");
    let json = serde_json::to_string_pretty(data)?;
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
