//! # Message Store
//!
//! Single source of truth for one conversation: the ordered turns and the
//! busy flag. Every mutation bumps a revision on a `watch` channel so a
//! presentation layer can re-render without polling.
//!
//! ```text
//! MessageStore
//! ├── turns: Vec<Turn>        // display order = chronological order
//! ├── busy: bool              // provider request outstanding
//! └── revision: watch<u64>    // bumped on every mutation
//! ```
//!
//! The store itself does not enforce conversation rules (who may append
//! what). `ChatSession` is its only writer and keeps busy == "an assistant
//! turn is open".

use thiserror::Error;
use tokio::sync::watch;

use crate::core::turn::{Role, Turn, TurnId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("conversation has no turns")]
    Empty,
}

#[derive(Debug)]
pub struct MessageStore {
    turns: Vec<Turn>,
    busy: bool,
    revision: watch::Sender<u64>,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self::with_turns(Vec::new())
    }

    /// Restores a conversation loaded from persistence. Never busy.
    pub fn with_turns(turns: Vec<Turn>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            turns,
            busy: false,
            revision,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// The appendable assistant turn, if a reply is in flight.
    pub fn open_turn(&self) -> Option<TurnId> {
        if !self.busy {
            return None;
        }
        self.turns
            .last()
            .filter(|t| t.role == Role::Assistant && !t.failed)
            .map(|t| t.id)
    }

    /// Observers receive the latest revision number after each mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.notify();
    }

    pub fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
        self.notify();
    }

    pub fn replace_last(&mut self, turn: Turn) -> Result<(), StoreError> {
        let last = self.turns.last_mut().ok_or(StoreError::Empty)?;
        *last = turn;
        self.notify();
        Ok(())
    }

    /// Drops every turn from `len` onwards.
    pub fn truncate(&mut self, len: usize) {
        if len < self.turns.len() {
            self.turns.truncate(len);
            self.notify();
        }
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.busy = false;
        self.notify();
    }

    fn notify(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut store = MessageStore::new();
        store.append(Turn::user("one"));
        store.append(Turn::assistant("two"));
        store.append(Turn::user("three"));

        let contents: Vec<_> = store.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_replace_last_on_empty_is_error() {
        let mut store = MessageStore::new();
        let rev = store.subscribe();

        assert_eq!(store.replace_last(Turn::assistant("x")), Err(StoreError::Empty));
        assert_eq!(store.replace_last(Turn::assistant("x")), Err(StoreError::Empty));
        assert!(store.turns().is_empty());
        assert_eq!(*rev.borrow(), 0);
    }

    #[test]
    fn test_replace_last_swaps_final_turn() {
        let mut store = MessageStore::new();
        store.append(Turn::user("hi"));
        let reply = Turn::assistant("");
        store.append(reply.clone());

        store.replace_last(reply.extended("Hello")).unwrap();
        assert_eq!(store.turns().len(), 2);
        assert_eq!(store.last().unwrap().content, "Hello");
        assert_eq!(store.last().unwrap().id, reply.id);
    }

    #[test]
    fn test_clear_resets_busy() {
        let mut store = MessageStore::new();
        store.append(Turn::user("hi"));
        store.set_busy(true);

        store.clear();
        assert!(store.turns().is_empty());
        assert!(!store.is_busy());
    }

    #[test]
    fn test_open_turn_requires_busy_assistant_tail() {
        let mut store = MessageStore::new();
        store.append(Turn::user("hi"));
        store.set_busy(true);
        assert_eq!(store.open_turn(), None);

        let reply = Turn::assistant("");
        store.append(reply.clone());
        assert_eq!(store.open_turn(), Some(reply.id));

        store.set_busy(false);
        assert_eq!(store.open_turn(), None);
    }

    #[test]
    fn test_observers_see_every_mutation() {
        let mut store = MessageStore::new();
        let mut rev = store.subscribe();

        store.append(Turn::user("hi"));
        store.set_busy(true);
        store.clear();

        assert!(rev.has_changed().unwrap());
        assert_eq!(*rev.borrow_and_update(), 3);
    }

    #[test]
    fn test_truncate_noop_when_shorter() {
        let mut store = MessageStore::new();
        store.append(Turn::user("a"));
        let rev = store.subscribe();

        store.truncate(5);
        assert_eq!(store.turns().len(), 1);
        assert!(!rev.has_changed().unwrap());
    }
}
