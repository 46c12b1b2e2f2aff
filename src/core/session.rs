//! # Chat Session
//!
//! The context object that owns one conversation. It is the only writer of
//! its [`MessageStore`] and keeps the conversation rules:
//!
//! - at most one assistant turn is open, and busy is true iff one is;
//! - a reply stream only ever writes to the turn it was opened for;
//! - the turn list is saved locally whenever it changes shape.
//!
//! ```text
//!   submit ──▶ [user] [assistant ""]   busy, reply targets the open turn
//!                           │
//!        Ongoing(f) ────────┤  replace_last(content + f)
//!        Completed ─────────┤  seal
//!        Failed(_) ─────────┘  seal, append error turn
//! ```
//!
//! Sessions are plain values: several can coexist, each with its own store.

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::watch;

use crate::client::ChatTransport;
use crate::core::local_store::LocalStore;
use crate::core::store::MessageStore;
use crate::core::turn::{Role, Turn, TurnId, WireMessage};
use crate::stream::{StreamConsumer, StreamEvent};

/// Content of the assistant turn shown when a reply fails.
pub const ERROR_REPLY: &str = "Sorry, I encountered an error. Please try again.";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("a reply is still in progress")]
    Busy,
    #[error("the last reply did not fail, nothing to retry")]
    NothingToRetry,
}

/// A reply the caller must now fetch: where it goes and what to send.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReply {
    pub target: TurnId,
    pub history: Vec<WireMessage>,
}

/// What [`ChatSession::apply`] did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Appended,
    Completed,
    Failed,
    /// The target is no longer the open turn.
    Discarded,
}

pub struct ChatSession {
    store: MessageStore,
    local: Option<LocalStore>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    /// A session that is never saved.
    pub fn new() -> Self {
        Self {
            store: MessageStore::new(),
            local: None,
        }
    }

    /// Restores the saved conversation from `local` and keeps it updated.
    pub fn with_local_store(local: LocalStore) -> Self {
        let turns = local.load_turns();
        info!("Restored {} turns from {}", turns.len(), local.dir().display());
        Self {
            store: MessageStore::with_turns(turns),
            local: Some(local),
        }
    }

    pub fn turns(&self) -> &[Turn] {
        self.store.turns()
    }

    pub fn is_busy(&self) -> bool {
        self.store.is_busy()
    }

    pub fn open_turn(&self) -> Option<TurnId> {
        self.store.open_turn()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.store.subscribe()
    }

    /// Starts a new exchange. Rejected requests leave the session untouched.
    pub fn submit(&mut self, text: &str) -> Result<PendingReply, SendError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::EmptyMessage);
        }
        if self.store.is_busy() {
            debug!("Submit rejected: reply in progress");
            return Err(SendError::Busy);
        }

        self.store.append(Turn::user(text));
        let history = self
            .store
            .turns()
            .iter()
            .filter(|t| !t.failed && !(t.role == Role::Assistant && t.content.is_empty()))
            .map(WireMessage::from)
            .collect();

        let reply = Turn::assistant("");
        let target = reply.id;
        self.store.append(reply);
        self.store.set_busy(true);
        self.persist();

        debug!("Reply {} opened", target);
        Ok(PendingReply { target, history })
    }

    /// Folds one stream event into the conversation.
    pub fn apply(&mut self, target: TurnId, event: StreamEvent) -> Applied {
        if self.store.open_turn() != Some(target) {
            debug!("Discarding event for stale reply {}", target);
            return Applied::Discarded;
        }

        match event {
            StreamEvent::Ongoing(fragment) => {
                let Some(grown) = self.store.last().map(|t| t.extended(&fragment)) else {
                    return Applied::Discarded;
                };
                if let Err(e) = self.store.replace_last(grown) {
                    warn!("Could not extend reply {}: {}", target, e);
                    return Applied::Discarded;
                }
                Applied::Appended
            }
            StreamEvent::Completed => {
                self.seal();
                Applied::Completed
            }
            StreamEvent::Failed(reason) => {
                warn!("Reply {} failed: {}", target, reason);
                let partial_is_empty = self.store.last().is_some_and(|t| t.content.is_empty());
                let error_turn = Turn::error(ERROR_REPLY);
                if partial_is_empty {
                    if let Err(e) = self.store.replace_last(error_turn) {
                        warn!("Could not record failure: {}", e);
                    }
                } else {
                    self.store.append(error_turn);
                }
                self.seal();
                Applied::Failed
            }
        }
    }

    /// Stops accepting writes for the open reply. Returns whether one was open.
    pub fn cancel(&mut self) -> bool {
        match self.store.open_turn() {
            Some(target) => {
                info!("Reply {} cancelled", target);
                self.seal();
                true
            }
            None => false,
        }
    }

    /// Removes the failed exchange at the end and sends its message again.
    pub fn retry(&mut self) -> Result<PendingReply, SendError> {
        if self.store.is_busy() {
            return Err(SendError::Busy);
        }
        let turns = self.store.turns();
        if !turns.last().is_some_and(|t| t.failed) {
            return Err(SendError::NothingToRetry);
        }

        // Error turn, then the partial reply if one survived.
        let mut cut = turns.len() - 1;
        if cut > 0 && turns[cut - 1].role == Role::Assistant && !turns[cut - 1].failed {
            cut -= 1;
        }
        if cut == 0 || turns[cut - 1].role != Role::User {
            return Err(SendError::NothingToRetry);
        }
        let text = turns[cut - 1].content.clone();

        info!("Retrying last message");
        self.store.truncate(cut - 1);
        self.submit(&text)
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.persist();
    }

    /// Sends `reply` through `transport` and applies the reply stream until
    /// it ends or stops being the open turn.
    pub async fn run_reply<T>(&mut self, transport: &T, reply: PendingReply) -> Applied
    where
        T: ChatTransport + ?Sized,
    {
        self.run_reply_with(transport, reply, |_| {}).await
    }

    /// Like [`run_reply`](Self::run_reply), calling `on_fragment` with each
    /// fragment the open turn actually accepted.
    pub async fn run_reply_with<T, F>(
        &mut self,
        transport: &T,
        reply: PendingReply,
        mut on_fragment: F,
    ) -> Applied
    where
        T: ChatTransport + ?Sized,
        F: FnMut(&str),
    {
        let PendingReply { target, history } = reply;

        let body = match transport.send(&history).await {
            Ok(body) => body,
            Err(e) => return self.apply(target, StreamEvent::Failed(e.to_string())),
        };

        let mut consumer = StreamConsumer::new(body);
        let mut outcome = Applied::Discarded;
        while let Some(event) = consumer.next().await {
            let fragment = match &event {
                StreamEvent::Ongoing(fragment) => Some(fragment.clone()),
                _ => None,
            };
            outcome = self.apply(target, event);
            match (outcome, fragment) {
                (Applied::Appended, Some(fragment)) => on_fragment(&fragment),
                (Applied::Discarded, _) => {
                    debug!("Reply {} no longer open, stopping", target);
                    break;
                }
                _ => {}
            }
        }
        outcome
    }

    fn seal(&mut self) {
        self.store.set_busy(false);
        self.persist();
    }

    /// Saves every sealed turn. The open reply is saved once it is sealed.
    fn persist(&self) {
        let Some(local) = &self.local else {
            return;
        };
        let turns = self.store.turns();
        let sealed = match self.store.open_turn() {
            Some(_) => &turns[..turns.len() - 1],
            None => turns,
        };
        local.save_turns(sealed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::TransportError;
    use crate::stream::Record;
    use crate::test_support::ScriptedTransport;
    use bytes::Bytes;

    fn contents(session: &ChatSession) -> Vec<(Role, String, bool)> {
        session
            .turns()
            .iter()
            .map(|t| (t.role, t.content.clone(), t.failed))
            .collect()
    }

    fn assert_busy_iff_open(session: &ChatSession) {
        assert_eq!(session.is_busy(), session.open_turn().is_some());
    }

    #[test]
    fn test_blank_submit_is_rejected() {
        let mut session = ChatSession::new();
        assert_eq!(session.submit("   \n"), Err(SendError::EmptyMessage));
        assert!(session.turns().is_empty());
        assert!(!session.is_busy());
    }

    #[test]
    fn test_submit_opens_reply() {
        let mut session = ChatSession::new();
        let reply = session.submit("  Paris in spring?  ").unwrap();

        assert!(session.is_busy());
        assert_eq!(session.open_turn(), Some(reply.target));
        assert_eq!(
            reply.history,
            vec![WireMessage { role: Role::User, content: "Paris in spring?".into() }]
        );
        assert_eq!(session.turns()[0].content, "Paris in spring?");
        assert_busy_iff_open(&session);
    }

    #[test]
    fn test_submit_while_busy_has_no_effect() {
        let mut session = ChatSession::new();
        session.submit("first").unwrap();
        let before = session.turns().to_vec();
        let rev = session.subscribe();

        assert_eq!(session.submit("second"), Err(SendError::Busy));
        assert_eq!(session.turns(), before.as_slice());
        assert!(!rev.has_changed().unwrap());
    }

    #[test]
    fn test_fragments_accumulate_then_seal() {
        let mut session = ChatSession::new();
        let reply = session.submit("hi").unwrap();

        for fragment in ["Hel", "lo", " there"] {
            assert_eq!(
                session.apply(reply.target, StreamEvent::Ongoing(fragment.into())),
                Applied::Appended
            );
            assert_busy_iff_open(&session);
        }
        assert_eq!(session.apply(reply.target, StreamEvent::Completed), Applied::Completed);

        assert!(!session.is_busy());
        assert_eq!(session.turns()[1].content, "Hello there");
        assert_eq!(session.turns()[1].id, reply.target);
        // Sealed: no more writes.
        assert_eq!(
            session.apply(reply.target, StreamEvent::Ongoing("!".into())),
            Applied::Discarded
        );
        assert_eq!(session.turns()[1].content, "Hello there");
    }

    #[test]
    fn test_failure_keeps_partial_and_appends_error() {
        let mut session = ChatSession::new();
        let reply = session.submit("hi").unwrap();
        session.apply(reply.target, StreamEvent::Ongoing("Hel".into()));
        session.apply(reply.target, StreamEvent::Ongoing("lo".into()));
        session.apply(reply.target, StreamEvent::Failed("connection reset".into()));

        assert_eq!(
            contents(&session),
            vec![
                (Role::User, "hi".into(), false),
                (Role::Assistant, "Hello".into(), false),
                (Role::Assistant, ERROR_REPLY.into(), true),
            ]
        );
        assert!(!session.is_busy());
        assert_busy_iff_open(&session);
    }

    #[test]
    fn test_failure_before_any_text_replaces_placeholder() {
        let mut session = ChatSession::new();
        let reply = session.submit("hi").unwrap();
        session.apply(reply.target, StreamEvent::Failed("HTTP 500".into()));

        assert_eq!(
            contents(&session),
            vec![
                (Role::User, "hi".into(), false),
                (Role::Assistant, ERROR_REPLY.into(), true),
            ]
        );
        assert!(!session.is_busy());
    }

    #[test]
    fn test_cancelled_reply_ignores_late_writes() {
        let mut session = ChatSession::new();
        let first = session.submit("one").unwrap();
        session.apply(first.target, StreamEvent::Ongoing("partial".into()));
        assert!(session.cancel());
        assert!(!session.cancel());

        let second = session.submit("two").unwrap();
        assert_eq!(
            session.apply(first.target, StreamEvent::Ongoing(" stale".into())),
            Applied::Discarded
        );
        assert_eq!(
            session.apply(first.target, StreamEvent::Failed("late".into())),
            Applied::Discarded
        );
        session.apply(second.target, StreamEvent::Ongoing("fresh".into()));

        assert_eq!(session.turns()[1].content, "partial");
        assert_eq!(session.turns()[3].content, "fresh");
        assert_eq!(session.open_turn(), Some(second.target));
        // The cancelled partial reply is part of the next request's history.
        assert_eq!(second.history.len(), 3);
    }

    #[test]
    fn test_history_excludes_error_and_empty_turns() {
        let mut session = ChatSession::new();
        let reply = session.submit("one").unwrap();
        session.apply(reply.target, StreamEvent::Failed("boom".into()));
        session.submit("two").unwrap();
        session.cancel();

        let reply = session.submit("three").unwrap();
        let sent: Vec<_> = reply.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(sent, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_retry_resubmits_failed_exchange() {
        let mut session = ChatSession::new();
        let reply = session.submit("Rent a car in Crete").unwrap();
        session.apply(reply.target, StreamEvent::Ongoing("Sure".into()));
        session.apply(reply.target, StreamEvent::Failed("dropped".into()));

        let retried = session.retry().unwrap();
        assert_eq!(
            contents(&session),
            vec![
                (Role::User, "Rent a car in Crete".into(), false),
                (Role::Assistant, String::new(), false),
            ]
        );
        assert_eq!(session.open_turn(), Some(retried.target));
        assert_eq!(retried.history.len(), 1);
    }

    #[test]
    fn test_retry_requires_failed_tail() {
        let mut session = ChatSession::new();
        assert_eq!(session.retry(), Err(SendError::NothingToRetry));

        let reply = session.submit("hi").unwrap();
        assert_eq!(session.retry(), Err(SendError::Busy));
        session.apply(reply.target, StreamEvent::Completed);
        assert_eq!(session.retry(), Err(SendError::NothingToRetry));
    }

    #[test]
    fn test_clear_resets_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ChatSession::with_local_store(LocalStore::new(dir.path()));
        let reply = session.submit("hi").unwrap();
        session.apply(reply.target, StreamEvent::Completed);

        session.clear();
        assert!(session.turns().is_empty());
        assert!(!session.is_busy());
        assert!(LocalStore::new(dir.path()).load_turns().is_empty());
    }

    #[test]
    fn test_persisted_conversation_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let original = {
            let mut session = ChatSession::with_local_store(LocalStore::new(dir.path()));
            let reply = session.submit("Where to eat in Rome?").unwrap();
            session.apply(reply.target, StreamEvent::Ongoing("Trastevere 🍝".into()));
            session.apply(reply.target, StreamEvent::Completed);
            session.turns().to_vec()
        };

        let restored = ChatSession::with_local_store(LocalStore::new(dir.path()));
        assert_eq!(restored.turns(), original.as_slice());
        assert!(!restored.is_busy());
    }

    #[test]
    fn test_open_reply_is_not_persisted_until_sealed() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStore::new(dir.path());
        let mut session = ChatSession::with_local_store(local.clone());
        let reply = session.submit("hi").unwrap();
        session.apply(reply.target, StreamEvent::Ongoing("Hel".into()));

        assert_eq!(local.load_turns().len(), 1);
        session.apply(reply.target, StreamEvent::Completed);
        assert_eq!(local.load_turns().len(), 2);
        assert_eq!(local.load_turns()[1].content, "Hel");
    }

    #[tokio::test]
    async fn test_run_reply_streams_into_target() {
        let mut body = Record::text("Bonjour").encode();
        body.push_str(&Record::text(" 🇫🇷").encode());
        body.push_str(&Record::finish().encode());
        let transport = ScriptedTransport::split(body.as_bytes(), 3);

        let mut session = ChatSession::new();
        let reply = session.submit("Say hi in French").unwrap();
        let outcome = session.run_reply(&transport, reply).await;

        assert_eq!(outcome, Applied::Completed);
        assert_eq!(session.turns()[1].content, "Bonjour 🇫🇷");
        assert!(!session.is_busy());
        assert_eq!(transport.requests()[0][0].content, "Say hi in French");
    }

    #[tokio::test]
    async fn test_run_reply_transport_error_mid_stream() {
        let transport = ScriptedTransport::chunks(vec![
            Ok(Bytes::from(Record::text("Hel").encode())),
            Ok(Bytes::from(Record::text("lo").encode())),
            Err(TransportError::Network("connection reset".into())),
        ]);

        let mut session = ChatSession::new();
        let reply = session.submit("hi").unwrap();
        let outcome = session.run_reply(&transport, reply).await;

        assert_eq!(outcome, Applied::Failed);
        assert_eq!(session.turns()[1].content, "Hello");
        assert!(session.turns()[2].failed);
        assert!(!session.is_busy());
    }

    #[tokio::test]
    async fn test_run_reply_rejected_request() {
        let transport = ScriptedTransport::rejecting(TransportError::Status(429));
        let mut session = ChatSession::new();
        let reply = session.submit("hi").unwrap();

        assert_eq!(session.run_reply(&transport, reply).await, Applied::Failed);
        assert_eq!(session.turns().len(), 2);
        assert_eq!(session.turns()[1].content, ERROR_REPLY);
    }

    #[tokio::test]
    async fn test_run_reply_with_reports_accepted_fragments() {
        let mut body = Record::text("Take the ").encode();
        body.push_str(&Record::text("night train.").encode());
        let transport = ScriptedTransport::split(body.as_bytes(), 5);

        let mut session = ChatSession::new();
        let reply = session.submit("Vienna to Venice?").unwrap();
        let mut shown = Vec::new();
        let outcome = session
            .run_reply_with(&transport, reply, |f| shown.push(f.to_string()))
            .await;

        assert_eq!(outcome, Applied::Completed);
        assert_eq!(shown.concat(), "Take the night train.");
        assert_eq!(session.turns()[1].content, "Take the night train.");
    }

    #[tokio::test]
    async fn test_run_reply_with_hides_fragments_for_stale_target() {
        let transport =
            ScriptedTransport::chunks(vec![Ok(Bytes::from(Record::text("late").encode()))]);
        let mut session = ChatSession::new();
        let reply = session.submit("hi").unwrap();
        session.cancel();

        let mut shown = Vec::new();
        let outcome = session
            .run_reply_with(&transport, reply, |f| shown.push(f.to_string()))
            .await;

        assert_eq!(outcome, Applied::Discarded);
        assert!(shown.is_empty());
        assert_eq!(session.turns()[1].content, "");
    }
}
