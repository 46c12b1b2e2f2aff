//! # Turns
//!
//! One `Turn` is one message in a conversation. User turns are written once.
//! Assistant turns grow while their reply streams in, then are sealed.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque turn identifier, unique within a conversation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct TurnId(Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Turn {
    pub id: TurnId,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Synthetic assistant turn reporting a failed request. Never sent upstream.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub failed: bool,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            failed: false,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// The assistant turn shown when a request could not be completed.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            failed: true,
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Same turn with `fragment` appended to its content.
    pub fn extended(&self, fragment: &str) -> Self {
        let mut next = self.clone();
        next.content.push_str(fragment);
        next
    }
}

/// One entry of the history sent to `POST /api/chat`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl From<&Turn> for WireMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role,
            content: turn.content.clone(),
        }
    }
}
