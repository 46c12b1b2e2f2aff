//! # Core Application Logic
//!
//! The conversation model and everything that keeps it consistent. It knows
//! nothing about terminals or HTTP servers.
//!
//! ```text
//!                    ┌─────────────────────────┐
//!                    │         CORE            │
//!                    │  (this module)          │
//!                    │                         │
//!                    │  • Turn (data model)    │
//!                    │  • MessageStore         │
//!                    │  • ChatSession (rules)  │
//!                    └───────────┬─────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!     ┌────────────┐      ┌────────────┐      ┌────────────┐
//!     │   REPL     │      │   Proxy    │      │  History   │
//!     │  (client)  │      │  (server)  │      │  routes    │
//!     └────────────┘      └────────────┘      └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`turn`]: `Turn`, `Role`, `TurnId`
//! - [`store`]: `MessageStore`, the observable turn list and busy flag
//! - [`session`]: `ChatSession`, submit / apply / cancel / retry / clear
//! - [`local_store`]: per-key JSON files for the client's saved state
//! - [`settings`]: `ChatSettings`
//! - [`quick_actions`]: canned travel prompts
//! - [`history`]: saved conversations behind `/api/conversations`
//! - [`config`]: file, env and CLI configuration

pub mod config;
pub mod history;
pub mod local_store;
pub mod quick_actions;
pub mod session;
pub mod settings;
pub mod store;
pub mod turn;

pub use session::{Applied, ChatSession, PendingReply, SendError};
pub use store::{MessageStore, StoreError};
pub use turn::{Role, Turn, TurnId, WireMessage};
