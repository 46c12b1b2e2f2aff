//! # Reply Stream
//!
//! The line framing shared by the proxy (which writes it) and the client
//! (which reads it), plus the incremental decoder both sides build on.

pub mod consumer;
pub mod decoder;
pub mod record;

pub use consumer::{ConsumerState, StreamConsumer, StreamEvent};
pub use decoder::LineDecoder;
pub use record::Record;
