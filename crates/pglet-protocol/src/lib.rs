//! Wire-format handling for the pglet session runtime.
//!
//! The wrapped engine speaks the PostgreSQL v3 frontend/backend protocol
//! over its byte-stream interface. This crate provides:
//!
//! 1. **Frontend builders** ([`frontend`]): the small set of outbound
//!    messages the runtime itself emits (simple query, terminate).
//! 2. **Backend messages** ([`message`]): the classified units parsed
//!    from the response stream.
//! 3. **The stream classifier** ([`classifier`]): incremental parsing of
//!    the engine's outbound bytes into messages, plus the derived
//!    per-call state (first error, notices, pending notifications,
//!    transaction boundary tracking).

pub mod classifier;
pub mod frontend;
pub mod message;

pub use classifier::{CallOutcome, StreamClassifier};
pub use message::{
    BackendMessage, ErrorFields, FieldDescription, Notification, TransactionStatus,
};
