//! Incremental classification of the engine's response stream.
//!
//! The engine may write its response in many small increments per call,
//! and a frame boundary never lines up with a write boundary in general.
//! [`StreamClassifier::feed`] buffers partial frames across writes and
//! decodes complete ones as they arrive.
//!
//! Derived state within one call:
//! - **first error wins**: the first `ErrorResponse` is the one raised to
//!   the caller; later errors are retained in the message list but do not
//!   replace it. Consumption continues after an error so the engine never
//!   sees the host stop reading mid-call.
//! - notices and notifications are collected for dispatch after the call
//!   returns, never synchronously inside the stream.
//!
//! Carried across calls: the in-transaction flag, driven by `BEGIN` /
//! `COMMIT` / `ROLLBACK` command tags and corrected by every
//! `ReadyForQuery` status byte.

use pglet_error::Result;
use tracing::{trace, warn};

use crate::message::{BackendMessage, ErrorFields, Notification, TransactionStatus};

/// Everything one call produced, drained via
/// [`StreamClassifier::take_call_results`].
#[derive(Debug, Default)]
pub struct CallOutcome {
    /// Every message observed during the call, in stream order.
    pub messages: Vec<BackendMessage>,
    /// The first error observed, if any.
    pub first_error: Option<ErrorFields>,
    /// All notices observed.
    pub notices: Vec<ErrorFields>,
    /// Notifications pending asynchronous dispatch.
    pub notifications: Vec<Notification>,
    /// Whether a `ReadyForQuery` closed the cycle.
    pub ready: bool,
}

/// Incremental response-stream parser and session state tracker.
#[derive(Debug, Default)]
pub struct StreamClassifier {
    /// Bytes of an incomplete trailing frame, kept across feeds.
    pending: Vec<u8>,
    messages: Vec<BackendMessage>,
    first_error: Option<ErrorFields>,
    notices: Vec<ErrorFields>,
    notifications: Vec<Notification>,
    ready: bool,
    in_transaction: bool,
}

impl StreamClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a transaction block is currently open.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Consume a chunk of response bytes, decoding every complete frame.
    ///
    /// A decode failure leaves the classifier in an undefined stream
    /// position; the caller must [`reset`](Self::reset) before the next
    /// call.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<()> {
        self.pending.extend_from_slice(chunk);
        loop {
            if self.pending.len() < 5 {
                return Ok(());
            }
            let declared =
                u32::from_be_bytes([self.pending[1], self.pending[2], self.pending[3], self.pending[4]])
                    as usize;
            if declared < 4 {
                return Err(pglet_error::PgletError::protocol(format!(
                    "frame length {declared} below minimum"
                )));
            }
            let total = 1 + declared;
            if self.pending.len() < total {
                return Ok(());
            }
            let code = self.pending[0];
            let body: Vec<u8> = self.pending[5..total].to_vec();
            self.pending.drain(..total);
            let msg = BackendMessage::decode(code, &body)?;
            self.classify(msg);
        }
    }

    fn classify(&mut self, msg: BackendMessage) {
        match &msg {
            BackendMessage::ErrorResponse(fields) => {
                if self.first_error.is_none() {
                    self.first_error = Some(fields.clone());
                } else {
                    trace!(code = %fields.code, "suppressing error after the first");
                }
            }
            BackendMessage::NoticeResponse(fields) => {
                self.notices.push(fields.clone());
            }
            BackendMessage::NotificationResponse(n) => {
                self.notifications.push(n.clone());
            }
            BackendMessage::CommandComplete(tag) => match tag.as_str() {
                "BEGIN" => self.in_transaction = true,
                "COMMIT" | "ROLLBACK" => self.in_transaction = false,
                _ => {}
            },
            BackendMessage::ReadyForQuery(status) => {
                self.ready = true;
                // Authoritative: the engine's own view of the block.
                self.in_transaction = matches!(
                    status,
                    TransactionStatus::InTransaction | TransactionStatus::Failed
                );
            }
            _ => {}
        }
        self.messages.push(msg);
    }

    /// Drain the per-call results. The in-transaction flag survives.
    ///
    /// A call never ends mid-frame on a healthy stream; leftover partial
    /// bytes belong to a truncated response and are discarded here so
    /// they cannot corrupt the next call's parse.
    pub fn take_call_results(&mut self) -> CallOutcome {
        if !self.pending.is_empty() {
            warn!(
                buffered = self.pending.len(),
                "call ended inside a frame; discarding the partial"
            );
            self.pending.clear();
        }
        CallOutcome {
            messages: std::mem::take(&mut self.messages),
            first_error: self.first_error.take(),
            notices: std::mem::take(&mut self.notices),
            notifications: std::mem::take(&mut self.notifications),
            ready: std::mem::take(&mut self.ready),
        }
    }

    /// Discard all per-call state *and* any partial frame. Called after a
    /// stream error so a corrupted position is never reused.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.messages.clear();
        self.first_error = None;
        self.notices.clear();
        self.notifications.clear();
        self.ready = false;
    }
}
