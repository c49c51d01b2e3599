//! Primary error type for the pglet session runtime.
//!
//! Structured variants for the five error families the runtime deals in:
//! engine-reported errors (surfaced from the response stream), protocol
//! errors (malformed stream, recoverable for the session), lifecycle
//! misuse, extension resolution failures, and snapshot artifact failures.
//! Every variant carries the identifiers a caller needs to diagnose the
//! failure without engine internals.

use thiserror::Error;

/// Primary error type for pglet operations.
#[derive(Error, Debug)]
pub enum PgletError {
    // === Engine-reported errors ===
    /// The engine reported an error in its response stream. The session
    /// survives; the error belongs to the triggering operation only.
    #[error("{severity}: {message} (SQLSTATE {code})")]
    EngineReported {
        severity: String,
        code: String,
        message: String,
    },

    // === Protocol / stream errors ===
    /// The response stream was malformed or truncated. Fatal to the
    /// current call; the stream classifier is reset afterwards.
    #[error("protocol error: {detail}")]
    Protocol { detail: String },

    /// The per-call response buffer reached its growth ceiling.
    #[error("response exceeds buffer ceiling of {limit} bytes")]
    ResponseOverflow { limit: usize },

    // === Lifecycle errors ===
    /// An engine-touching operation was attempted in a state that does
    /// not accept it.
    #[error("cannot {operation}: session is {state}")]
    Lifecycle { operation: String, state: String },

    /// The I/O bridge was invoked with no call in flight, or before
    /// handlers were installed. Always a programming error on the host
    /// side; failing loudly beats hanging the engine.
    #[error("I/O bridge {operation} invoked with no call in flight")]
    BridgeNotInstalled { operation: &'static str },

    /// The engine's boot state machine ended in a non-success outcome.
    #[error("engine boot failed: {detail}")]
    Boot { detail: String },

    // === Extension errors ===
    /// The named extension has no descriptor in the configured set.
    #[error("extension '{name}' is not configured")]
    ExtensionNotConfigured { name: String },

    /// A feature flag explicitly disables the named extension.
    #[error("extension '{name}' is disabled")]
    ExtensionDisabled { name: String },

    /// A declared dependency has no descriptor of its own.
    #[error("extension '{dependent}' depends on '{missing}', which is not configured")]
    MissingDependency { dependent: String, missing: String },

    /// Dependency resolution revisited a name already on the current
    /// resolution path.
    #[error("circular extension dependency: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },

    /// The extension's bundle could not be fetched or resolved.
    #[error("failed to fetch bundle for extension '{name}': {detail}")]
    BundleFetch { name: String, detail: String },

    // === Snapshot errors ===
    /// The artifact declares a version this runtime does not support.
    #[error("snapshot version {found} is not supported (expected {supported})")]
    SnapshotVersionMismatch { found: u32, supported: u32 },

    /// The artifact's trailing byte count does not match its declared
    /// heap size.
    #[error("truncated snapshot: header declares {expected} heap bytes, found {actual}")]
    SnapshotTruncated { expected: usize, actual: usize },

    /// The snapshot heap is larger than the fresh engine's allocation.
    #[error(
        "snapshot heap of {snapshot_size} bytes exceeds engine allocation of {allocation} bytes; \
         raise the initial memory size"
    )]
    SnapshotTooLarge {
        snapshot_size: usize,
        allocation: usize,
    },

    /// The artifact could not be parsed at all.
    #[error("malformed snapshot: {detail}")]
    SnapshotMalformed { detail: String },

    // === Passthrough ===
    /// File or stream I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot header serialization failure.
    #[error("snapshot header error: {0}")]
    Header(#[from] serde_json::Error),

    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl PgletError {
    /// Create a protocol error.
    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol {
            detail: detail.into(),
        }
    }

    /// Create a lifecycle error.
    pub fn lifecycle(operation: impl Into<String>, state: impl std::fmt::Display) -> Self {
        Self::Lifecycle {
            operation: operation.into(),
            state: state.to_string(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error was reported by the engine itself (as opposed
    /// to being raised by the runtime).
    #[must_use]
    pub const fn is_engine_error(&self) -> bool {
        matches!(self, Self::EngineReported { .. })
    }

    /// Whether the session remains usable after this error.
    ///
    /// Engine-reported and protocol errors are local to one call; the
    /// classifier is reset and the next operation proceeds normally.
    /// Extension errors leave unrelated extensions intact.
    #[must_use]
    pub const fn is_session_recoverable(&self) -> bool {
        !matches!(self, Self::Internal(_) | Self::BridgeNotInstalled { .. })
    }
}

/// Result type alias using [`PgletError`].
pub type Result<T> = std::result::Result<T, PgletError>;
