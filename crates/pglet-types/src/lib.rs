//! Shared value types for the pglet session runtime.
//!
//! Small, dependency-light types used across the workspace: session
//! lifecycle, engine boot outcomes, engine options, and extension
//! introspection records. Anything with behavior lives in the crate that
//! owns the behavior; this crate is plain data.

use serde::{Deserialize, Serialize};

/// Lifecycle of a session.
///
/// A session moves `Initializing -> Ready` exactly once and
/// `Ready -> Closing -> Closed` exactly once. No state is ever revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// Construction in progress; no public operation may touch the engine.
    Initializing,
    /// Fully initialized and accepting operations.
    Ready,
    /// `close` has begun; engine-touching operations fail fast.
    Closing,
    /// Terminal state.
    Closed,
}

impl LifecycleState {
    /// Whether engine-touching operations are allowed in this state.
    #[must_use]
    pub const fn accepts_operations(self) -> bool {
        matches!(self, Self::Ready)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Outcome of the engine's boot-time state machine.
///
/// The wrapped engine signals its boot result through an opaque bitmask;
/// the runtime only distinguishes these four observed outcomes and maps
/// them to init success or failure. Anything finer-grained is a property
/// of the engine, not of the session runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// A fresh data directory was created during boot.
    MustCreate,
    /// Existing data was found and resumed.
    ResumedExisting,
    /// The configured user or database does not match the existing data.
    CredentialMismatch,
    /// The engine crashed during boot.
    Crashed,
}

impl BootOutcome {
    /// Whether this outcome counts as a successful initialization.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::MustCreate | Self::ResumedExisting)
    }
}

/// Verbosity of session-level diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum DebugLevel {
    /// No extra diagnostics.
    #[default]
    Off,
    /// Per-operation summaries.
    Info,
    /// Per-call protocol details.
    Verbose,
}

/// Compression applied to exported archives and snapshot envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Compression {
    /// Store bytes as-is.
    #[default]
    None,
    /// Wrap in a gzip envelope.
    Gzip,
}

/// Options handed to the engine at construction time.
///
/// The filesystem collaborator's `init` may rewrite these (for example to
/// point `data_dir` at its backing store) before the engine is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOptions {
    /// Role the engine boots as.
    pub username: String,
    /// Database the engine boots into.
    pub database: String,
    /// Data directory, as seen by the engine's filesystem.
    pub data_dir: String,
    /// Initial size of the engine's addressable memory region in bytes.
    pub initial_memory_bytes: usize,
    /// When true, filesystem syncs are scheduled but not awaited by the
    /// triggering call.
    pub relaxed_durability: bool,
    /// Diagnostic verbosity.
    pub debug: DebugLevel,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            username: "postgres".to_owned(),
            database: "postgres".to_owned(),
            data_dir: "/pgdata".to_owned(),
            initial_memory_bytes: 16 * 1024 * 1024,
            relaxed_durability: false,
            debug: DebugLevel::Off,
        }
    }
}

/// Read-only projection of one extension's load state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionStatus {
    /// Present in the configured set and not disabled by a feature flag.
    pub configured: bool,
    /// Bundle installed in engine memory.
    pub loaded: bool,
}

/// Memory accounting for one loaded extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExtensionMemoryStats {
    /// Size of the installed bundle in bytes.
    pub bundle_bytes: u64,
    /// Observed growth of the engine memory region after installing.
    pub heap_delta_bytes: u64,
}
