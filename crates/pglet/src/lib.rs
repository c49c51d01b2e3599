//! Asynchronous session runtime for an embedded, sandboxed Postgres-style
//! engine.
//!
//! The wrapped engine is single-threaded, synchronous, and non-reentrant;
//! it exchanges bytes with its host through a two-function bridge and
//! gives no other guarantees. This crate is everything around that:
//!
//! - a [`Session`] façade whose callers issue queries, transactions, and
//!   notification subscriptions concurrently while every actual engine
//!   invocation is serialized through one global execution slot;
//! - four exclusive [domains](domains::ExclusiveDomain) (query,
//!   transaction, listen, filesystem sync) that group intent and run
//!   their queued work strictly in submission order;
//! - a lazy [extension loader](extensions) with dependency ordering,
//!   cycle detection, and per-module memory accounting;
//! - snapshot capture/restore of the engine's entire memory region for
//!   fast cold start, with mandatory randomness reseeding on restore.

pub mod domains;
pub mod extensions;
pub mod notifications;
pub mod results;
pub mod session;
pub mod transaction;

pub use extensions::{
    BundleSource, ExtensionDescriptor, ExtensionSetup, ExtensionSource, Hook, LoadObserver,
    SetupFn,
};
pub use notifications::{ListenerId, NotificationCallback};
pub use results::{ExecSummary, QueryResult, Row};
pub use session::{Session, SessionConfig};
pub use transaction::Transaction;

pub use pglet_engine::{Engine, EngineFactory, IoBridge, Snapshot, SNAPSHOT_VERSION};
pub use pglet_error::{PgletError, Result};
pub use pglet_protocol::Notification;
pub use pglet_types::{
    BootOutcome, Compression, DebugLevel, EngineOptions, ExtensionMemoryStats, ExtensionStatus,
    LifecycleState,
};
pub use pglet_vfs::{Filesystem, MemoryFs};
