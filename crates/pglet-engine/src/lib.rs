//! The engine-facing half of the pglet session runtime.
//!
//! The wrapped engine is an opaque, synchronous, non-reentrant component
//! that exchanges bytes with its host through exactly two functions. This
//! crate owns everything on that boundary:
//!
//! - [`bridge`]: the build-time-fixed indirection slot the engine's
//!   compiled code always calls through. Swapping handlers is a plain
//!   assignment, never code generation, so the contract holds on hosts
//!   that forbid creating executable code at runtime.
//! - [`call`]: the state of one in-flight invocation — request cursor and
//!   the growth-capped response buffer.
//! - [`engine`]: the sealed [`Engine`](engine::Engine) trait and the
//!   factory used to construct fresh instances for restore and clone.
//! - [`script`]: an in-memory scripted engine, the test backend for
//!   everything above (the same role a memory VFS plays for file I/O).
//! - [`snapshot`]: the versioned memory-snapshot artifact codec.

pub mod bridge;
pub mod call;
pub mod engine;
pub mod script;
pub mod snapshot;

pub use bridge::{BridgeHandlers, IoBridge};
pub use call::{PendingCall, ResponseBuffer, DEFAULT_RESPONSE_CEILING};
pub use engine::{Engine, EngineFactory};
pub use snapshot::{Snapshot, SNAPSHOT_VERSION};
