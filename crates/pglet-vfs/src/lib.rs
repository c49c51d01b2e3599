//! Filesystem collaborator for the pglet session runtime.
//!
//! The engine's virtual filesystem lives behind this narrow trait:
//! initialization (which may rewrite the engine options to point at the
//! backing store), durable-store synchronization in both directions,
//! whole-state export, and close. Per-backend implementations beyond the
//! in-memory one (persistent-store-backed, host-native) are external
//! collaborators that only need to satisfy this surface.

pub mod memory;

use pglet_error::Result;
use pglet_types::{Compression, EngineOptions};

pub use memory::{MemoryFs, SyncCounters};

/// A virtual filesystem backend the engine's data directory lives on.
pub trait Filesystem: Send {
    /// Backend name (e.g. "memory").
    fn name(&self) -> &'static str;

    /// Prepare the backing store and return the (possibly rewritten)
    /// engine options. Called once, before the engine boots.
    fn init(&mut self, options: EngineOptions) -> Result<EngineOptions>;

    /// Flush engine-visible state to the durable store.
    ///
    /// Under `relaxed` durability the backend may acknowledge before the
    /// bytes are durable.
    fn sync_to_durable(&mut self, relaxed: bool) -> Result<()>;

    /// Refresh engine-visible state from the durable store.
    fn sync_from_durable(&mut self) -> Result<()>;

    /// Export the entire data directory as a portable archive.
    fn export_state(&mut self, name: &str, compression: Compression) -> Result<Vec<u8>>;

    /// Release the backing store. The filesystem must not be used after.
    fn close(&mut self) -> Result<()>;
}
