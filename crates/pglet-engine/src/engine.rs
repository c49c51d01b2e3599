//! The sealed engine contract.
//!
//! Everything the session runtime needs from the wrapped engine fits in
//! one trait: boot, one synchronous request/response round-trip through
//! the I/O bridge, raw access to the addressable memory region for
//! snapshots, bundle installation for extensions, and the mandatory
//! randomness reseed hook. SQL parsing, planning, storage, and
//! transactions all live behind [`Engine::pump`] and are none of the
//! runtime's business.

use std::sync::Arc;

use pglet_error::Result;
use pglet_types::{BootOutcome, EngineOptions};

use crate::bridge::IoBridge;

/// The opaque, synchronous, non-reentrant engine.
///
/// Implementations receive an [`IoBridge`] at construction and exchange
/// all request/response bytes through it. The runtime guarantees that
/// [`pump`](Self::pump) is never entered twice concurrently.
pub trait Engine: Send {
    /// Run the engine's boot state machine. The runtime maps the four
    /// observed outcomes to init success or failure and nothing more.
    fn start(&mut self) -> Result<BootOutcome>;

    /// Process exactly one request through the bridge: pull request
    /// bytes until exhausted, push the complete response.
    fn pump(&mut self) -> Result<()>;

    /// Current size of the addressable memory region in bytes.
    fn memory_size(&self) -> usize;

    /// The entire addressable memory region.
    fn memory(&self) -> &[u8];

    /// Mutable view of the addressable memory region.
    fn memory_mut(&mut self) -> &mut [u8];

    /// Grow the memory region to at least `min_bytes`.
    fn grow_memory(&mut self, min_bytes: usize) -> Result<()>;

    /// Install an extension bundle into engine memory and relink as
    /// required.
    fn install_bundle(&mut self, name: &str, bundle: &[u8]) -> Result<()>;

    /// Reseed the engine's internal randomness source. Mandatory after a
    /// snapshot restore: without it, every session restored from the same
    /// artifact replays identical "random" sequences.
    fn reseed_random(&mut self, seed: [u8; 32]) -> Result<()>;

    /// Engine version string.
    fn version(&self) -> &str;

    /// Terminate the engine's request-processing loop.
    fn shutdown(&mut self) -> Result<()>;
}

/// Constructor for fresh engine instances.
///
/// Restore and clone both need to build a new engine wired to a new
/// bridge; the session keeps the factory around for exactly that.
pub type EngineFactory =
    Arc<dyn Fn(&EngineOptions, Arc<IoBridge>) -> Result<Box<dyn Engine>> + Send + Sync>;
