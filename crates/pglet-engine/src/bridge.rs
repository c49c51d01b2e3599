//! The two-function byte contract between engine and host.
//!
//! The engine pulls request bytes with `read(max_len)` and pushes
//! response bytes with `write(bytes)`. Both land on a single addressable
//! slot holding the current handler pair; the engine's compiled code
//! always calls through the slot, so installing or swapping handlers is
//! data mutation and works on hosts that disallow generating new
//! executable code at call time.
//!
//! Invoking either function while no handlers are installed fails loudly
//! with [`PgletError::BridgeNotInstalled`] — a silent zero would leave
//! the engine spinning on an empty stream and hide the host bug.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use pglet_error::{PgletError, Result};
use tracing::debug;

/// Read handler: fill the caller's buffer, return bytes written.
pub type ReadFn = Box<dyn FnMut(&mut [u8]) -> Result<usize> + Send>;
/// Write handler: accept a chunk, return bytes accepted.
pub type WriteFn = Box<dyn FnMut(&[u8]) -> Result<usize> + Send>;

/// The current handler pair. A plain struct of function references — the
/// whole point is that replacing it is an assignment.
pub struct BridgeHandlers {
    pub read: ReadFn,
    pub write: WriteFn,
}

impl BridgeHandlers {
    /// An inert pair installed at close: reads produce no bytes, writes
    /// are swallowed. Used only once the session is past the point of
    /// caring about the stream.
    #[must_use]
    pub fn inert() -> Self {
        Self {
            read: Box::new(|_| Ok(0)),
            write: Box::new(|chunk| Ok(chunk.len())),
        }
    }
}

impl std::fmt::Debug for BridgeHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandlers").finish_non_exhaustive()
    }
}

/// The fixed indirection slot.
///
/// Also carries single-flight instrumentation: the engine is not
/// reentrant, so two overlapping invocations are a runtime bug, and the
/// bridge is the one place every invocation passes through.
#[derive(Debug, Default)]
pub struct IoBridge {
    slot: Mutex<Option<BridgeHandlers>>,
    in_call: AtomicBool,
}

impl IoBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the handler pair. Must happen before the first engine
    /// invocation; stays installed for the session's lifetime.
    pub fn install(&self, handlers: BridgeHandlers) {
        *self.slot.lock() = Some(handlers);
        debug!("bridge handlers installed");
    }

    /// Replace the handlers with the inert pair. Called on close.
    pub fn detach(&self) {
        *self.slot.lock() = Some(BridgeHandlers::inert());
        debug!("bridge detached to inert handlers");
    }

    /// Whether any handler pair (including the inert one) is installed.
    #[must_use]
    pub fn is_installed(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Mark the start of one engine invocation. Errors if another
    /// invocation is already in flight.
    pub fn begin_call(&self) -> Result<()> {
        if self.in_call.swap(true, Ordering::SeqCst) {
            return Err(PgletError::internal(
                "overlapping engine invocations observed at the I/O bridge",
            ));
        }
        Ok(())
    }

    /// Mark the end of the current engine invocation.
    pub fn end_call(&self) {
        self.in_call.store(false, Ordering::SeqCst);
    }

    /// Called by the engine to pull request bytes.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut slot = self.slot.lock();
        let handlers = slot
            .as_mut()
            .ok_or(PgletError::BridgeNotInstalled { operation: "read" })?;
        (handlers.read)(buf)
    }

    /// Called by the engine to push response bytes.
    pub fn write(&self, chunk: &[u8]) -> Result<usize> {
        let mut slot = self.slot.lock();
        let handlers = slot
            .as_mut()
            .ok_or(PgletError::BridgeNotInstalled { operation: "write" })?;
        (handlers.write)(chunk)
    }
}
