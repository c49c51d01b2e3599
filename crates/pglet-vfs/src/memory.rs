//! In-memory filesystem backend.
//!
//! All state lives in a byte map with no persistence; the "durable
//! store" is a second map the sync operations copy into and out of.
//! Sync counters are observable through a cloneable handle so callers
//! can assert coalescing behavior after the backend has been boxed away.

use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use pglet_error::{PgletError, Result};
use pglet_types::{Compression, EngineOptions};
use tracing::debug;

use crate::Filesystem;

/// Cloneable view of a [`MemoryFs`]'s sync activity.
#[derive(Debug, Clone, Default)]
pub struct SyncCounters {
    to_durable: Arc<AtomicU64>,
    from_durable: Arc<AtomicU64>,
}

impl SyncCounters {
    /// Completed syncs toward the durable store.
    #[must_use]
    pub fn to_durable(&self) -> u64 {
        self.to_durable.load(Ordering::SeqCst)
    }

    /// Completed syncs from the durable store.
    #[must_use]
    pub fn from_durable(&self) -> u64 {
        self.from_durable.load(Ordering::SeqCst)
    }
}

/// In-memory filesystem with a byte-map store.
#[derive(Debug, Default)]
pub struct MemoryFs {
    live: HashMap<String, Vec<u8>>,
    durable: HashMap<String, Vec<u8>>,
    counters: SyncCounters,
    closed: bool,
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for observing sync counts after boxing.
    #[must_use]
    pub fn counters(&self) -> SyncCounters {
        self.counters.clone()
    }

    /// Write a file into the live store (test seeding).
    pub fn put(&mut self, path: impl Into<String>, bytes: Vec<u8>) {
        self.live.insert(path.into(), bytes);
    }

    /// Read a file from the live store.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.live.get(path).map(Vec::as_slice)
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.closed {
            return Err(PgletError::lifecycle(operation, "closed"));
        }
        Ok(())
    }
}

impl Filesystem for MemoryFs {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn init(&mut self, mut options: EngineOptions) -> Result<EngineOptions> {
        self.ensure_open("init filesystem")?;
        options.data_dir = "/pglet/base".to_owned();
        debug!(data_dir = %options.data_dir, "memory filesystem initialized");
        Ok(options)
    }

    fn sync_to_durable(&mut self, relaxed: bool) -> Result<()> {
        self.ensure_open("sync filesystem")?;
        self.durable = self.live.clone();
        self.counters.to_durable.fetch_add(1, Ordering::SeqCst);
        debug!(relaxed, files = self.live.len(), "synced to durable store");
        Ok(())
    }

    fn sync_from_durable(&mut self) -> Result<()> {
        self.ensure_open("sync filesystem")?;
        self.live = self.durable.clone();
        self.counters.from_durable.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn export_state(&mut self, name: &str, compression: Compression) -> Result<Vec<u8>> {
        self.ensure_open("export filesystem state")?;
        let archive = serde_json::json!({
            "name": name,
            "files": self
                .live
                .iter()
                .map(|(path, bytes)| (path.clone(), bytes.len()))
                .collect::<HashMap<_, _>>(),
        });
        let raw = serde_json::to_vec(&archive).map_err(PgletError::Header)?;
        match compression {
            Compression::None => Ok(raw),
            Compression::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), GzLevel::default());
                encoder.write_all(&raw)?;
                Ok(encoder.finish()?)
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        self.ensure_open("close filesystem")?;
        self.closed = true;
        self.live.clear();
        Ok(())
    }
}
