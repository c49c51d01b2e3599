//! Snapshot capture, restore, reseeding, and artifact validation.

mod common;

use std::collections::HashSet;
use std::sync::Arc;

use common::factory;
use pglet::{
    BootOutcome, Engine, EngineFactory, ExtensionDescriptor, IoBridge, MemoryFs, PgletError,
    Session, SessionConfig, Snapshot, SNAPSHOT_VERSION,
};
use pglet_engine::script::{ScriptLog, ScriptedEngine};
use pglet_error::Result;
use pglet_types::EngineOptions;

fn config_with(extensions: Vec<ExtensionDescriptor>) -> SessionConfig {
    SessionConfig {
        extensions,
        disabled_extensions: HashSet::new(),
        eager_load_extensions: false,
        ..SessionConfig::default()
    }
}

#[tokio::test]
async fn round_trip_restores_heap_and_marks_extensions_preloaded() {
    let descriptors = vec![ExtensionDescriptor::bundle("vec", vec![0xAB; 32])];

    let log1 = Arc::new(ScriptLog::default());
    let session = Session::open(
        factory(Arc::clone(&log1), Vec::new()),
        Box::new(MemoryFs::new()),
        config_with(descriptors.clone()),
    )
    .await
    .expect("first session");
    session.load_extension("vec").await.expect("load");

    let snapshot = session.capture_snapshot().await.expect("capture");
    assert_eq!(snapshot.version, SNAPSHOT_VERSION);
    assert_eq!(snapshot.extension_names, vec!["vec".to_owned()]);
    // Defensive copy of the whole region: base allocation plus bundle.
    assert_eq!(
        snapshot.heap_size(),
        EngineOptions::default().initial_memory_bytes + 32
    );

    let log2 = Arc::new(ScriptLog::default());
    let restored = Session::restore_from_snapshot(
        factory(Arc::clone(&log2), Vec::new()),
        Box::new(MemoryFs::new()),
        config_with(descriptors),
        &snapshot,
    )
    .await
    .expect("restore");

    // The bundle lives inside the restored heap; nothing reinstalls.
    assert!(restored.extension_status()["vec"].loaded);
    assert!(log2.installed_bundles().is_empty());
    // Randomness was reseeded exactly once.
    assert_eq!(log2.seeds().len(), 1);

    let recaptured = restored.capture_snapshot().await.expect("recapture");
    assert_eq!(recaptured.heap, snapshot.heap);
}

#[tokio::test]
async fn two_restores_receive_differing_seeds() {
    let session = Session::open(
        factory(Arc::new(ScriptLog::default()), Vec::new()),
        Box::new(MemoryFs::new()),
        SessionConfig::default(),
    )
    .await
    .expect("session");
    let snapshot = session.capture_snapshot().await.expect("capture");

    let mut seeds = Vec::new();
    for _ in 0..2 {
        let log = Arc::new(ScriptLog::default());
        Session::restore_from_snapshot(
            factory(Arc::clone(&log), Vec::new()),
            Box::new(MemoryFs::new()),
            SessionConfig::default(),
            &snapshot,
        )
        .await
        .expect("restore");
        seeds.push(log.seeds()[0]);
    }
    assert_ne!(seeds[0], seeds[1]);
}

#[tokio::test]
async fn unsupported_version_is_rejected_before_boot() {
    let snapshot = Snapshot {
        version: 9,
        captured_at: 0,
        engine_version: None,
        extension_names: Vec::new(),
        heap: vec![0; 64],
    };

    let log = Arc::new(ScriptLog::default());
    let result = Session::restore_from_snapshot(
        factory(Arc::clone(&log), Vec::new()),
        Box::new(MemoryFs::new()),
        SessionConfig::default(),
        &snapshot,
    )
    .await;
    assert!(matches!(
        result,
        Err(PgletError::SnapshotVersionMismatch {
            found: 9,
            supported: SNAPSHOT_VERSION,
        })
    ));
    // Nothing engine-touching happened.
    assert!(log.requests().is_empty());
    assert_eq!(log.shutdowns(), 0);
}

/// Scripted engine whose memory region cannot grow past a fixed cap,
/// standing in for a host that refuses large allocations.
struct CappedEngine {
    inner: ScriptedEngine,
    cap: usize,
}

impl Engine for CappedEngine {
    fn start(&mut self) -> Result<BootOutcome> {
        self.inner.start()
    }
    fn pump(&mut self) -> Result<()> {
        self.inner.pump()
    }
    fn memory_size(&self) -> usize {
        self.inner.memory_size()
    }
    fn memory(&self) -> &[u8] {
        self.inner.memory()
    }
    fn memory_mut(&mut self) -> &mut [u8] {
        self.inner.memory_mut()
    }
    fn grow_memory(&mut self, min_bytes: usize) -> Result<()> {
        if min_bytes <= self.cap {
            self.inner.grow_memory(min_bytes)?;
        }
        Ok(())
    }
    fn install_bundle(&mut self, name: &str, bundle: &[u8]) -> Result<()> {
        self.inner.install_bundle(name, bundle)
    }
    fn reseed_random(&mut self, seed: [u8; 32]) -> Result<()> {
        self.inner.reseed_random(seed)
    }
    fn version(&self) -> &str {
        self.inner.version()
    }
    fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown()
    }
}

fn capped_factory(cap: usize) -> EngineFactory {
    Arc::new(move |options: &EngineOptions, bridge: Arc<IoBridge>| {
        let small = EngineOptions {
            initial_memory_bytes: options.initial_memory_bytes.min(cap),
            ..options.clone()
        };
        Ok(Box::new(CappedEngine {
            inner: ScriptedEngine::new(&small, bridge),
            cap,
        }) as Box<dyn Engine>)
    })
}

#[tokio::test]
async fn oversized_heap_fails_with_both_sizes() {
    let snapshot = Snapshot::capture(vec![7; 1024], None, Vec::new());
    let result = Session::restore_from_snapshot(
        capped_factory(64),
        Box::new(MemoryFs::new()),
        SessionConfig::default(),
        &snapshot,
    )
    .await;
    assert!(matches!(
        result,
        Err(PgletError::SnapshotTooLarge {
            snapshot_size: 1024,
            allocation: 64,
        })
    ));
}

#[tokio::test]
async fn artifact_codec_round_trips_with_and_without_gzip() {
    let snapshot = Snapshot::capture(
        vec![1, 2, 3, 4, 5],
        Some("scripted-16.4".to_owned()),
        vec!["vec".to_owned()],
    );

    let raw = snapshot.encode().expect("encode");
    assert_eq!(Snapshot::decode(&raw).expect("decode"), snapshot);

    let gz = snapshot.encode_compressed().expect("encode gz");
    assert_eq!(&gz[..2], &[0x1f, 0x8b]);
    assert_eq!(Snapshot::decode(&gz).expect("decode gz"), snapshot);
}

#[tokio::test]
async fn capture_requires_a_ready_session() {
    let session = Session::open(
        factory(Arc::new(ScriptLog::default()), Vec::new()),
        Box::new(MemoryFs::new()),
        SessionConfig::default(),
    )
    .await
    .expect("session");
    session.close().await.expect("close");
    assert!(matches!(
        session.capture_snapshot().await,
        Err(PgletError::Lifecycle { .. })
    ));
}

#[tokio::test]
async fn clone_builds_an_independent_equal_session() {
    let log1 = Arc::new(ScriptLog::default());
    let session = Session::open(
        factory(Arc::clone(&log1), Vec::new()),
        Box::new(MemoryFs::new()),
        SessionConfig::default(),
    )
    .await
    .expect("session");

    let copy = session
        .clone_with_fs(Box::new(MemoryFs::new()))
        .await
        .expect("clone");

    // A dump-based reconstruction: the copy got its own reseed and
    // keeps working after the original is gone.
    assert_eq!(log1.seeds().len(), 1);
    session.close().await.expect("close original");
    copy.query("SELECT 1").await.expect("query on clone");
    copy.close().await.expect("close clone");
}
