//! The session façade: one engine, many concurrent callers.
//!
//! A [`Session`] owns exactly one engine instance, its I/O bridge, the
//! stream classifier, and a filesystem backend. Callers issue work from
//! any task; the four concurrency domains order it, and the session's
//! engine mutex guarantees that no two engine invocations ever overlap.
//!
//! The request round-trip is the heart of the runtime: a complete
//! frontend message is staged as the pending call, the engine is pumped
//! once while the bridge drains the request and accumulates the
//! response, and the classified outcome is returned to the caller with
//! notifications dispatched off the call path.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use pglet_engine::{
    BridgeHandlers, Engine, EngineFactory, IoBridge, PendingCall, Snapshot, SNAPSHOT_VERSION,
};
use pglet_error::{PgletError, Result};
use pglet_protocol::{frontend, CallOutcome, StreamClassifier};
use pglet_types::{
    BootOutcome, Compression, EngineOptions, ExtensionMemoryStats, ExtensionStatus, LifecycleState,
};
use pglet_vfs::Filesystem;
use rand::RngCore;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domains::{Domains, SyncOutcome};
use crate::extensions::{ExtensionDescriptor, ExtensionRegistry, LoadObserver};
use crate::notifications::{ListenerId, NotificationCallback, NotificationHub};
use crate::results::{ExecSummary, QueryResult};
use crate::transaction::Transaction;

/// Everything a session is built from.
pub struct SessionConfig {
    /// Engine options, possibly rewritten by the filesystem's `init`.
    pub options: EngineOptions,
    /// The immutable extension set.
    pub extensions: Vec<ExtensionDescriptor>,
    /// Extension names excluded by feature flag.
    pub disabled_extensions: HashSet<String>,
    /// Install every eligible extension at construction instead of on
    /// first reference.
    pub eager_load_extensions: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            options: EngineOptions::default(),
            extensions: Vec::new(),
            disabled_extensions: HashSet::new(),
            eager_load_extensions: false,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }
}

/// Shared state behind the façade.
pub(crate) struct SessionInner {
    pub(crate) lifecycle: parking_lot::Mutex<LifecycleState>,
    /// Options after the filesystem's rewrite; what the engine booted with.
    pub(crate) options: EngineOptions,
    pub(crate) factory: EngineFactory,
    pub(crate) bridge: Arc<IoBridge>,
    /// The in-flight call the bridge handlers route bytes through.
    pub(crate) call_slot: Arc<parking_lot::Mutex<Option<PendingCall>>>,
    pub(crate) classifier: parking_lot::Mutex<StreamClassifier>,
    /// The global execution slot. Every engine invocation holds this.
    pub(crate) engine: tokio::sync::Mutex<Box<dyn Engine>>,
    pub(crate) fs: tokio::sync::Mutex<Box<dyn Filesystem>>,
    pub(crate) domains: Domains,
    /// Receiver for the sync currently in flight, if any.
    pub(crate) sync_pending: parking_lot::Mutex<Option<watch::Receiver<SyncOutcome>>>,
    pub(crate) extensions: ExtensionRegistry,
    pub(crate) hub: NotificationHub,
    /// Array type oid to element type oid, primed once at boot.
    pub(crate) array_types: parking_lot::Mutex<HashMap<u32, u32>>,
    eager_load: bool,
}

impl SessionInner {
    /// One complete request/response round-trip through the engine.
    ///
    /// Serializes on the engine mutex, stages the call, pumps exactly
    /// once, classifies the accumulated response, and dispatches any
    /// notifications after the call is complete. A malformed stream
    /// resets the classifier so the next call starts clean.
    pub(crate) async fn roundtrip(
        &self,
        request: Vec<u8>,
        throw_on_error: bool,
    ) -> Result<CallOutcome> {
        let mut engine = self.engine.lock().await;
        self.bridge.begin_call()?;
        *self.call_slot.lock() = Some(PendingCall::new(request));

        let pumped = engine.pump();
        let call = self.call_slot.lock().take();
        self.bridge.end_call();
        drop(engine);

        let call = match (pumped, call) {
            (Ok(()), Some(call)) => call,
            (Err(error), _) => {
                self.classifier.lock().reset();
                return Err(error);
            }
            (Ok(()), None) => {
                self.classifier.lock().reset();
                return Err(PgletError::internal("pending call vanished during pump"));
            }
        };

        let outcome = {
            let mut classifier = self.classifier.lock();
            if let Err(error) = classifier.feed(call.response()) {
                classifier.reset();
                return Err(error);
            }
            classifier.take_call_results()
        };

        self.dispatch_notifications(&outcome);

        if throw_on_error {
            if let Some(fields) = &outcome.first_error {
                return Err(PgletError::EngineReported {
                    severity: fields.severity.clone(),
                    code: fields.code.clone(),
                    message: fields.message.clone(),
                });
            }
        }
        Ok(outcome)
    }

    /// Round-trip a simple-query message, gated on the lifecycle state.
    pub(crate) async fn run_sql(&self, sql: &str, throw_on_error: bool) -> Result<CallOutcome> {
        let state = *self.lifecycle.lock();
        if !state.accepts_operations() {
            return Err(PgletError::lifecycle("run statement", state));
        }
        self.roundtrip(frontend::query(sql), throw_on_error).await
    }

    /// Hand this call's notifications to their listeners, off the call
    /// path and in stream order.
    fn dispatch_notifications(&self, outcome: &CallOutcome) {
        let mut work = Vec::new();
        for notification in &outcome.notifications {
            let callbacks = self.hub.listeners_for(&notification.channel);
            if !callbacks.is_empty() {
                work.push((notification.clone(), callbacks));
            }
        }
        if work.is_empty() {
            return;
        }
        tokio::spawn(async move {
            for (notification, callbacks) in work {
                for callback in callbacks {
                    callback(&notification);
                }
            }
        });
    }

    /// Run the durable sync, then publish the outcome and clear the
    /// pending slot so later requests schedule a fresh sync.
    async fn perform_sync(&self, sender: watch::Sender<SyncOutcome>, relaxed: bool) -> Result<()> {
        let _slot = self.domains.fs_sync.acquire().await;
        let result = self.fs.lock().await.sync_to_durable(relaxed);
        let outcome = match &result {
            Ok(()) => SyncOutcome::Done,
            Err(error) => SyncOutcome::Failed(error.to_string()),
        };
        *self.sync_pending.lock() = None;
        let _ = sender.send(outcome);
        result
    }
}

/// What inspecting the pending-sync slot decided: schedule a fresh sync
/// or observe the one already in flight. Owned, so the slot's lock is
/// released before any await.
enum SyncPlan {
    Schedule(watch::Sender<SyncOutcome>),
    Observe(watch::Receiver<SyncOutcome>),
}

/// A live session over one engine instance.
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    // ── Construction ──────────────────────────────────────────────────

    /// Boot a fresh session: filesystem init, engine start, bridge
    /// install, post-ready fixups, then eager extension loading when
    /// configured. No partially-initialized session is observable on
    /// failure.
    pub async fn open(
        factory: EngineFactory,
        fs: Box<dyn Filesystem>,
        config: SessionConfig,
    ) -> Result<Self> {
        Self::boot(factory, fs, config, None).await
    }

    /// Boot a session whose engine memory is restored from a snapshot.
    ///
    /// The artifact version is checked before anything engine-touching
    /// happens. The engine's randomness is reseeded unconditionally;
    /// without that, every session restored from the same artifact
    /// would replay identical random sequences.
    pub async fn restore_from_snapshot(
        factory: EngineFactory,
        fs: Box<dyn Filesystem>,
        config: SessionConfig,
        snapshot: &Snapshot,
    ) -> Result<Self> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PgletError::SnapshotVersionMismatch {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Self::boot(factory, fs, config, Some(snapshot)).await
    }

    async fn boot(
        factory: EngineFactory,
        mut fs: Box<dyn Filesystem>,
        config: SessionConfig,
        snapshot: Option<&Snapshot>,
    ) -> Result<Self> {
        let mut options = fs.init(config.options)?;
        if let Some(snapshot) = snapshot {
            options.initial_memory_bytes = options.initial_memory_bytes.max(snapshot.heap_size());
        }

        let bridge = Arc::new(IoBridge::new());
        let mut engine = factory(&options, Arc::clone(&bridge))?;

        if let Some(snapshot) = snapshot {
            if engine.memory_size() < snapshot.heap_size() {
                engine.grow_memory(snapshot.heap_size())?;
            }
            let allocation = engine.memory_size();
            if allocation < snapshot.heap_size() {
                return Err(PgletError::SnapshotTooLarge {
                    snapshot_size: snapshot.heap_size(),
                    allocation,
                });
            }
            engine.memory_mut()[..snapshot.heap_size()].copy_from_slice(&snapshot.heap);
        }

        let call_slot: Arc<parking_lot::Mutex<Option<PendingCall>>> =
            Arc::new(parking_lot::Mutex::new(None));
        let read_slot = Arc::clone(&call_slot);
        let write_slot = Arc::clone(&call_slot);
        bridge.install(BridgeHandlers {
            read: Box::new(move |buf| {
                let mut guard = read_slot.lock();
                let call = guard
                    .as_mut()
                    .ok_or(PgletError::BridgeNotInstalled { operation: "read" })?;
                Ok(call.read_request(buf))
            }),
            write: Box::new(move |chunk| {
                let mut guard = write_slot.lock();
                let call = guard
                    .as_mut()
                    .ok_or(PgletError::BridgeNotInstalled { operation: "write" })?;
                call.append_response(chunk)?;
                Ok(chunk.len())
            }),
        });

        if snapshot.is_some() {
            engine.reseed_random(fresh_seed())?;
        }

        let outcome = engine.start()?;
        if !outcome.is_success() {
            let detail = match outcome {
                BootOutcome::CredentialMismatch => {
                    "stored credentials do not match the supplied ones".to_owned()
                }
                BootOutcome::Crashed => "engine crashed during boot".to_owned(),
                other => format!("unexpected boot outcome {other:?}"),
            };
            let _ = engine.shutdown();
            return Err(PgletError::Boot { detail });
        }
        info!(
            outcome = ?outcome,
            engine_version = engine.version(),
            fs = fs.name(),
            "engine booted"
        );

        let registry = ExtensionRegistry::new(config.extensions, config.disabled_extensions);
        if let Some(snapshot) = snapshot {
            // Bundles inside the restored heap are already installed.
            for name in &snapshot.extension_names {
                registry.mark_preloaded(name);
            }
        }

        let inner = Arc::new(SessionInner {
            lifecycle: parking_lot::Mutex::new(LifecycleState::Initializing),
            options,
            factory,
            bridge,
            call_slot,
            classifier: parking_lot::Mutex::new(StreamClassifier::new()),
            engine: tokio::sync::Mutex::new(engine),
            fs: tokio::sync::Mutex::new(fs),
            domains: Domains::new(),
            sync_pending: parking_lot::Mutex::new(None),
            extensions: registry,
            hub: NotificationHub::default(),
            array_types: parking_lot::Mutex::new(HashMap::new()),
            eager_load: config.eager_load_extensions,
        });

        inner.post_ready_fixups().await;

        if inner.eager_load {
            for name in inner.extensions.eligible_names() {
                if let Err(error) = inner.load_extension_dfs(&name, &mut Vec::new()).await {
                    // Mirror the boot-outcome failure path: the half-built
                    // session is torn down, never handed out.
                    if let Err(shutdown) = inner.engine.lock().await.shutdown() {
                        warn!(%shutdown, "engine shutdown failed after eager load error");
                    }
                    inner.bridge.detach();
                    if let Err(close) = inner.fs.lock().await.close() {
                        warn!(%close, "filesystem close failed after eager load error");
                    }
                    return Err(error);
                }
            }
        }

        *inner.lifecycle.lock() = LifecycleState::Ready;
        Ok(Self { inner })
    }

    // ── Queries ───────────────────────────────────────────────────────

    /// Run a statement and collect its rows. Queued in the query domain.
    pub async fn query(&self, sql: &str) -> Result<QueryResult> {
        let outcome = self
            .inner
            .domains
            .query
            .run_exclusive(self.inner.run_sql(sql, true))
            .await?;
        Ok(QueryResult::from_outcome(&outcome))
    }

    /// Run a statement, keeping only the command summary.
    pub async fn exec(&self, sql: &str) -> Result<ExecSummary> {
        let outcome = self
            .inner
            .domains
            .query
            .run_exclusive(self.inner.run_sql(sql, true))
            .await?;
        Ok(ExecSummary::from_outcome(&outcome))
    }

    // ── Transactions ──────────────────────────────────────────────────

    /// Run a closure inside a transaction block.
    ///
    /// `BEGIN` is issued before the closure, and the closure's outcome
    /// resolves the block: `Ok` commits, `Err` rolls back. An explicit
    /// [`Transaction::rollback`] inside the closure also resolves it.
    /// The whole block holds the transaction domain, so blocks from
    /// concurrent tasks run back to back, never interleaved.
    pub async fn transaction<F, Fut, T>(&self, body: F) -> Result<T>
    where
        F: FnOnce(Transaction) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let _slot = self.inner.domains.transaction.acquire().await;
        self.inner.run_sql("BEGIN", true).await?;
        let tx = Transaction::new(Arc::clone(&self.inner));

        match body(tx.clone()).await {
            Ok(value) => {
                tx.resolve(false).await?;
                Ok(value)
            }
            Err(error) => {
                tx.resolve(true).await?;
                Err(error)
            }
        }
    }

    // ── Notifications ─────────────────────────────────────────────────

    /// Subscribe a callback to a channel. The first subscription for a
    /// channel issues the engine-side `LISTEN`.
    pub async fn listen(
        &self,
        channel: &str,
        callback: NotificationCallback,
    ) -> Result<ListenerId> {
        let channel = channel.to_lowercase();
        let _slot = self.inner.domains.listen.acquire().await;
        let (id, first) = self.inner.hub.subscribe_channel(&channel, callback);
        if first {
            if let Err(error) = self
                .inner
                .run_sql(&format!("LISTEN \"{}\"", quote_ident(&channel)), true)
                .await
            {
                self.inner.hub.unsubscribe_channel(&channel, id);
                return Err(error);
            }
            debug!(channel = %channel, "engine-side listen established");
        }
        Ok(id)
    }

    /// Remove a channel subscription. Emptying the channel's listener
    /// set issues the engine-side `UNLISTEN`.
    pub async fn unlisten(&self, channel: &str, id: ListenerId) -> Result<()> {
        let channel = channel.to_lowercase();
        let _slot = self.inner.domains.listen.acquire().await;
        if self.inner.hub.unsubscribe_channel(&channel, id) {
            self.inner
                .run_sql(&format!("UNLISTEN \"{}\"", quote_ident(&channel)), true)
                .await?;
            debug!(channel = %channel, "engine-side listen removed");
        }
        Ok(())
    }

    /// Subscribe a callback to every notification, regardless of channel.
    pub fn on_notification(&self, callback: NotificationCallback) -> ListenerId {
        self.inner.hub.subscribe_global(callback)
    }

    /// Remove a cross-channel subscription.
    pub fn off_notification(&self, id: ListenerId) {
        self.inner.hub.unsubscribe_global(id);
    }

    // ── Extensions ────────────────────────────────────────────────────

    /// Load one extension (and its dependency closure). Idempotent.
    pub async fn load_extension(&self, name: &str) -> Result<()> {
        let state = *self.inner.lifecycle.lock();
        if !state.accepts_operations() {
            return Err(PgletError::lifecycle("load extension", state));
        }
        self.inner
            .load_extension_dfs(name, &mut Vec::new())
            .await
    }

    /// Load several extensions concurrently. The per-name load guards
    /// collapse duplicate installs of shared dependencies.
    pub async fn load_extensions(&self, names: &[&str]) -> Result<()> {
        futures::future::try_join_all(names.iter().map(|name| self.load_extension(name))).await?;
        Ok(())
    }

    /// Register an observer called after each successful extension load.
    pub fn add_load_observer(&self, observer: LoadObserver) {
        self.inner.extensions.add_observer(observer);
    }

    /// Configured/loaded state per extension, flag-disabled ones excluded.
    #[must_use]
    pub fn extension_status(&self) -> BTreeMap<String, ExtensionStatus> {
        self.inner.extensions.status()
    }

    /// Memory accounting per loaded extension.
    #[must_use]
    pub fn extension_memory_stats(&self) -> BTreeMap<String, ExtensionMemoryStats> {
        self.inner.extensions.memory_stats()
    }

    /// Whether the named extension is configured and not flag-disabled.
    #[must_use]
    pub fn is_extension_available(&self, name: &str) -> bool {
        self.inner.extensions.is_available(name)
    }

    // ── Filesystem and snapshots ──────────────────────────────────────

    /// Flush engine state to the durable store.
    ///
    /// Overlapping requests coalesce: a request issued while a sync is
    /// pending waits on that sync's completion instead of scheduling a
    /// duplicate. Under relaxed durability no caller waits at all: the
    /// triggering call schedules the sync in the background, and a call
    /// that finds one already pending returns immediately.
    pub async fn sync_to_durable(&self) -> Result<()> {
        let state = *self.inner.lifecycle.lock();
        if !state.accepts_operations() {
            return Err(PgletError::lifecycle("sync", state));
        }
        let relaxed = self.inner.options.relaxed_durability;

        let plan = {
            let mut pending = self.inner.sync_pending.lock();
            match pending.as_ref() {
                Some(receiver) => SyncPlan::Observe(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(SyncOutcome::Pending);
                    *pending = Some(receiver);
                    SyncPlan::Schedule(sender)
                }
            }
        };

        match plan {
            SyncPlan::Schedule(sender) => {
                if relaxed {
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move {
                        if let Err(error) = inner.perform_sync(sender, true).await {
                            warn!(%error, "relaxed durable sync failed");
                        }
                    });
                    return Ok(());
                }
                self.inner.perform_sync(sender, false).await
            }
            SyncPlan::Observe(mut receiver) => {
                if relaxed {
                    // The pending sync already covers this request.
                    return Ok(());
                }
                loop {
                    let outcome = receiver.borrow_and_update().clone();
                    match outcome {
                        SyncOutcome::Done => return Ok(()),
                        SyncOutcome::Failed(detail) => {
                            return Err(PgletError::internal(format!(
                                "durable sync failed: {detail}"
                            )))
                        }
                        SyncOutcome::Pending => {
                            if receiver.changed().await.is_err() {
                                // Sender dropped without publishing; the
                                // sync task was torn down.
                                return Err(PgletError::internal("durable sync abandoned"));
                            }
                        }
                    }
                }
            }
        }
    }

    /// Capture the engine's entire memory as a portable snapshot.
    ///
    /// Forces a non-relaxed durable sync first so the artifact and the
    /// durable store agree, then copies the memory verbatim under the
    /// engine lock.
    pub async fn capture_snapshot(&self) -> Result<Snapshot> {
        let state = *self.inner.lifecycle.lock();
        if state != LifecycleState::Ready {
            return Err(PgletError::lifecycle("capture snapshot", state));
        }

        {
            let _slot = self.inner.domains.fs_sync.acquire().await;
            self.inner.fs.lock().await.sync_to_durable(false)?;
        }

        let engine = self.inner.engine.lock().await;
        let heap = engine.memory().to_vec();
        let version = engine.version().to_owned();
        drop(engine);

        let snapshot = Snapshot::capture(
            heap,
            Some(version),
            self.inner.extensions.loaded_names(),
        );
        info!(
            heap_bytes = snapshot.heap_size(),
            extensions = snapshot.extension_names.len(),
            "snapshot captured"
        );
        Ok(snapshot)
    }

    /// Export the entire data directory as a portable archive.
    pub async fn dump_state(&self, compression: Compression) -> Result<Vec<u8>> {
        let state = *self.inner.lifecycle.lock();
        if !state.accepts_operations() {
            return Err(PgletError::lifecycle("dump state", state));
        }
        let _slot = self.inner.domains.fs_sync.acquire().await;
        let mut fs = self.inner.fs.lock().await;
        fs.sync_to_durable(false)?;
        fs.export_state(&self.inner.options.database, compression)
    }

    /// Build an independent session with identical state: capture a
    /// snapshot here, restore it into a fresh engine over `fs`. A
    /// dump-based reconstruction, not a live fork.
    pub async fn clone_with_fs(&self, fs: Box<dyn Filesystem>) -> Result<Session> {
        let snapshot = self.capture_snapshot().await?;
        let config = SessionConfig {
            options: self.inner.options.clone(),
            extensions: self.inner.extensions.descriptor_list(),
            disabled_extensions: self.inner.extensions.disabled_set(),
            eager_load_extensions: false,
        };
        Session::restore_from_snapshot(Arc::clone(&self.inner.factory), fs, config, &snapshot)
            .await
    }

    // ── Introspection ─────────────────────────────────────────────────

    /// Current lifecycle state.
    #[must_use]
    pub fn lifecycle(&self) -> LifecycleState {
        *self.inner.lifecycle.lock()
    }

    /// Whether a transaction block is currently open.
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.inner.classifier.lock().in_transaction()
    }

    /// The options the engine booted with, after the filesystem rewrite.
    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    /// Engine version string.
    pub async fn engine_version(&self) -> String {
        self.inner.engine.lock().await.version().to_owned()
    }

    /// Element type oid for an array type oid, from the boot-time cache.
    #[must_use]
    pub fn element_type_of(&self, array_oid: u32) -> Option<u32> {
        self.inner.array_types.lock().get(&array_oid).copied()
    }

    // ── Close ─────────────────────────────────────────────────────────

    /// Shut the session down.
    ///
    /// Fails fast when already closing or closed. Runs extension
    /// teardowns in registration order, sends the terminate request,
    /// shuts the engine down, detaches the bridge to the inert handler
    /// pair, and closes the filesystem. Teardown failures are logged and
    /// do not stop the close.
    pub async fn close(&self) -> Result<()> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            if matches!(
                *lifecycle,
                LifecycleState::Closing | LifecycleState::Closed
            ) {
                return Err(PgletError::lifecycle("close", *lifecycle));
            }
            *lifecycle = LifecycleState::Closing;
        }

        self.inner.extensions.run_teardowns();

        if let Err(error) = self.inner.roundtrip(frontend::terminate(), false).await {
            warn!(%error, "terminate request failed during close");
        }
        if let Err(error) = self.inner.engine.lock().await.shutdown() {
            warn!(%error, "engine shutdown failed during close");
        }
        self.inner.bridge.detach();
        if let Err(error) = self.inner.fs.lock().await.close() {
            warn!(%error, "filesystem close failed");
        }

        *self.inner.lifecycle.lock() = LifecycleState::Closed;
        info!("session closed");
        Ok(())
    }
}

impl SessionInner {
    /// Cold-start fixups issued before the session is declared ready:
    /// the default search path, then priming the array-type cache from
    /// the catalog. Neither failing is fatal; an engine without the
    /// catalog view simply leaves the cache empty.
    async fn post_ready_fixups(&self) {
        if let Err(error) = self
            .roundtrip(frontend::query("SET search_path TO public"), false)
            .await
        {
            debug!(%error, "search path fixup skipped");
        }

        match self
            .roundtrip(
                frontend::query("SELECT oid, typarray FROM pg_catalog.pg_type WHERE typarray <> 0"),
                false,
            )
            .await
        {
            Ok(outcome) => {
                let result = QueryResult::from_outcome(&outcome);
                let mut cache = self.array_types.lock();
                for row in &result.rows {
                    let element = row.get(0).and_then(|v| v.parse::<u32>().ok());
                    let array = row.get(1).and_then(|v| v.parse::<u32>().ok());
                    if let (Some(element), Some(array)) = (element, array) {
                        cache.insert(array, element);
                    }
                }
                debug!(entries = cache.len(), "array type cache primed");
            }
            Err(error) => debug!(%error, "array type cache priming skipped"),
        }
    }
}

/// Escape a string for interpolation inside a double-quoted identifier.
/// Embedded quotes are doubled, per the identifier quoting rules.
fn quote_ident(name: &str) -> String {
    name.replace('"', "\"\"")
}

/// 32 bytes of fresh entropy for the post-restore reseed.
///
/// Falls back to a timestamp-derived seed when the operating system's
/// entropy source is unavailable; a weak seed beats the deterministic
/// replay that skipping the reseed would produce.
fn fresh_seed() -> [u8; 32] {
    let mut seed = [0u8; 32];
    if let Err(error) = rand::rngs::OsRng.try_fill_bytes(&mut seed) {
        warn!(%error, "no OS entropy for snapshot reseed, deriving from clock");
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0)
            .to_le_bytes();
        for (slot, byte) in seed.iter_mut().zip(nanos.iter().cycle()) {
            *slot = *byte;
        }
    }
    seed
}
