//! End-to-end session behavior over the scripted engine: query
//! serialization, transactions, notifications, durable sync, lifecycle.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use common::{factory, factory_with, open_session, select_one, wait_until};
use parking_lot::Mutex;
use pglet::{
    BootOutcome, Compression, EngineOptions, Filesystem, LifecycleState, MemoryFs, PgletError,
    Result, Session, SessionConfig,
};
use pglet_engine::script::{wire, ScriptLog};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_are_serialized_without_contamination() {
    let log = Arc::new(ScriptLog::default());
    let session = Arc::new(
        open_session(
            Arc::clone(&log),
            vec![
                ("'alpha'", select_one("v", "alpha")),
                ("'beta'", select_one("v", "beta")),
            ],
        )
        .await,
    );

    let mut handles = Vec::new();
    for value in ["alpha", "beta"] {
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            for _ in 0..10 {
                let result = session
                    .query(&format!("SELECT '{value}'"))
                    .await
                    .expect("query");
                // Each caller always sees its own result.
                assert_eq!(result.rows[0].get(0), Some(value));
            }
        }));
    }
    for handle in handles {
        handle.await.expect("task");
    }

    let texts = log.request_texts();
    assert_eq!(texts.iter().filter(|t| t.contains("alpha")).count(), 10);
    assert_eq!(texts.iter().filter(|t| t.contains("beta")).count(), 10);
}

#[tokio::test]
async fn engine_error_is_scoped_to_its_call() {
    let log = Arc::new(ScriptLog::default());
    let session = open_session(
        Arc::clone(&log),
        vec![
            (
                "SELECT broken",
                [
                    wire::error_response("ERROR", "42601", "syntax error"),
                    wire::ready_for_query(b'I'),
                ]
                .concat(),
            ),
            ("SELECT fine", select_one("v", "ok")),
        ],
    )
    .await;

    let err = session.query("SELECT broken").await.expect_err("errors");
    match &err {
        PgletError::EngineReported { code, severity, .. } => {
            assert_eq!(code, "42601");
            assert_eq!(severity, "ERROR");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.is_session_recoverable());

    let result = session.query("SELECT fine").await.expect("next query");
    assert_eq!(result.rows[0].get(0), Some("ok"));
}

#[tokio::test]
async fn transaction_commits_on_ok() {
    let log = Arc::new(ScriptLog::default());
    let session = open_session(
        Arc::clone(&log),
        vec![
            (
                "BEGIN",
                [wire::command_complete("BEGIN"), wire::ready_for_query(b'T')].concat(),
            ),
            ("COMMIT", wire::ok("COMMIT")),
            ("INSERT", wire::ok("INSERT 0 1")),
        ],
    )
    .await;

    let rows = session
        .transaction(|tx| async move {
            let summary = tx.exec("INSERT INTO t VALUES (1)").await?;
            Ok(summary.rows_affected)
        })
        .await
        .expect("transaction");
    assert_eq!(rows, 1);
    assert!(!session.in_transaction());

    let texts = log.request_texts();
    let begin = texts.iter().position(|t| t.contains("BEGIN")).expect("begin");
    let insert = texts.iter().position(|t| t.contains("INSERT")).expect("insert");
    let commit = texts.iter().position(|t| t.contains("COMMIT")).expect("commit");
    assert!(begin < insert && insert < commit);
}

#[tokio::test]
async fn failed_transaction_rolls_back_and_next_query_is_healthy() {
    let log = Arc::new(ScriptLog::default());
    let session = open_session(
        Arc::clone(&log),
        vec![
            (
                "BEGIN",
                [wire::command_complete("BEGIN"), wire::ready_for_query(b'T')].concat(),
            ),
            ("ROLLBACK", wire::ok("ROLLBACK")),
            (
                "INSERT",
                [
                    wire::error_response("ERROR", "23505", "duplicate key"),
                    wire::ready_for_query(b'E'),
                ]
                .concat(),
            ),
            ("SELECT fine", select_one("v", "ok")),
        ],
    )
    .await;

    let err = session
        .transaction(|tx| async move {
            tx.exec("INSERT INTO t VALUES (1)").await?;
            Ok(())
        })
        .await
        .expect_err("transaction fails");
    assert!(err.is_engine_error());

    assert!(log.request_texts().iter().any(|t| t.contains("ROLLBACK")));
    assert!(!session.in_transaction());

    // The query domain is untouched by the failed block.
    let result = session.query("SELECT fine").await.expect("query");
    assert_eq!(result.rows[0].get(0), Some("ok"));
}

#[tokio::test]
async fn explicit_rollback_inside_closure() {
    let log = Arc::new(ScriptLog::default());
    let session = open_session(
        Arc::clone(&log),
        vec![
            (
                "BEGIN",
                [wire::command_complete("BEGIN"), wire::ready_for_query(b'T')].concat(),
            ),
            ("ROLLBACK", wire::ok("ROLLBACK")),
            ("COMMIT", wire::ok("COMMIT")),
        ],
    )
    .await;

    session
        .transaction(|tx| async move {
            tx.rollback().await?;
            // Statements after rollback are rejected.
            assert!(tx.exec("INSERT INTO t VALUES (1)").await.is_err());
            Ok(())
        })
        .await
        .expect("closure result stands");

    let texts = log.request_texts();
    assert!(texts.iter().any(|t| t.contains("ROLLBACK")));
    assert!(!texts.iter().any(|t| t.contains("COMMIT")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn notifications_dispatch_channel_listeners_before_global() {
    let log = Arc::new(ScriptLog::default());
    let session = open_session(
        Arc::clone(&log),
        vec![
            ("LISTEN", wire::ok("LISTEN")),
            ("UNLISTEN", wire::ok("UNLISTEN")),
            (
                "pg_notify",
                [
                    wire::notification(42, "jobs", "first"),
                    wire::notification(42, "jobs", "second"),
                    wire::ok("SELECT 1"),
                ]
                .concat(),
            ),
        ],
    )
    .await;

    let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let channel_seen = Arc::clone(&seen);
    let id = session
        .listen(
            "Jobs",
            Arc::new(move |n| channel_seen.lock().push(format!("channel:{}", n.payload))),
        )
        .await
        .expect("listen");
    let global_seen = Arc::clone(&seen);
    session.on_notification(Arc::new(move |n| {
        global_seen.lock().push(format!("global:{}", n.payload));
    }));

    // Channel names are folded to lowercase before the engine sees them.
    assert!(log
        .request_texts()
        .iter()
        .any(|t| t.contains("LISTEN \"jobs\"")));

    session
        .query("SELECT pg_notify('jobs', 'x')")
        .await
        .expect("notify query");

    wait_until(|| seen.lock().len() == 4).await;
    assert_eq!(
        *seen.lock(),
        vec![
            "channel:first".to_owned(),
            "global:first".to_owned(),
            "channel:second".to_owned(),
            "global:second".to_owned(),
        ]
    );

    session.unlisten("jobs", id).await.expect("unlisten");
    assert!(log
        .request_texts()
        .iter()
        .any(|t| t.contains("UNLISTEN \"jobs\"")));
}

#[tokio::test]
async fn channel_names_with_quotes_are_escaped_in_listen_statements() {
    let log = Arc::new(ScriptLog::default());
    let session = open_session(
        Arc::clone(&log),
        vec![
            ("LISTEN", wire::ok("LISTEN")),
            ("UNLISTEN", wire::ok("UNLISTEN")),
        ],
    )
    .await;

    let id = session
        .listen("odd\"name", Arc::new(|_| {}))
        .await
        .expect("listen");
    // Embedded quotes are doubled inside the quoted identifier.
    assert!(log
        .request_texts()
        .iter()
        .any(|t| t.contains("LISTEN \"odd\"\"name\"")));

    session.unlisten("odd\"name", id).await.expect("unlisten");
    assert!(log
        .request_texts()
        .iter()
        .any(|t| t.contains("UNLISTEN \"odd\"\"name\"")));
}

#[tokio::test]
async fn close_is_ordered_and_fails_fast_when_repeated() {
    let log = Arc::new(ScriptLog::default());
    let session = open_session(Arc::clone(&log), Vec::new()).await;
    assert_eq!(session.lifecycle(), LifecycleState::Ready);

    session.close().await.expect("close");
    assert_eq!(session.lifecycle(), LifecycleState::Closed);
    assert_eq!(log.shutdowns(), 1);
    // The terminate request went out before shutdown.
    assert!(log.request_texts().iter().any(|t| t.starts_with('X')));

    assert!(matches!(
        session.close().await,
        Err(PgletError::Lifecycle { .. })
    ));
    assert!(matches!(
        session.query("SELECT 1").await,
        Err(PgletError::Lifecycle { .. })
    ));
}

#[tokio::test]
async fn failed_boot_is_reported_and_engine_torn_down() {
    let log = Arc::new(ScriptLog::default());
    let result = Session::open(
        factory_with(Arc::clone(&log), Vec::new(), BootOutcome::Crashed),
        Box::new(MemoryFs::new()),
        SessionConfig::default(),
    )
    .await;
    assert!(matches!(result, Err(PgletError::Boot { .. })));
    assert_eq!(log.shutdowns(), 1);
}

// ── Durable sync ─────────────────────────────────────────────────────

/// Memory filesystem whose durable sync blocks until released, so tests
/// can hold a sync open while more requests arrive.
struct GatedFs {
    inner: MemoryFs,
    started: mpsc::Sender<()>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl GatedFs {
    fn new(inner: MemoryFs) -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        (
            Self {
                inner,
                started: started_tx,
                release: Mutex::new(release_rx),
            },
            started_rx,
            release_tx,
        )
    }
}

impl Filesystem for GatedFs {
    fn name(&self) -> &'static str {
        "gated-memory"
    }

    fn init(&mut self, options: EngineOptions) -> Result<EngineOptions> {
        self.inner.init(options)
    }

    fn sync_to_durable(&mut self, relaxed: bool) -> Result<()> {
        let _ = self.started.send(());
        self.release
            .lock()
            .recv_timeout(Duration::from_secs(5))
            .expect("gate released");
        self.inner.sync_to_durable(relaxed)
    }

    fn sync_from_durable(&mut self) -> Result<()> {
        self.inner.sync_from_durable()
    }

    fn export_state(&mut self, name: &str, compression: Compression) -> Result<Vec<u8>> {
        self.inner.export_state(name, compression)
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_sync_requests_coalesce_into_one() {
    let fs = MemoryFs::new();
    let counters = fs.counters();
    let (gated, started_rx, release_tx) = GatedFs::new(fs);

    let log = Arc::new(ScriptLog::default());
    let session = Arc::new(
        Session::open(
            factory(Arc::clone(&log), Vec::new()),
            Box::new(gated),
            SessionConfig::default(),
        )
        .await
        .expect("session opens"),
    );

    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.sync_to_durable().await })
    };
    // The first sync is now inside the filesystem, holding the gate.
    tokio::task::spawn_blocking(move || {
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("first sync started")
    })
    .await
    .expect("blocking task");

    let second = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.sync_to_durable().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    release_tx.send(()).expect("release");
    first.await.expect("task").expect("first sync");
    second.await.expect("task").expect("second sync");

    // Both callers succeeded off a single durable sync.
    assert_eq!(counters.to_durable(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn relaxed_durability_makes_sync_fire_and_forget() {
    let fs = MemoryFs::new();
    let counters = fs.counters();
    let (gated, _started_rx, release_tx) = GatedFs::new(fs);

    let log = Arc::new(ScriptLog::default());
    let options = EngineOptions {
        relaxed_durability: true,
        ..EngineOptions::default()
    };
    let session = Session::open(
        factory(Arc::clone(&log), Vec::new()),
        Box::new(gated),
        SessionConfig::new(options),
    )
    .await
    .expect("session opens");

    // Returns before the gated sync has completed.
    session.sync_to_durable().await.expect("relaxed sync");
    assert_eq!(counters.to_durable(), 0);

    release_tx.send(()).expect("release");
    wait_until(|| counters.to_durable() == 1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn relaxed_sync_never_waits_on_a_pending_sync() {
    let fs = MemoryFs::new();
    let counters = fs.counters();
    let (gated, started_rx, release_tx) = GatedFs::new(fs);

    let log = Arc::new(ScriptLog::default());
    let options = EngineOptions {
        relaxed_durability: true,
        ..EngineOptions::default()
    };
    let session = Session::open(
        factory(Arc::clone(&log), Vec::new()),
        Box::new(gated),
        SessionConfig::new(options),
    )
    .await
    .expect("session opens");

    session.sync_to_durable().await.expect("first relaxed sync");
    // The background sync is now inside the filesystem, holding the gate.
    tokio::task::spawn_blocking(move || {
        started_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("background sync started")
    })
    .await
    .expect("blocking task");

    // A second request while one is pending returns without waiting on it.
    tokio::time::timeout(Duration::from_millis(500), session.sync_to_durable())
        .await
        .expect("returned before the gate opened")
        .expect("second relaxed sync");
    assert_eq!(counters.to_durable(), 0);

    release_tx.send(()).expect("release");
    wait_until(|| counters.to_durable() == 1).await;
}

#[tokio::test]
async fn dump_state_syncs_first_and_honors_compression() {
    let log = Arc::new(ScriptLog::default());
    let fs = MemoryFs::new();
    let counters = fs.counters();
    let session = Session::open(
        factory(Arc::clone(&log), Vec::new()),
        Box::new(fs),
        SessionConfig::default(),
    )
    .await
    .expect("session opens");

    let plain = session.dump_state(Compression::None).await.expect("dump");
    assert_eq!(plain.first(), Some(&b'{'));
    let gz = session.dump_state(Compression::Gzip).await.expect("dump");
    assert_eq!(&gz[..2], &[0x1f, 0x8b]);
    assert_eq!(counters.to_durable(), 2);
}

#[tokio::test]
async fn notification_counter_survives_many_calls() {
    // Regression shape: dispatch happens per call, never re-delivering
    // earlier notifications.
    let log = Arc::new(ScriptLog::default());
    let session = open_session(
        Arc::clone(&log),
        vec![
            ("LISTEN", wire::ok("LISTEN")),
            (
                "pg_notify",
                [wire::notification(1, "c", "ping"), wire::ok("SELECT 1")].concat(),
            ),
        ],
    )
    .await;

    let count = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&count);
    session
        .listen("c", Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .await
        .expect("listen");

    for _ in 0..3 {
        session.query("SELECT pg_notify('c', '')").await.expect("query");
    }
    wait_until(|| count.load(Ordering::SeqCst) == 3).await;
}
