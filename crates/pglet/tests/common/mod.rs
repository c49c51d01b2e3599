//! Shared scaffolding for the façade integration tests: a scripted
//! engine factory and a couple of response builders.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pglet::{
    BootOutcome, Engine, EngineFactory, EngineOptions, IoBridge, MemoryFs, Session, SessionConfig,
};
use pglet_engine::script::{wire, ScriptLog, ScriptedEngine};

/// Canned `(needle, response)` pairs applied to every engine the
/// factory builds.
pub type Script = Vec<(&'static str, Vec<u8>)>;

/// Factory producing scripted engines that report into a shared log.
pub fn factory_with(log: Arc<ScriptLog>, script: Script, boot: BootOutcome) -> EngineFactory {
    Arc::new(move |options: &EngineOptions, bridge: Arc<IoBridge>| {
        let mut engine = ScriptedEngine::new(options, bridge);
        engine.set_log(Arc::clone(&log));
        engine.set_boot_outcome(boot);
        for (needle, response) in &script {
            engine.respond_when(needle, response.clone());
        }
        Ok(Box::new(engine) as Box<dyn Engine>)
    })
}

pub fn factory(log: Arc<ScriptLog>, script: Script) -> EngineFactory {
    factory_with(log, script, BootOutcome::MustCreate)
}

/// Boot a session over a fresh memory filesystem with default options.
pub async fn open_session(log: Arc<ScriptLog>, script: Script) -> Session {
    Session::open(
        factory(log, script),
        Box::new(MemoryFs::new()),
        SessionConfig::default(),
    )
    .await
    .expect("session opens")
}

/// A one-column, one-row `SELECT` response.
pub fn select_one(column: &str, value: &str) -> Vec<u8> {
    [
        wire::row_description(column),
        wire::data_row(value),
        wire::command_complete("SELECT 1"),
        wire::ready_for_query(b'I'),
    ]
    .concat()
}

/// Poll `predicate` until it holds or two seconds elapse.
pub async fn wait_until(predicate: impl Fn() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within two seconds");
}
