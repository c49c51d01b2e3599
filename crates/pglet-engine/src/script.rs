//! Scripted in-memory engine.
//!
//! The real engine is a sealed binary artifact; this backend stands in
//! for it everywhere a test needs one, the same way a memory-backed VFS
//! stands in for real file I/O. Each [`pump`](crate::Engine::pump)
//! drains the request through the bridge, picks a canned response (first
//! matching responder, else the default `CommandComplete` +
//! `ReadyForQuery` pair), and writes it back in deliberately small
//! chunks so incremental stream consumers are exercised.
//!
//! A shared [`ScriptLog`] records every request, bundle install, reseed,
//! and shutdown for assertions after the engine has been boxed away.

use std::sync::Arc;

use parking_lot::Mutex;
use pglet_error::{PgletError, Result};
use pglet_types::{BootOutcome, EngineOptions};

use crate::bridge::IoBridge;
use crate::engine::Engine;

/// Backend wire-format builders for scripting responses.
pub mod wire {
    fn frame(code: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![code];
        out.extend_from_slice(&u32::try_from(body.len() + 4).unwrap_or(u32::MAX).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    /// `CommandComplete` with the given tag.
    #[must_use]
    pub fn command_complete(tag: &str) -> Vec<u8> {
        let mut body = tag.as_bytes().to_vec();
        body.push(0);
        frame(b'C', &body)
    }

    /// `ReadyForQuery` with status `I`, `T`, or `E`.
    #[must_use]
    pub fn ready_for_query(status: u8) -> Vec<u8> {
        frame(b'Z', &[status])
    }

    /// Single-column `RowDescription`.
    #[must_use]
    pub fn row_description(column: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(column.as_bytes());
        body.push(0);
        body.extend_from_slice(&0u32.to_be_bytes()); // table oid
        body.extend_from_slice(&0u16.to_be_bytes()); // attnum
        body.extend_from_slice(&25u32.to_be_bytes()); // text oid
        body.extend_from_slice(&(-1i16).to_be_bytes()); // typlen
        body.extend_from_slice(&(-1i32).to_be_bytes()); // typmod
        body.extend_from_slice(&0i16.to_be_bytes()); // text format
        frame(b'T', &body)
    }

    /// Single-column `DataRow` carrying a text value.
    #[must_use]
    pub fn data_row(value: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&1u16.to_be_bytes());
        body.extend_from_slice(
            &i32::try_from(value.len()).unwrap_or(i32::MAX).to_be_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        frame(b'D', &body)
    }

    /// `ErrorResponse` with severity, SQLSTATE code, and message.
    #[must_use]
    pub fn error_response(severity: &str, code: &str, message: &str) -> Vec<u8> {
        let body = format!("S{severity}\0C{code}\0M{message}\0\0");
        frame(b'E', body.as_bytes())
    }

    /// `NoticeResponse` with severity and message.
    #[must_use]
    pub fn notice_response(severity: &str, message: &str) -> Vec<u8> {
        let body = format!("S{severity}\0C00000\0M{message}\0\0");
        frame(b'N', body.as_bytes())
    }

    /// `NotificationResponse` for a channel.
    #[must_use]
    pub fn notification(pid: u32, channel: &str, payload: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&pid.to_be_bytes());
        body.extend_from_slice(channel.as_bytes());
        body.push(0);
        body.extend_from_slice(payload.as_bytes());
        body.push(0);
        frame(b'A', &body)
    }

    /// The default reply: a completed command and an idle ready cycle.
    #[must_use]
    pub fn ok(tag: &str) -> Vec<u8> {
        [command_complete(tag), ready_for_query(b'I')].concat()
    }
}

/// Observable record of everything a [`ScriptedEngine`] was asked to do.
#[derive(Debug, Default)]
pub struct ScriptLog {
    inner: Mutex<LogInner>,
}

#[derive(Debug, Default)]
struct LogInner {
    requests: Vec<Vec<u8>>,
    installed_bundles: Vec<(String, usize)>,
    seeds: Vec<[u8; 32]>,
    shutdowns: u32,
}

impl ScriptLog {
    /// Every raw request the engine has pumped, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.inner.lock().requests.clone()
    }

    /// Requests rendered lossily as strings, for substring assertions.
    #[must_use]
    pub fn request_texts(&self) -> Vec<String> {
        self.inner
            .lock()
            .requests
            .iter()
            .map(|r| String::from_utf8_lossy(r).into_owned())
            .collect()
    }

    /// `(name, bundle length)` for every installed bundle, in order.
    #[must_use]
    pub fn installed_bundles(&self) -> Vec<(String, usize)> {
        self.inner.lock().installed_bundles.clone()
    }

    /// Every reseed value handed to the engine, in order.
    #[must_use]
    pub fn seeds(&self) -> Vec<[u8; 32]> {
        self.inner.lock().seeds.clone()
    }

    /// How many times `shutdown` ran.
    #[must_use]
    pub fn shutdowns(&self) -> u32 {
        self.inner.lock().shutdowns
    }
}

type Responder = Box<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send>;

/// In-memory engine with canned responses.
pub struct ScriptedEngine {
    bridge: Arc<IoBridge>,
    heap: Vec<u8>,
    responders: Vec<Responder>,
    log: Arc<ScriptLog>,
    started: bool,
    boot_outcome: BootOutcome,
    version: String,
}

impl ScriptedEngine {
    /// Build an engine sized from `options`, wired to `bridge`.
    #[must_use]
    pub fn new(options: &EngineOptions, bridge: Arc<IoBridge>) -> Self {
        Self {
            bridge,
            heap: vec![0u8; options.initial_memory_bytes],
            responders: Vec::new(),
            log: Arc::new(ScriptLog::default()),
            started: false,
            boot_outcome: BootOutcome::MustCreate,
            version: "scripted-16.4".to_owned(),
        }
    }

    /// Handle for inspecting this engine after it is boxed away.
    #[must_use]
    pub fn log(&self) -> Arc<ScriptLog> {
        Arc::clone(&self.log)
    }

    /// Share an existing log (so a factory-built engine reports into the
    /// same record as its predecessor's test).
    pub fn set_log(&mut self, log: Arc<ScriptLog>) {
        self.log = log;
    }

    /// Answer requests containing `needle` with `response`. Responders
    /// are consulted in registration order; the first match wins.
    pub fn respond_when(&mut self, needle: &str, response: Vec<u8>) {
        let needle = needle.as_bytes().to_vec();
        self.responders.push(Box::new(move |request| {
            request
                .windows(needle.len().max(1))
                .any(|w| w == needle.as_slice())
                .then(|| response.clone())
        }));
    }

    /// Override the boot outcome (defaults to `MustCreate`).
    pub fn set_boot_outcome(&mut self, outcome: BootOutcome) {
        self.boot_outcome = outcome;
    }

    fn pick_response(&self, request: &[u8]) -> Vec<u8> {
        for responder in &self.responders {
            if let Some(response) = responder(request) {
                return response;
            }
        }
        wire::ok("OK")
    }
}

impl Engine for ScriptedEngine {
    fn start(&mut self) -> Result<BootOutcome> {
        self.started = true;
        Ok(self.boot_outcome)
    }

    fn pump(&mut self) -> Result<()> {
        if !self.started {
            return Err(PgletError::internal("pump before start"));
        }
        // Pull the whole request through the bridge.
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = self.bridge.read(&mut buf)?;
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        let response = self.pick_response(&request);
        self.log.inner.lock().requests.push(request);
        // Push the response in small chunks; the classifier must cope
        // with frame boundaries landing anywhere.
        for chunk in response.chunks(7) {
            let mut offset = 0;
            while offset < chunk.len() {
                offset += self.bridge.write(&chunk[offset..])?;
            }
        }
        Ok(())
    }

    fn memory_size(&self) -> usize {
        self.heap.len()
    }

    fn memory(&self) -> &[u8] {
        &self.heap
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.heap
    }

    fn grow_memory(&mut self, min_bytes: usize) -> Result<()> {
        if self.heap.len() < min_bytes {
            self.heap.resize(min_bytes, 0);
        }
        Ok(())
    }

    fn install_bundle(&mut self, name: &str, bundle: &[u8]) -> Result<()> {
        // Installing grows the region, so memory accounting has
        // something real to observe.
        self.heap.extend_from_slice(bundle);
        self.log
            .inner
            .lock()
            .installed_bundles
            .push((name.to_owned(), bundle.len()));
        Ok(())
    }

    fn reseed_random(&mut self, seed: [u8; 32]) -> Result<()> {
        self.log.inner.lock().seeds.push(seed);
        Ok(())
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn shutdown(&mut self) -> Result<()> {
        self.started = false;
        self.log.inner.lock().shutdowns += 1;
        Ok(())
    }
}
