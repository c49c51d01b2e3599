//! Per-invocation state: the request cursor and the response buffer.

use pglet_error::{PgletError, Result};

/// Hard ceiling for one call's accumulated response: 128 MiB. Reaching
/// it truncates nothing silently — the call fails with
/// [`PgletError::ResponseOverflow`].
pub const DEFAULT_RESPONSE_CEILING: usize = 128 * 1024 * 1024;

const INITIAL_CAPACITY: usize = 64 * 1024;

/// Growable response accumulator with geometric growth and a hard cap.
///
/// One contiguous read-only view per completed call; unbounded growth
/// would hand any query a self-inflicted denial of service.
#[derive(Debug)]
pub struct ResponseBuffer {
    buf: Vec<u8>,
    ceiling: usize,
}

impl ResponseBuffer {
    #[must_use]
    pub fn new(ceiling: usize) -> Self {
        Self {
            buf: Vec::new(),
            ceiling,
        }
    }

    /// Append a chunk, growing capacity geometrically up to the ceiling.
    pub fn append(&mut self, chunk: &[u8]) -> Result<()> {
        let needed = self.buf.len() + chunk.len();
        if needed > self.ceiling {
            return Err(PgletError::ResponseOverflow {
                limit: self.ceiling,
            });
        }
        if needed > self.buf.capacity() {
            let mut target = self.buf.capacity().max(INITIAL_CAPACITY);
            while target < needed {
                target = (target * 2).min(self.ceiling);
            }
            self.buf.reserve_exact(target - self.buf.len());
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// The state of one in-flight engine invocation.
///
/// Exists only for the duration of one serialized invocation, owned by
/// whichever domain is executing it.
#[derive(Debug)]
pub struct PendingCall {
    request: Vec<u8>,
    read_cursor: usize,
    response: ResponseBuffer,
}

impl PendingCall {
    #[must_use]
    pub fn new(request: Vec<u8>) -> Self {
        Self {
            request,
            read_cursor: 0,
            response: ResponseBuffer::new(DEFAULT_RESPONSE_CEILING),
        }
    }

    /// Drain request bytes into the engine's buffer. Sequential; once the
    /// request is exhausted, reports zero further bytes.
    pub fn read_request(&mut self, buf: &mut [u8]) -> usize {
        let remaining = &self.request[self.read_cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.read_cursor += n;
        n
    }

    /// Accept a response chunk from the engine.
    pub fn append_response(&mut self, chunk: &[u8]) -> Result<()> {
        self.response.append(chunk)
    }

    /// The raw response accumulated so far.
    #[must_use]
    pub fn response(&self) -> &[u8] {
        self.response.as_slice()
    }
}
