//! Action sink that prints each forwarded event as one JSON line.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, OnceLock};

use connector::ClientHandle;
use protocol::{ActionSink, Event, SinkError};

/// Writes forwarded events to `W` and counts them.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
    forwarded: AtomicUsize,
    limit: Option<usize>,
    handle: OnceLock<ClientHandle>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    /// Writes to `out`; once `limit` events have been written the attached
    /// client is asked to close.
    pub fn new(out: W, limit: Option<usize>) -> Self {
        Self {
            out: Mutex::new(out),
            forwarded: AtomicUsize::new(0),
            limit,
            handle: OnceLock::new(),
        }
    }

    /// Attaches the handle used to stop the client at the limit.
    pub fn attach(&self, handle: ClientHandle) {
        let _ = self.handle.set(handle);
    }

    pub fn forwarded(&self) -> usize {
        self.forwarded.load(Ordering::SeqCst)
    }
}

impl<W: Write + Send> ActionSink for JsonLinesSink<W> {
    fn submit(&self, event: Event) -> Result<(), SinkError> {
        let line = serde_json::to_string(&event).map_err(|e| SinkError::new(e.to_string()))?;
        {
            let mut out = self
                .out
                .lock()
                .map_err(|_| SinkError::new("output lock poisoned"))?;
            writeln!(out, "{line}")
                .and_then(|()| out.flush())
                .map_err(|e| SinkError::new(format!("failed to write event: {e}")))?;
        }

        let forwarded = self.forwarded.fetch_add(1, Ordering::SeqCst) + 1;
        if self.limit.is_some_and(|limit| forwarded >= limit) {
            if let Some(handle) = self.handle.get() {
                handle.close();
            }
        }
        Ok(())
    }
}
