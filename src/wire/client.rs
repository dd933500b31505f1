//! Client-side command dispatch: one id per outstanding command, a
//! per-command deadline, and `ABORT id=<n>` cancellation — grounded on
//! `connector.c`'s asynchronous command queue (`networkClientThreadCode`
//! demultiplexing response lines by id into a pending-callback table).

use std::collections::HashMap;
use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{BarError, Kind, Result};

use super::message::{Argument, Request, Response};

/// Abstracts the transport a [`Client`] writes request lines to, so
/// the dispatch/timeout bookkeeping below can be tested without a
/// real socket.
pub trait LineSink: Send {
    fn send_line(&mut self, line: &str) -> Result<()>;
}

impl LineSink for TcpStream {
    fn send_line(&mut self, line: &str) -> Result<()> {
        writeln!(self, "{line}").map_err(BarError::from)
    }
}

struct Pending {
    deadline: Instant,
    callback: Box<dyn FnMut(Response) + Send>,
}

/// A connection to one worker (or, on the worker side, to the master).
/// `call` assigns the next id and registers a callback; `on_line`
/// dispatches an incoming response line to the matching callback.
pub struct Client<S: LineSink> {
    sink: Mutex<S>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, Pending>>,
}

impl<S: LineSink> Client<S> {
    pub fn new(sink: S) -> Self {
        Self { sink: Mutex::new(sink), next_id: AtomicU64::new(1), pending: Mutex::new(HashMap::new()) }
    }

    /// Sends `command` with `arguments`, registering `callback` to
    /// receive every response line sharing the returned id until one
    /// arrives with `completed = true`.
    pub fn call(
        &self,
        command: &str,
        arguments: Vec<Argument>,
        timeout: Duration,
        callback: impl FnMut(Response) + Send + 'static,
    ) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request { id, command: command.to_string(), arguments };
        self.pending.lock().unwrap().insert(id, Pending { deadline: Instant::now() + timeout, callback: Box::new(callback) });
        if let Err(e) = self.sink.lock().unwrap().send_line(&request.encode()) {
            self.pending.lock().unwrap().remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    /// Feeds one incoming response line to its pending callback. Lines
    /// with no matching pending command (already timed out, already
    /// completed, or a stray server event) are silently dropped.
    pub fn on_line(&self, line: &str) -> Result<()> {
        let response = super::message::parse_response(line)?;
        let mut pending = self.pending.lock().unwrap();
        let completed = response.completed;
        if let Some(entry) = pending.get_mut(&response.id) {
            (entry.callback)(response);
            if completed {
                pending.remove(&response.id);
            }
        }
        Ok(())
    }

    /// Scans for commands past their deadline, invokes each callback
    /// with a synthetic timeout error, and removes it. Returns the ids
    /// that timed out.
    pub fn expire_timeouts(&self) -> Vec<u64> {
        let now = Instant::now();
        let mut pending = self.pending.lock().unwrap();
        let expired: Vec<u64> = pending.iter().filter(|(_, p)| p.deadline <= now).map(|(id, _)| *id).collect();
        for id in &expired {
            if let Some(mut entry) = pending.remove(id) {
                (entry.callback)(Response::error(*id, Kind::Aborted.code(), "command timed out"));
            }
        }
        expired
    }

    /// Requests cancellation of a prior command. Best-effort: the
    /// server may already be past the point where it stops emitting
    /// further results.
    pub fn abort(&self, id: u64) -> Result<()> {
        let request = Request { id: 0, command: "ABORT".into(), arguments: vec![Argument { name: "id".into(), value: id.to_string() }] };
        self.sink.lock().unwrap().send_line(&request.encode())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl LineSink for RecordingSink {
    fn send_line(&mut self, line: &str) -> Result<()> {
        self.lines.lock().unwrap().push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn call_then_dispatch_final_response_removes_pending() {
        let sink = RecordingSink::default();
        let client = Client::new(sink.clone());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        let id = client.call("JOB_LIST", vec![], Duration::from_secs(5), move |_resp| {
            seen2.fetch_add(1, Ordering::SeqCst);
        }).unwrap();

        assert_eq!(client.pending_count(), 1);
        client.on_line(&format!("{id} 1 0")).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn intermediate_responses_keep_pending_alive() {
        let sink = RecordingSink::default();
        let client = Client::new(sink);
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let id = client.call("JOB_LIST", vec![], Duration::from_secs(5), move |_resp| {
            count2.fetch_add(1, Ordering::SeqCst);
        }).unwrap();

        client.on_line(&format!("{id} 0 0 name=one")).unwrap();
        assert_eq!(client.pending_count(), 1);
        client.on_line(&format!("{id} 1 0 name=two")).unwrap();
        assert_eq!(client.pending_count(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn expired_commands_receive_synthetic_timeout() {
        let sink = RecordingSink::default();
        let client = Client::new(sink);
        let error_code = Arc::new(AtomicUsize::new(0));
        let error_code2 = error_code.clone();
        client.call("STATUS", vec![], Duration::from_millis(0), move |resp| {
            error_code2.store(resp.error_code as usize, Ordering::SeqCst);
        }).unwrap();

        std::thread::sleep(Duration::from_millis(2));
        let expired = client.expire_timeouts();
        assert_eq!(expired.len(), 1);
        assert_eq!(error_code.load(Ordering::SeqCst), Kind::Aborted.code() as usize);
        assert_eq!(client.pending_count(), 0);
    }

    #[test]
    fn abort_writes_an_abort_request_with_target_id() {
        let sink = RecordingSink::default();
        let lines = sink.lines.clone();
        let client = Client::new(sink);
        client.abort(42).unwrap();
        assert!(lines.lock().unwrap()[0].contains("ABORT") && lines.lock().unwrap()[0].contains("id=42"));
    }
}
