//! Server-side session and connection handling: the `VERSION`/
//! `AUTHORIZE` pre-auth gate (`server.c`'s `SERVER_COMMANDS` table,
//! where every entry but `AUTHORIZE` requires `AUTHORIZATION_STATE_OK`)
//! plus a per-connection reader thread feeding a small worker pool, per
//! the concurrency model's "writer worker pool (typically <= 3)".

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use crate::error::{BarError, Kind, Result};

use super::message::{parse_request, Request, Response};

pub const PROTOCOL_VERSION_MAJOR: u32 = 1;
pub const PROTOCOL_VERSION_MINOR: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Waiting,
    Ok,
    Fail,
}

/// Verifies an `AUTHORIZE` request. Kept separate from [`CommandHandler`]
/// so identity policy (instance UUID comparison, RSA session key
/// handling) stays out of the framing layer.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, encrypt_type: &str, name: &str, encrypted_uuid: &str) -> bool;
}

/// Executes every command other than `VERSION`/`AUTHORIZE`. A handler
/// may emit any number of intermediate responses (`completed = false`)
/// before its final one.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, request: &Request) -> Vec<Response>;
}

/// Per-connection authorization state, advanced by `VERSION`/
/// `AUTHORIZE` and consulted for every other command.
pub struct Session<A, H> {
    authorizer: Arc<A>,
    handler: Arc<H>,
    state: AuthState,
}

impl<A: Authorizer, H: CommandHandler> Session<A, H> {
    pub fn new(authorizer: Arc<A>, handler: Arc<H>) -> Self {
        Self { authorizer, handler, state: AuthState::Waiting }
    }

    /// Parses and dispatches one line, returning the response line(s)
    /// to write back. Never panics on malformed input; a parse failure
    /// becomes a protocol-error response with id 0.
    pub fn handle_line(&mut self, line: &str) -> Vec<Response> {
        let request = match parse_request(line) {
            Ok(r) => r,
            Err(e) => return vec![Response::error(0, Kind::Protocol.code(), &e.message)],
        };

        match request.command.as_str() {
            "VERSION" => vec![Response::ok(request.id, true)
                .with_arg("major", PROTOCOL_VERSION_MAJOR.to_string())
                .with_arg("minor", PROTOCOL_VERSION_MINOR.to_string())
                .with_arg("mode", "SERVER")],
            "AUTHORIZE" => {
                let encrypt_type = request.get("encryptType").unwrap_or("NONE");
                let name = request.get("name").unwrap_or("");
                let encrypted_uuid = request.get("encryptedUUID").unwrap_or("");
                if self.authorizer.authorize(encrypt_type, name, encrypted_uuid) {
                    self.state = AuthState::Ok;
                    tracing::info!(name, "session authorized");
                    vec![Response::ok(request.id, true)]
                } else {
                    self.state = AuthState::Fail;
                    tracing::warn!(name, "session authorization failed");
                    vec![Response::error(request.id, Kind::Auth.code(), "authorization failed")]
                }
            }
            _ if self.state != AuthState::Ok => {
                vec![Response::error(request.id, Kind::Auth.code(), "not authorized")]
            }
            _ => self.handler.handle(&request),
        }
    }
}

/// Listens for connections and spawns a reader thread plus a small
/// worker pool per connection.
pub struct Server<A, H> {
    listener: TcpListener,
    authorizer: Arc<A>,
    handler: Arc<H>,
    worker_count: usize,
}

impl<A: Authorizer + 'static, H: CommandHandler + 'static> Server<A, H> {
    pub fn bind(addr: &str, authorizer: Arc<A>, handler: Arc<H>) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(BarError::from)?;
        Ok(Self { listener, authorizer, handler, worker_count: 3 })
    }

    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count.max(1);
        self
    }

    /// Accepts connections forever, handling each on its own thread.
    /// Never returns except on a listener error.
    pub fn run(self) -> Result<()> {
        for stream in self.listener.incoming() {
            let stream = stream.map_err(BarError::from)?;
            if let Ok(peer) = stream.peer_addr() {
                tracing::info!(%peer, "connection accepted");
            }
            let authorizer = self.authorizer.clone();
            let handler = self.handler.clone();
            let worker_count = self.worker_count;
            thread::spawn(move || {
                let _ = serve_connection(stream, authorizer, handler, worker_count);
            });
        }
        Ok(())
    }
}

fn serve_connection<A: Authorizer + 'static, H: CommandHandler + 'static>(
    stream: TcpStream,
    authorizer: Arc<A>,
    handler: Arc<H>,
    worker_count: usize,
) -> Result<()> {
    let reader_stream = stream.try_clone().map_err(BarError::from)?;
    let writer = Arc::new(Mutex::new(stream));
    let session = Arc::new(Mutex::new(Session::new(authorizer, handler)));

    let (tx, rx) = mpsc::channel::<String>();
    let rx = Arc::new(Mutex::new(rx));
    let mut workers = Vec::with_capacity(worker_count);
    for _ in 0..worker_count {
        let rx = rx.clone();
        let session = session.clone();
        let writer = writer.clone();
        workers.push(thread::spawn(move || {
            loop {
                let line = match rx.lock().unwrap().recv() {
                    Ok(line) => line,
                    Err(_) => break,
                };
                let responses = session.lock().unwrap().handle_line(&line);
                let mut out = writer.lock().unwrap();
                for response in responses {
                    if writeln!(out, "{}", response.encode()).is_err() {
                        return;
                    }
                }
            }
        }));
    }

    let mut lines = BufReader::new(reader_stream).lines();
    while let Some(line) = lines.next() {
        match line {
            Ok(line) if !line.is_empty() => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    drop(tx);
    for worker in workers {
        let _ = worker.join();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AllowAll;
    impl Authorizer for AllowAll {
        fn authorize(&self, _encrypt_type: &str, _name: &str, _encrypted_uuid: &str) -> bool {
            true
        }
    }

    struct DenyAll;
    impl Authorizer for DenyAll {
        fn authorize(&self, _encrypt_type: &str, _name: &str, _encrypted_uuid: &str) -> bool {
            false
        }
    }

    struct Echo;
    impl CommandHandler for Echo {
        fn handle(&self, request: &Request) -> Vec<Response> {
            vec![Response::ok(request.id, true).with_arg("echo", request.command.clone())]
        }
    }

    #[test]
    fn version_is_allowed_before_authorization() {
        let mut session = Session::new(Arc::new(AllowAll), Arc::new(Echo));
        let responses = session.handle_line("1 VERSION");
        assert_eq!(responses.len(), 1);
        assert!(responses[0].get("major").is_some());
    }

    #[test]
    fn ordinary_commands_rejected_before_authorization() {
        let mut session = Session::new(Arc::new(AllowAll), Arc::new(Echo));
        let responses = session.handle_line("2 JOB_LIST");
        assert_eq!(responses[0].error_code, Kind::Auth.code());
    }

    #[test]
    fn authorize_then_dispatch_succeeds() {
        let mut session = Session::new(Arc::new(AllowAll), Arc::new(Echo));
        session.handle_line("1 VERSION");
        let auth = session.handle_line("2 AUTHORIZE encryptType=NONE name=worker1 encryptedUUID=x");
        assert_eq!(auth[0].error_code, 0);
        let dispatched = session.handle_line("3 JOB_LIST");
        assert_eq!(dispatched[0].get("echo"), Some("JOB_LIST"));
    }

    #[test]
    fn failed_authorization_keeps_session_locked_out() {
        let mut session = Session::new(Arc::new(DenyAll), Arc::new(Echo));
        session.handle_line("1 AUTHORIZE encryptType=NONE name=worker1 encryptedUUID=x");
        let responses = session.handle_line("2 JOB_LIST");
        assert_eq!(responses[0].error_code, Kind::Auth.code());
    }
}
