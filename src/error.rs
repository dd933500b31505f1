//! Crate-wide error taxonomy.
//!
//! Every operation in the core returns `Result<T, BarError>`. Each variant
//! carries an integer `code()` for wire transport (see `wire::message`) and
//! an optional source error for local diagnostics. Receivers on the far end
//! of the wire protocol only ever see the code and the rendered message —
//! they reconstruct an opaque error with those two fields, never the
//! original source chain.

use std::fmt;
use std::io;
use thiserror::Error;

/// Discriminant used to classify an error without inspecting its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Io,
    Auth,
    Protocol,
    Archive,
    Crypto,
    Index,
    Job,
    Resource,
    Aborted,
    Internal,
}

impl Kind {
    /// Integer code transported over the wire protocol.
    pub fn code(self) -> i32 {
        match self {
            Kind::Io => 1,
            Kind::Auth => 2,
            Kind::Protocol => 3,
            Kind::Archive => 4,
            Kind::Crypto => 5,
            Kind::Index => 6,
            Kind::Job => 7,
            Kind::Resource => 8,
            Kind::Aborted => 9,
            Kind::Internal => 10,
        }
    }

    pub fn from_code(code: i32) -> Option<Kind> {
        Some(match code {
            1 => Kind::Io,
            2 => Kind::Auth,
            3 => Kind::Protocol,
            4 => Kind::Archive,
            5 => Kind::Crypto,
            6 => Kind::Index,
            7 => Kind::Job,
            8 => Kind::Resource,
            9 => Kind::Aborted,
            10 => Kind::Internal,
            _ => return None,
        })
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Io => "IO",
            Kind::Auth => "Auth",
            Kind::Protocol => "Protocol",
            Kind::Archive => "Archive",
            Kind::Crypto => "Crypto",
            Kind::Index => "Index",
            Kind::Job => "Job",
            Kind::Resource => "Resource",
            Kind::Aborted => "Aborted",
            Kind::Internal => "Internal",
        };
        f.write_str(s)
    }
}

/// The crate-wide error type. Carries a [`Kind`], a human-readable message,
/// and an optional boxed cause for local `Display`/`source()` chaining.
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct BarError {
    pub kind: Kind,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl BarError {
    pub fn new(kind: Kind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), cause: None }
    }

    pub fn with_cause(
        kind: Kind,
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self { kind, message: message.into(), cause: Some(Box::new(cause)) }
    }

    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    /// Reconstruct an opaque error from a wire-transported code + text.
    /// Used by wire protocol clients that only see the integer and the
    /// rendered message, never the original cause chain.
    pub fn from_wire(code: i32, message: impl Into<String>) -> Self {
        let kind = Kind::from_code(code).unwrap_or(Kind::Internal);
        Self::new(kind, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(Kind::Io, message)
    }
    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(Kind::Auth, message)
    }
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(Kind::Protocol, message)
    }
    pub fn archive(message: impl Into<String>) -> Self {
        Self::new(Kind::Archive, message)
    }
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(Kind::Crypto, message)
    }
    pub fn index(message: impl Into<String>) -> Self {
        Self::new(Kind::Index, message)
    }
    pub fn job(message: impl Into<String>) -> Self {
        Self::new(Kind::Job, message)
    }
    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(Kind::Resource, message)
    }
    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(Kind::Aborted, message)
    }

    /// An invariant violation. Always fatal; callers should not attempt
    /// recovery. Mirrors the source's `HALT_INTERNAL_ERROR_*` family,
    /// ported as a recoverable-in-type-but-fatal-in-practice error rather
    /// than a process abort.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Kind::Internal, message)
    }

    pub fn is_retriable_io(&self) -> bool {
        self.kind == Kind::Io
    }
}

impl From<io::Error> for BarError {
    fn from(e: io::Error) -> Self {
        BarError::with_cause(Kind::Io, e.to_string(), e)
    }
}

impl From<rusqlite::Error> for BarError {
    fn from(e: rusqlite::Error) -> Self {
        BarError::with_cause(Kind::Index, e.to_string(), e)
    }
}

pub type Result<T> = std::result::Result<T, BarError>;
