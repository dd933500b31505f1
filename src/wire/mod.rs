//! Wire protocol: newline-delimited text framing between a master and
//! a worker process.

pub mod client;
pub mod message;
pub mod server;

pub use client::{Client, LineSink};
pub use message::{Argument, Request, Response};
pub use server::{AuthState, Authorizer, CommandHandler, Server, Session};
