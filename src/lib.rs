//! An async RESP3 client: incremental protocol parsing, a typed reply adapter, and a
//! single-task-per-connection actor with pipelining and automatic reconnection.
//!
//! No CLI, environment variables, or persisted state — this crate is a library only.

pub mod adapter;
pub mod client;
pub mod connection;
pub mod error;
pub mod pipeline;
pub mod request;
pub mod resp3;
pub mod sink;

pub use adapter::FromResp3;
pub use client::Client;
pub use connection::{Config, Connection, ConnectionState, ReconnectionPolicy};
pub use error::{AdapterError, AdapterErrorKind, ClientErrorKind, ErrorKind, ProtocolErrorKind, RedisError};
pub use request::Request;
pub use resp3::{Attributed, Kind, Message};
