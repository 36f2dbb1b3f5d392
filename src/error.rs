//! Stable error codes and the error type shared by every layer of the engine.
//!
//! Mirrors `error_info` from the original source: a small stable code plus a
//! human-oriented detail string that callers are never expected to parse.

use std::fmt;

/// Client-side errors: connection lifecycle, timeouts, and local rejections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ClientErrorKind {
    #[error("not connected")]
    NotConnected,
    #[error("connection lost")]
    ConnectionLost,
    #[error("connection closed")]
    ConnectionClosed,
    #[error("connection reset")]
    ConnectionReset,
    #[error("operation already in progress")]
    AlreadyInProgress,
    #[error("operation aborted")]
    OperationAborted,
    #[error("request timed out")]
    RequestTimeout,
    #[error("host resolution failed")]
    ResolveFailed,
    #[error("host resolution timed out")]
    ResolveTimeout,
    #[error("connect failed")]
    ConnectFailed,
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("handshake failed")]
    HandshakeFailed,
    #[error("handshake timed out")]
    HandshakeTimeout,
    #[error("write error")]
    WriteError,
    #[error("unsolicited message from server")]
    UnsolicitedMessage,
    #[error("pending request queue is full")]
    QueueFull,
    #[error("internal error")]
    InternalError,
}

/// RESP3 syntax errors raised by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolErrorKind {
    #[error("invalid type byte")]
    InvalidTypeByte,
    #[error("invalid length")]
    InvalidLength,
    #[error("invalid integer")]
    InvalidInteger,
    #[error("invalid double")]
    InvalidDouble,
    #[error("invalid boolean")]
    InvalidBoolean,
    #[error("invalid null")]
    InvalidNull,
    #[error("invalid bulk trailer")]
    InvalidBulkTrailer,
    #[error("invalid map pairs")]
    InvalidMapPairs,
    #[error("invalid parser state")]
    InvalidState,
    #[error("configured limit exceeded")]
    LimitExceeded,
}

/// Errors raised while adapting a parsed [`crate::resp3::message::Message`] into a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdapterErrorKind {
    #[error("type mismatch")]
    TypeMismatch,
    #[error("unexpected null")]
    UnexpectedNull,
    #[error("value out of range")]
    ValueOutOfRange,
    #[error("size mismatch")]
    SizeMismatch,
    #[error("invalid value")]
    InvalidValue,
}

/// The four error domains a [`RedisError`] can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorKind {
    #[error(transparent)]
    Client(ClientErrorKind),
    #[error(transparent)]
    Protocol(ProtocolErrorKind),
    #[error(transparent)]
    Adapter(AdapterErrorKind),
    /// The server replied with a RESP3 `simple_error`/`bulk_error`. `detail` carries the
    /// server's message verbatim.
    #[error("server error")]
    Server,
}

/// A compact error object: a stable [`ErrorKind`] plus a human-oriented detail string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl fmt::Display for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.detail.is_empty() {
            write!(f, " ({})", self.detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for RedisError {}

impl RedisError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        RedisError { kind, detail: detail.into() }
    }

    pub fn client(kind: ClientErrorKind) -> Self {
        RedisError { kind: ErrorKind::Client(kind), detail: String::new() }
    }

    pub fn client_detail(kind: ClientErrorKind, detail: impl Into<String>) -> Self {
        RedisError { kind: ErrorKind::Client(kind), detail: detail.into() }
    }

    pub fn protocol(kind: ProtocolErrorKind) -> Self {
        RedisError { kind: ErrorKind::Protocol(kind), detail: String::new() }
    }

    pub fn protocol_detail(kind: ProtocolErrorKind, detail: impl Into<String>) -> Self {
        RedisError { kind: ErrorKind::Protocol(kind), detail: detail.into() }
    }

    pub fn adapter(kind: AdapterErrorKind, detail: impl Into<String>) -> Self {
        RedisError { kind: ErrorKind::Adapter(kind), detail: detail.into() }
    }

    pub fn server(detail: impl Into<String>) -> Self {
        RedisError { kind: ErrorKind::Server, detail: detail.into() }
    }

    pub fn is_connection_dropped(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Client(
                ClientErrorKind::ConnectionLost
                    | ClientErrorKind::ConnectionReset
                    | ClientErrorKind::ConnectionClosed
            )
        )
    }

    pub fn append_detail(&mut self, s: &str) {
        if s.is_empty() {
            return;
        }
        if !self.detail.is_empty() {
            self.detail.push(' ');
        }
        self.detail.push_str(s);
    }
}

impl From<std::io::Error> for RedisError {
    fn from(e: std::io::Error) -> Self {
        RedisError::client_detail(ClientErrorKind::WriteError, e.to_string())
    }
}

/// A structured element of an [`AdapterError`] path: either an index into a sequence or a
/// labeled field/key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Index(usize),
    Field(&'static str),
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "[{i}]"),
            PathSegment::Field(name) => write!(f, ".{name}"),
            PathSegment::Key(k) => write!(f, "[{k:?}]"),
        }
    }
}

/// An adapter error with a structural path preserved as it unwinds the recursive decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub path: Vec<PathSegment>,
    pub detail: String,
}

impl std::error::Error for AdapterError {}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.path.is_empty() {
            write!(f, " at $")?;
            for seg in &self.path {
                write!(f, "{seg}")?;
            }
        }
        if !self.detail.is_empty() {
            write!(f, " ({})", self.detail)?;
        }
        Ok(())
    }
}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind, detail: impl Into<String>) -> Self {
        AdapterError { kind, path: Vec::new(), detail: detail.into() }
    }

    /// Prepend a path segment as the error unwinds through a recursive decode.
    pub fn prepend(mut self, segment: PathSegment) -> Self {
        self.path.insert(0, segment);
        self
    }
}

impl From<AdapterError> for RedisError {
    fn from(e: AdapterError) -> Self {
        let detail = e.to_string();
        RedisError::adapter(e.kind, detail)
    }
}

pub type Result<T> = std::result::Result<T, RedisError>;
