//! A single connection to a server: its configuration, lifecycle state, and the actor task that
//! drives the socket.

mod actor;
pub mod config;
pub mod state;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{ClientErrorKind, RedisError};
use crate::request::Request;
use crate::sink::ResponseSink;

pub use config::{Config, ConnectionEvent, ConnectionEventHooks, ReconnectionPolicy, RequestTraceHooks};
pub use state::{ConnectionState, StateSnapshot};

use actor::{Actor, ActorCommand};

const COMMAND_CHANNEL_CAPACITY: usize = 1024;

/// A handle to one connection's actor task. Cheap to clone; every clone shares the same
/// underlying socket and pipeline.
#[derive(Clone)]
pub struct Connection {
    cmd_tx: mpsc::Sender<ActorCommand>,
    state: StateSnapshot,
    /// Cancelling this requests shutdown; the actor observes it from every state, including
    /// mid-backoff, which a command sent over `cmd_tx` would not be.
    token: CancellationToken,
    /// Cancelled by the actor as its last action; `close()` awaits this rather than `token`
    /// itself so it returns only once teardown has actually completed.
    closed: CancellationToken,
}

impl Connection {
    /// Connects and completes the handshake before returning. Reconnection after the initial
    /// connect is handled internally by the actor and does not surface here.
    pub async fn connect(config: Config) -> Result<Connection, RedisError> {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let state = StateSnapshot::new(ConnectionState::Init);
        let token = CancellationToken::new();
        let closed = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();

        let actor = Actor::new(config, cmd_rx, state.clone(), token.clone(), closed.clone());
        tokio::spawn(actor.run(ready_tx));

        ready_rx
            .await
            .map_err(|_| RedisError::client(ClientErrorKind::InternalError))??;

        Ok(Connection { cmd_tx, state, token, closed })
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Enqueues a pipelined request with its sink. Never blocks; rejects synchronously with a
    /// state-appropriate error if the connection can't currently accept work, or with
    /// [`ClientErrorKind::QueueFull`] if the actor's limits are exceeded.
    pub(crate) fn enqueue(
        &self,
        request: Request,
        sink: Box<dyn ResponseSink>,
        deadline: Option<std::time::Instant>,
    ) -> Result<(), RedisError> {
        self.state.check_accepts_enqueue()?;
        // A send to the actor's command channel is a deliberate simplification of the original's
        // inline-if-already-on-strand fast path: every enqueue hops through the channel, even
        // when called from the actor's own task (which never happens in this design, since the
        // actor does not call back into its own `Connection` handle). Recorded in `DESIGN.md`.
        self.cmd_tx
            .try_send(ActorCommand::Enqueue { request, sink, deadline })
            .map_err(|_| RedisError::client(ClientErrorKind::QueueFull))
    }

    /// Idempotent; safe to call from any task, any number of times, and from every connection
    /// state, including mid-reconnect-backoff.
    pub async fn close(&self) {
        self.token.cancel();
        self.closed.cancelled().await;
    }
}
