//! The public client facade: a cheap handle around one [`Connection`], offering typed,
//! pipelined command execution.

use std::time::Instant;

use tokio::sync::oneshot;

use crate::adapter::FromResp3;
use crate::connection::config::{Config, RequestTraceStart};
use crate::connection::{Connection, ConnectionState};
use crate::error::{ClientErrorKind, RedisError};
use crate::request::Request;
use crate::sink::{
    DynamicSink, FixedSink1, FixedSink10, FixedSink11, FixedSink12, FixedSink2, FixedSink3,
    FixedSink4, FixedSink5, FixedSink6, FixedSink7, FixedSink8, FixedSink9, SinkTrace,
};

/// A Redis client: connect once, then issue any number of pipelined commands concurrently from
/// any task. Cloning shares the underlying connection.
#[derive(Clone)]
pub struct Client {
    connection: Connection,
    config: Config,
}

impl Client {
    pub async fn connect(config: Config) -> Result<Client, RedisError> {
        let connection = Connection::connect(config.clone()).await?;
        Ok(Client { connection, config })
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub async fn close(&self) {
        self.connection.close().await;
    }

    fn deadline(&self) -> Option<Instant> {
        self.config.request_timeout.map(|timeout| Instant::now() + timeout)
    }

    fn trace(&self, command_count: usize) -> Option<SinkTrace> {
        let hooks = self.config.trace_hooks.clone();
        if hooks.on_start.is_none() && hooks.on_finish.is_none() {
            return None;
        }
        let enqueued_at = Instant::now();
        if let Some(on_start) = &hooks.on_start {
            on_start(&RequestTraceStart { command_count, enqueued_at });
        }
        Some(SinkTrace { hooks, command_count, enqueued_at })
    }
}

macro_rules! define_exec {
    ($method:ident, $sink:ident; $($t:ident),+) => {
        impl Client {
            /// Sends a pipelined request whose reply shape is known at compile time; resolves
            /// once every reply has arrived, in request order.
            pub async fn $method<$($t: FromResp3 + Send + 'static),+>(
                &self,
                request: Request,
            ) -> Result<($(Result<$t, RedisError>,)+), RedisError> {
                let expected = request.command_count();
                let trace = self.trace(expected);
                let (tx, rx) = oneshot::channel();
                let sink = Box::new($sink::<$($t),+>::new(tx, trace));
                self.connection.enqueue(request, sink, self.deadline())?;
                rx.await.map_err(|_| RedisError::client(ClientErrorKind::ConnectionLost))
            }
        }
    };
}

define_exec!(exec1, FixedSink1; T0);
define_exec!(exec2, FixedSink2; T0, T1);
define_exec!(exec3, FixedSink3; T0, T1, T2);
define_exec!(exec4, FixedSink4; T0, T1, T2, T3);
define_exec!(exec5, FixedSink5; T0, T1, T2, T3, T4);
define_exec!(exec6, FixedSink6; T0, T1, T2, T3, T4, T5);
define_exec!(exec7, FixedSink7; T0, T1, T2, T3, T4, T5, T6);
define_exec!(exec8, FixedSink8; T0, T1, T2, T3, T4, T5, T6, T7);
define_exec!(exec9, FixedSink9; T0, T1, T2, T3, T4, T5, T6, T7, T8);
define_exec!(exec10, FixedSink10; T0, T1, T2, T3, T4, T5, T6, T7, T8, T9);
define_exec!(exec11, FixedSink11; T0, T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
define_exec!(exec12, FixedSink12; T0, T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);

impl Client {
    /// Sends a pipelined request whose reply count is only known at runtime — e.g. a batch of
    /// `N` identical commands assembled in a loop.
    pub async fn exec_dynamic<T: FromResp3 + Send + 'static>(
        &self,
        request: Request,
    ) -> Result<Vec<Result<T, RedisError>>, RedisError> {
        let expected = request.command_count();
        let trace = self.trace(expected);
        let (tx, rx) = oneshot::channel();
        let sink = Box::new(DynamicSink::<T>::new(expected, tx, trace));
        self.connection.enqueue(request, sink, self.deadline())?;
        rx.await.map_err(|_| RedisError::client(ClientErrorKind::ConnectionLost))
    }
}
