//! Connection configuration: endpoint, timeouts, reconnection policy, and observability hooks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::RedisError;
use crate::resp3::ParserLimits;

/// Exponential backoff with an initial run of zero-delay attempts and multiplicative jitter.
#[derive(Clone)]
pub struct ReconnectionPolicy {
    pub enabled: bool,
    /// Number of reconnect attempts (after the first failure) that retry with no delay.
    pub immediate_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    /// Fraction in `0.0..=1.0`; delay is multiplied by a value drawn uniformly from
    /// `[1 - jitter_ratio, 1 + jitter_ratio]`. `0.0` disables jitter.
    pub jitter_ratio: f64,
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        ReconnectionPolicy {
            enabled: true,
            immediate_attempts: 1,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter_ratio: 0.2,
        }
    }
}

impl ReconnectionPolicy {
    /// The delay before reconnect attempt `k` (0-indexed), before jitter is applied.
    pub fn base_delay_for_attempt(&self, k: u32) -> Duration {
        if k < self.immediate_attempts {
            return Duration::ZERO;
        }
        let exponent = (k - self.immediate_attempts) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let clamped = scaled.clamp(self.initial_delay.as_secs_f64(), self.max_delay.as_secs_f64());
        Duration::from_secs_f64(clamped)
    }
}

/// Observed at the moment a request is enqueued; handed to [`RequestTraceHooks::on_start`].
#[derive(Debug, Clone)]
pub struct RequestTraceStart {
    pub command_count: usize,
    pub enqueued_at: Instant,
}

/// Observed once every reply slot of a request has resolved; handed to
/// [`RequestTraceHooks::on_finish`].
#[derive(Debug, Clone)]
pub struct RequestTraceFinish {
    pub command_count: usize,
    pub ok_count: usize,
    pub err_count: usize,
    pub first_error: Option<RedisError>,
    pub elapsed: Duration,
}

/// User-supplied callbacks invoked on the connection's actor task; must not block.
#[derive(Clone, Default)]
pub struct RequestTraceHooks {
    pub on_start: Option<Arc<dyn Fn(&RequestTraceStart) + Send + Sync>>,
    pub on_finish: Option<Arc<dyn Fn(&RequestTraceFinish) + Send + Sync>>,
}

/// Lifecycle events surfaced to a host application for logging/metrics.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Connected { generation: u64 },
    Disconnected { generation: u64, reconnect_count: u32, error: Option<RedisError> },
    Closed,
}

#[derive(Clone, Default)]
pub struct ConnectionEventHooks {
    pub on_event: Option<Arc<dyn Fn(&ConnectionEvent) + Send + Sync>>,
}

/// Connection configuration. Construct with [`Config::default`] and override fields, a plain
/// struct literal rather than a builder.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub resolve_timeout: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Option<Duration>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<i64>,
    pub client_name: Option<String>,
    pub reconnection: ReconnectionPolicy,
    pub trace_hooks: RequestTraceHooks,
    pub trace_handshake: bool,
    pub connection_hooks: ConnectionEventHooks,
    pub max_pending_requests: usize,
    pub max_pending_write_bytes: usize,
    pub parser_limits: ParserLimits,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_owned(),
            port: 6379,
            resolve_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            request_timeout: None,
            username: None,
            password: None,
            database: None,
            client_name: None,
            reconnection: ReconnectionPolicy::default(),
            trace_hooks: RequestTraceHooks::default(),
            trace_handshake: false,
            connection_hooks: ConnectionEventHooks::default(),
            max_pending_requests: 10_000,
            max_pending_write_bytes: 16 * 1024 * 1024,
            parser_limits: ParserLimits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_attempts_have_zero_delay() {
        let policy = ReconnectionPolicy::default();
        assert_eq!(policy.base_delay_for_attempt(0), Duration::ZERO);
    }

    #[test]
    fn delay_grows_then_clamps_to_max() {
        let policy = ReconnectionPolicy {
            immediate_attempts: 0,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            ..ReconnectionPolicy::default()
        };
        assert_eq!(policy.base_delay_for_attempt(0), Duration::from_millis(10));
        assert_eq!(policy.base_delay_for_attempt(1), Duration::from_millis(20));
        assert_eq!(policy.base_delay_for_attempt(10), Duration::from_millis(100));
    }
}
