//! Response sinks: the pipeline's uniform handle onto a waiting caller's typed reply slot(s).
//!
//! Both concrete sinks resume their waiter with a single `tokio::sync::oneshot::Sender::send`.
//! `oneshot` delivers its value by moving it across the channel rather than invoking a
//! continuation in place, so the actor task that calls `send` never runs user code — the waiter
//! resumes on its own task when it polls the paired `Receiver`.

use std::time::Instant;

use tokio::sync::oneshot;

use crate::adapter::FromResp3;
use crate::connection::config::{RequestTraceFinish, RequestTraceHooks};
use crate::error::RedisError;
use crate::resp3::message::Message;

/// The pipeline's object-safe view onto a pending request's reply slot(s).
pub trait ResponseSink: Send {
    fn deliver(&mut self, msg: Message);
    fn deliver_error(&mut self, err: RedisError);
    fn expected_replies(&self) -> usize;
    fn is_complete(&self) -> bool;
    /// Fail every slot not yet filled, then complete.
    fn fail_all(&mut self, err: RedisError);
}

fn decode_slot<T: FromResp3>(msg: Message) -> Result<T, RedisError> {
    if msg.is_error() {
        return Err(RedisError::server(msg.error_text().unwrap_or_default().to_owned()));
    }
    T::from_resp3(&msg).map_err(RedisError::from)
}

/// Tracing context a sink carries so it can report `on_finish` when it completes.
pub struct SinkTrace {
    pub hooks: RequestTraceHooks,
    pub command_count: usize,
    pub enqueued_at: Instant,
}

impl SinkTrace {
    fn finish(&self, ok_count: usize, err_count: usize, first_error: Option<RedisError>) {
        if let Some(on_finish) = &self.hooks.on_finish {
            on_finish(&RequestTraceFinish {
                command_count: self.command_count,
                ok_count,
                err_count,
                first_error,
                elapsed: self.enqueued_at.elapsed(),
            });
        }
    }
}

macro_rules! define_fixed_sink {
    ($name:ident, $arity:expr; $($idx:tt => $t:ident),+) => {
        /// A sink for a pipelined request with a compile-time-known, heterogeneous reply shape.
        pub struct $name<$($t: FromResp3 + Send + 'static),+> {
            slots: ($(Option<Result<$t, RedisError>>,)+),
            next: usize,
            sender: Option<oneshot::Sender<($(Result<$t, RedisError>,)+)>>,
            trace: Option<SinkTrace>,
        }

        impl<$($t: FromResp3 + Send + 'static),+> $name<$($t),+> {
            pub fn new(
                sender: oneshot::Sender<($(Result<$t, RedisError>,)+)>,
                trace: Option<SinkTrace>,
            ) -> Self {
                $name {
                    slots: Default::default(),
                    next: 0,
                    sender: Some(sender),
                    trace,
                }
            }

            fn try_finish(&mut self) {
                if self.next < $arity {
                    return;
                }
                let Some(sender) = self.sender.take() else { return };
                let ok_count = [$( self.slots.$idx.as_ref().map(|r| r.is_ok()).unwrap_or(false) ),+]
                    .iter()
                    .filter(|ok| **ok)
                    .count();
                let err_count = $arity - ok_count;
                let mut first_error = None;
                $(
                    if first_error.is_none() {
                        if let Some(Err(e)) = &self.slots.$idx {
                            first_error = Some(e.clone());
                        }
                    }
                )+
                if let Some(trace) = &self.trace {
                    trace.finish(ok_count, err_count, first_error);
                }
                $(
                    let $t = self.slots.$idx.take().expect("every slot filled before try_finish sends");
                )+
                let _ = sender.send(($($t,)+));
            }
        }

        impl<$($t: FromResp3 + Send + 'static),+> ResponseSink for $name<$($t),+> {
            fn deliver(&mut self, msg: Message) {
                match self.next {
                    $( $idx => { self.slots.$idx = Some(decode_slot::<$t>(msg)); } )+
                    _ => {}
                }
                self.next += 1;
                self.try_finish();
            }

            fn deliver_error(&mut self, err: RedisError) {
                match self.next {
                    $( $idx => { self.slots.$idx = Some(Err(err)); } )+
                    _ => {}
                }
                self.next += 1;
                self.try_finish();
            }

            fn expected_replies(&self) -> usize {
                $arity
            }

            fn is_complete(&self) -> bool {
                self.next >= $arity
            }

            fn fail_all(&mut self, err: RedisError) {
                while self.next < $arity {
                    match self.next {
                        $( $idx => { self.slots.$idx = Some(Err(err.clone())); } )+
                        _ => {}
                    }
                    self.next += 1;
                }
                self.try_finish();
            }
        }
    };
}

define_fixed_sink!(FixedSink1, 1; 0 => T0);
define_fixed_sink!(FixedSink2, 2; 0 => T0, 1 => T1);
define_fixed_sink!(FixedSink3, 3; 0 => T0, 1 => T1, 2 => T2);
define_fixed_sink!(FixedSink4, 4; 0 => T0, 1 => T1, 2 => T2, 3 => T3);
define_fixed_sink!(FixedSink5, 5; 0 => T0, 1 => T1, 2 => T2, 3 => T3, 4 => T4);
define_fixed_sink!(FixedSink6, 6; 0 => T0, 1 => T1, 2 => T2, 3 => T3, 4 => T4, 5 => T5);
define_fixed_sink!(FixedSink7, 7; 0 => T0, 1 => T1, 2 => T2, 3 => T3, 4 => T4, 5 => T5, 6 => T6);
define_fixed_sink!(FixedSink8, 8; 0 => T0, 1 => T1, 2 => T2, 3 => T3, 4 => T4, 5 => T5, 6 => T6, 7 => T7);
define_fixed_sink!(FixedSink9, 9; 0 => T0, 1 => T1, 2 => T2, 3 => T3, 4 => T4, 5 => T5, 6 => T6, 7 => T7, 8 => T8);
define_fixed_sink!(FixedSink10, 10; 0 => T0, 1 => T1, 2 => T2, 3 => T3, 4 => T4, 5 => T5, 6 => T6, 7 => T7, 8 => T8, 9 => T9);
define_fixed_sink!(FixedSink11, 11; 0 => T0, 1 => T1, 2 => T2, 3 => T3, 4 => T4, 5 => T5, 6 => T6, 7 => T7, 8 => T8, 9 => T9, 10 => T10);
define_fixed_sink!(FixedSink12, 12; 0 => T0, 1 => T1, 2 => T2, 3 => T3, 4 => T4, 5 => T5, 6 => T6, 7 => T7, 8 => T8, 9 => T9, 10 => T10, 11 => T11);

/// A sink for a pipelined request whose reply count is only known at runtime (e.g. a
/// user-assembled batch of `N` identical commands).
pub struct DynamicSink<T: FromResp3 + Send + 'static> {
    results: Vec<Result<T, RedisError>>,
    expected: usize,
    sender: Option<oneshot::Sender<Vec<Result<T, RedisError>>>>,
    trace: Option<SinkTrace>,
}

impl<T: FromResp3 + Send + 'static> DynamicSink<T> {
    pub fn new(
        expected_replies: usize,
        sender: oneshot::Sender<Vec<Result<T, RedisError>>>,
        trace: Option<SinkTrace>,
    ) -> Self {
        DynamicSink {
            results: Vec::with_capacity(expected_replies),
            expected: expected_replies,
            sender: Some(sender),
            trace,
        }
    }

    fn try_finish(&mut self) {
        if self.results.len() < self.expected {
            return;
        }
        let Some(sender) = self.sender.take() else { return };
        let ok_count = self.results.iter().filter(|r| r.is_ok()).count();
        let err_count = self.results.len() - ok_count;
        let first_error = self.results.iter().find_map(|r| r.as_ref().err().cloned());
        if let Some(trace) = &self.trace {
            trace.finish(ok_count, err_count, first_error);
        }
        let _ = sender.send(std::mem::take(&mut self.results));
    }
}

impl<T: FromResp3 + Send + 'static> ResponseSink for DynamicSink<T> {
    fn deliver(&mut self, msg: Message) {
        self.results.push(decode_slot::<T>(msg));
        self.try_finish();
    }

    fn deliver_error(&mut self, err: RedisError) {
        self.results.push(Err(err));
        self.try_finish();
    }

    fn expected_replies(&self) -> usize {
        self.expected
    }

    fn is_complete(&self) -> bool {
        self.results.len() >= self.expected
    }

    fn fail_all(&mut self, err: RedisError) {
        while self.results.len() < self.expected {
            self.results.push(Err(err.clone()));
        }
        self.try_finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sink_completes_after_all_slots_filled() {
        let (tx, rx) = oneshot::channel();
        let mut sink = FixedSink2::<i64, String>::new(tx, None);
        assert!(!sink.is_complete());
        sink.deliver(Message::Integer(1));
        assert!(!sink.is_complete());
        sink.deliver(Message::SimpleString("ok".into()));
        assert!(sink.is_complete());
        let (a, b) = rx.try_recv().unwrap();
        assert_eq!(a.unwrap(), 1);
        assert_eq!(b.unwrap(), "ok");
    }

    #[test]
    fn fixed_sink_preserves_per_slot_errors() {
        let (tx, rx) = oneshot::channel();
        let mut sink = FixedSink2::<String, i64>::new(tx, None);
        sink.deliver(Message::SimpleString("fine".into()));
        sink.deliver(Message::SimpleError("WRONGTYPE bad".into()));
        let (a, b) = rx.try_recv().unwrap();
        assert_eq!(a.unwrap(), "fine");
        assert!(b.is_err());
    }

    #[test]
    fn fixed_sink_fail_all_only_overwrites_unfilled_slots() {
        let (tx, rx) = oneshot::channel();
        let mut sink = FixedSink2::<i64, i64>::new(tx, None);
        sink.deliver(Message::Integer(7));
        sink.fail_all(RedisError::client(crate::error::ClientErrorKind::ConnectionLost));
        let (a, b) = rx.try_recv().unwrap();
        assert_eq!(a.unwrap(), 7);
        assert!(b.is_err());
    }

    #[test]
    fn dynamic_sink_completes_at_expected_count() {
        let (tx, rx) = oneshot::channel();
        let mut sink = DynamicSink::<i64>::new(2, tx, None);
        sink.deliver(Message::Integer(1));
        assert!(!sink.is_complete());
        sink.deliver(Message::Integer(2));
        assert!(sink.is_complete());
        let results = rx.try_recv().unwrap();
        assert_eq!(results.len(), 2);
    }
}
