//! FIFO scheduler for in-flight requests on one connection.
//!
//! Grounded on `original_source/include/rediscoro/detail/pipeline.hpp`'s write/read queue split.
//! No internal locking — `Pipeline` is only ever touched from the connection's actor task.

use std::time::Instant;

use crate::error::RedisError;
use crate::request::Request;
use crate::resp3::message::Message;
use crate::sink::ResponseSink;

struct PendingItem {
    request: Request,
    sink: Box<dyn ResponseSink>,
    bytes_written: usize,
    deadline: Option<Instant>,
}

/// Tracks requests from the moment they're pushed until their last reply slot resolves.
#[derive(Default)]
pub struct Pipeline {
    /// Requests not yet fully written to the socket, front is the one currently being written.
    pending_write: std::collections::VecDeque<PendingItem>,
    /// Requests fully written, awaiting replies, front is the next to receive a message.
    awaiting_read: std::collections::VecDeque<PendingItem>,
    pending_write_bytes: usize,
    max_pending_requests: usize,
    max_pending_write_bytes: usize,
}

impl Pipeline {
    pub fn new(max_pending_requests: usize, max_pending_write_bytes: usize) -> Self {
        Pipeline {
            pending_write: std::collections::VecDeque::new(),
            awaiting_read: std::collections::VecDeque::new(),
            pending_write_bytes: 0,
            max_pending_requests,
            max_pending_write_bytes,
        }
    }

    fn total_pending(&self) -> usize {
        self.pending_write.len() + self.awaiting_read.len()
    }

    /// Enqueue a request on the write side. Returns `false` without mutating state if either
    /// configured limit would be exceeded.
    pub fn push(&mut self, request: Request, sink: Box<dyn ResponseSink>, deadline: Option<Instant>) -> bool {
        debug_assert_eq!(request.command_count(), sink.expected_replies());
        if self.total_pending() >= self.max_pending_requests {
            return false;
        }
        if self.pending_write_bytes + request.len() > self.max_pending_write_bytes {
            return false;
        }
        self.pending_write_bytes += request.len();
        self.pending_write.push_back(PendingItem { request, sink, bytes_written: 0, deadline });
        true
    }

    pub fn has_pending_write(&self) -> bool {
        !self.pending_write.is_empty()
    }

    pub fn has_pending_read(&self) -> bool {
        !self.awaiting_read.is_empty()
    }

    /// The unsent tail of the front request, or an empty slice if nothing is pending.
    pub fn next_write_buffer(&self) -> &[u8] {
        match self.pending_write.front() {
            Some(item) => &item.request.as_bytes()[item.bytes_written..],
            None => &[],
        }
    }

    /// Advance the front request's written-byte count by `n`; migrates it to the read-awaiting
    /// queue once fully written.
    pub fn on_write_done(&mut self, n: usize) {
        let Some(item) = self.pending_write.front_mut() else { return };
        item.bytes_written += n;
        if item.bytes_written >= item.request.len() {
            let item = self.pending_write.pop_front().expect("front just checked");
            self.pending_write_bytes -= item.request.len();
            self.awaiting_read.push_back(item);
        }
    }

    /// Deliver a parsed message to the head read-awaiting sink; pops it once complete.
    pub fn on_message(&mut self, message: Message) {
        let Some(item) = self.awaiting_read.front_mut() else { return };
        item.sink.deliver(message);
        if item.sink.is_complete() {
            self.awaiting_read.pop_front();
        }
    }

    /// Deliver an error for one reply slot of the head read-awaiting sink.
    pub fn on_error(&mut self, error: RedisError) {
        let Some(item) = self.awaiting_read.front_mut() else { return };
        item.sink.deliver_error(error);
        if item.sink.is_complete() {
            self.awaiting_read.pop_front();
        }
    }

    /// Fail every outstanding sink (both queues) with `error`; used on shutdown and on
    /// connection-level failure.
    pub fn clear_all(&mut self, error: RedisError) {
        for mut item in self.pending_write.drain(..) {
            item.sink.fail_all(error.clone());
        }
        for mut item in self.awaiting_read.drain(..) {
            item.sink.fail_all(error.clone());
        }
        self.pending_write_bytes = 0;
    }

    /// The earliest deadline across both queues.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending_write
            .iter()
            .chain(self.awaiting_read.iter())
            .filter_map(|item| item.deadline)
            .min()
    }

    pub fn has_expired(&self, now: Instant) -> bool {
        self.next_deadline().is_some_and(|d| now >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientErrorKind;
    use crate::sink::FixedSink1;
    use tokio::sync::oneshot;

    fn item(n: usize) -> (Request, Box<dyn ResponseSink>, oneshot::Receiver<(Result<i64, RedisError>,)>) {
        let mut req = Request::new();
        req.push(&[&"GET", &"k"]);
        let _ = n;
        let (tx, rx) = oneshot::channel();
        (req, Box::new(FixedSink1::<i64>::new(tx, None)), rx)
    }

    #[test]
    fn push_respects_max_pending_requests() {
        let mut pipeline = Pipeline::new(1, 1 << 20);
        let (req1, sink1, _rx1) = item(1);
        assert!(pipeline.push(req1, sink1, None));
        let (req2, sink2, _rx2) = item(2);
        assert!(!pipeline.push(req2, sink2, None));
    }

    #[test]
    fn write_then_read_then_deliver_completes_sink() {
        let mut pipeline = Pipeline::new(10, 1 << 20);
        let (req, sink, rx) = item(1);
        let len = req.len();
        pipeline.push(req, sink, None);
        assert!(pipeline.has_pending_write());
        pipeline.on_write_done(len);
        assert!(!pipeline.has_pending_write());
        assert!(pipeline.has_pending_read());
        pipeline.on_message(Message::Integer(42));
        assert!(!pipeline.has_pending_read());
        assert_eq!(rx.try_recv().unwrap().0.unwrap(), 42);
    }

    #[test]
    fn clear_all_fails_both_queues() {
        let mut pipeline = Pipeline::new(10, 1 << 20);
        let (req1, sink1, rx1) = item(1);
        let len1 = req1.len();
        pipeline.push(req1, sink1, None);
        pipeline.on_write_done(len1);
        let (req2, sink2, rx2) = item(2);
        pipeline.push(req2, sink2, None);

        pipeline.clear_all(RedisError::client(ClientErrorKind::ConnectionLost));
        assert!(rx1.try_recv().unwrap().0.is_err());
        assert!(rx2.try_recv().unwrap().0.is_err());
    }

    #[test]
    fn next_deadline_is_the_earliest_across_both_queues() {
        let mut pipeline = Pipeline::new(10, 1 << 20);
        let now = Instant::now();
        let (req1, sink1, _rx1) = item(1);
        pipeline.push(req1, sink1, Some(now + std::time::Duration::from_secs(5)));
        let (req2, sink2, _rx2) = item(2);
        pipeline.push(req2, sink2, Some(now + std::time::Duration::from_secs(1)));
        assert_eq!(pipeline.next_deadline(), Some(now + std::time::Duration::from_secs(1)));
    }
}
