//! # Pipeline Session
//!
//! Purpose: Pair every decoded reply on a connection with the request that
//! produced it, using nothing but arrival order.
//!
//! ## Design Principles
//! 1. **FIFO Only**: The n-th top-level value resolves the n-th queued request.
//! 2. **One Cursor**: A single optional decode cursor survives across reads,
//!    so a reply split over many packets is resumed in place.
//! 3. **Exactly Once**: Each `PendingRequest` is consumed when completed or
//!    failed; it cannot be resolved twice.

use std::collections::VecDeque;

use bytes::Buf;
use redisun_common::{Decoder, ProtocolError, ProtocolResult, RespValue};
use tokio::sync::oneshot;

use crate::error::{ClientError, ClientResult};

/// Receiving half of a request's completion handle.
pub type ResponseReceiver = oneshot::Receiver<ClientResult<RespValue>>;

/// A submitted command waiting for its reply.
#[derive(Debug)]
pub struct PendingRequest {
    tx: oneshot::Sender<ClientResult<RespValue>>,
}

impl PendingRequest {
    /// Creates a request and the receiver the caller awaits.
    pub fn new() -> (Self, ResponseReceiver) {
        let (tx, rx) = oneshot::channel();
        (PendingRequest { tx }, rx)
    }

    /// Resolves the request. A dropped receiver means the caller gave up.
    pub fn complete(self, result: ClientResult<RespValue>) {
        let _ = self.tx.send(result);
    }
}

/// Per-connection decode cursor plus the queue of unanswered requests.
#[derive(Debug, Default)]
pub struct Session {
    decoder: Decoder,
    pending: VecDeque<PendingRequest>,
}

impl Session {
    pub fn new() -> Self {
        Session::default()
    }

    /// Queues a request behind everything already written.
    pub fn submit(&mut self, request: PendingRequest) {
        self.pending.push_back(request);
    }

    /// Number of requests still waiting for a reply.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// True while a reply is partially decoded.
    pub fn is_decoding(&self) -> bool {
        !self.decoder.is_idle()
    }

    /// Pops the oldest request for `value`.
    ///
    /// A top-level simple error becomes `ClientError::Server` for that request
    /// only. A value with nothing queued means the stream is out of step.
    fn pair(
        &mut self,
        value: RespValue,
    ) -> ProtocolResult<(PendingRequest, ClientResult<RespValue>)> {
        let request = self.pending.pop_front().ok_or(ProtocolError::Unsolicited)?;
        let result = match value {
            RespValue::SimpleError(message) => Err(ClientError::Server(message)),
            other => Ok(other),
        };
        Ok((request, result))
    }

    /// Decodes the next complete reply in `src` and pairs it with the oldest
    /// request, leaving the caller to resolve it.
    ///
    /// Partial trailing bytes are consumed into the cursor.
    pub fn next_reply<B: Buf>(
        &mut self,
        src: &mut B,
    ) -> ProtocolResult<Option<(PendingRequest, ClientResult<RespValue>)>> {
        match self.decoder.decode(src)? {
            Some(value) => self.pair(value).map(Some),
            None => Ok(None),
        }
    }

    /// Decodes as many complete values as `src` holds and resolves their
    /// requests in order. Returns how many requests were resolved.
    pub fn feed<B: Buf>(&mut self, src: &mut B) -> ProtocolResult<usize> {
        let mut completed = 0;
        while let Some((request, result)) = self.next_reply(src)? {
            request.complete(result);
            completed += 1;
        }
        Ok(completed)
    }

    /// Fails every queued request with `err` and resets the cursor.
    /// Returns how many requests were failed.
    pub fn fail_all(&mut self, err: &ClientError) -> usize {
        self.decoder = Decoder::new();
        let failed = self.pending.len();
        for request in self.pending.drain(..) {
            request.complete(Err(err.clone()));
        }
        failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn submit(session: &mut Session) -> ResponseReceiver {
        let (request, rx) = PendingRequest::new();
        session.submit(request);
        rx
    }

    #[test]
    fn replies_resolve_in_submission_order() {
        let mut session = Session::new();
        let first = submit(&mut session);
        let second = submit(&mut session);
        let third = submit(&mut session);

        let mut wire: &[u8] = b"+OK\r\n$3\r\nbar\r\n:7\r\n";
        assert_eq!(session.feed(&mut wire).unwrap(), 3);
        assert_eq!(session.pending(), 0);

        assert_eq!(first.blocking_recv().unwrap().unwrap(), RespValue::simple("OK"));
        assert_eq!(
            second.blocking_recv().unwrap().unwrap(),
            RespValue::BulkString(Bytes::from_static(b"bar"))
        );
        assert_eq!(third.blocking_recv().unwrap().unwrap(), RespValue::Integer(7));
    }

    #[test]
    fn nested_reply_spanning_reads() {
        let mut session = Session::new();
        let first = submit(&mut session);
        let second = submit(&mut session);

        let wire = b"*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n:1\r\n";
        for chunk in wire.chunks(3) {
            let mut chunk: &[u8] = chunk;
            session.feed(&mut chunk).unwrap();
            assert!(chunk.is_empty());
        }
        assert!(!session.is_decoding());
        assert_eq!(
            first.blocking_recv().unwrap().unwrap(),
            RespValue::Array(vec![RespValue::bulk("foo"), RespValue::bulk("bar")])
        );
        assert_eq!(second.blocking_recv().unwrap().unwrap(), RespValue::Integer(1));
    }

    #[test]
    fn server_error_is_local_to_one_request() {
        let mut session = Session::new();
        let first = submit(&mut session);
        let second = submit(&mut session);

        let mut wire: &[u8] = b"-ERR wrong\r\n+OK\r\n";
        session.feed(&mut wire).unwrap();
        assert!(matches!(
            first.blocking_recv().unwrap(),
            Err(ClientError::Server(message)) if message == "ERR wrong"
        ));
        assert_eq!(second.blocking_recv().unwrap().unwrap(), RespValue::simple("OK"));
    }

    #[test]
    fn nested_error_stays_a_value() {
        let mut session = Session::new();
        let rx = submit(&mut session);
        let mut wire: &[u8] = b"*1\r\n-ERR inner\r\n";
        session.feed(&mut wire).unwrap();
        assert_eq!(
            rx.blocking_recv().unwrap().unwrap(),
            RespValue::Array(vec![RespValue::SimpleError("ERR inner".into())])
        );
    }

    #[test]
    fn unsolicited_value_is_a_protocol_error() {
        let mut session = Session::new();
        let mut wire: &[u8] = b"+OK\r\n";
        assert_eq!(session.feed(&mut wire), Err(ProtocolError::Unsolicited));
    }

    #[test]
    fn fail_all_drains_queue() {
        let mut session = Session::new();
        let first = submit(&mut session);
        let second = submit(&mut session);
        let mut partial: &[u8] = b"$10\r\nabc";
        session.feed(&mut partial).unwrap();
        assert!(session.is_decoding());

        assert_eq!(session.fail_all(&ClientError::ConnectionClosed), 2);
        assert!(!session.is_decoding());
        assert!(matches!(first.blocking_recv().unwrap(), Err(ClientError::ConnectionClosed)));
        assert!(matches!(second.blocking_recv().unwrap(), Err(ClientError::ConnectionClosed)));
    }

    #[test]
    fn dropped_receiver_does_not_stall_the_queue() {
        let mut session = Session::new();
        drop(submit(&mut session));
        let second = submit(&mut session);
        let mut wire: &[u8] = b":1\r\n:2\r\n";
        assert_eq!(session.feed(&mut wire).unwrap(), 2);
        assert_eq!(second.blocking_recv().unwrap().unwrap(), RespValue::Integer(2));
    }
}
