//! Non-blocking half of the session layer.
//!
//! `AsyncSession` owns the transport and codec, hands out request ids, tracks
//! outstanding calls, and reads one frame at a time. Responses are routed to
//! their pending slot here; inbound requests and notifications are handed back
//! to the caller (the session host) so they can be dispatched synchronously
//! before the loop resumes.
//!
//! Any transport or codec failure is fatal: the session stops and every
//! outstanding call is resolved with `ConnectionClosed`.

use super::codec::{Frame, MessageCodec};
use super::transport::Transport;
use crate::config::{RpcConfig, SessionConfig};
use crate::{NvimError, Result};
use rmpv::Value;
use std::collections::{BTreeSet, HashMap};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Traffic from the peer that the host must react to.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A response was routed to pending call `id`.
    Response { id: u64 },
    /// The peer wants an answer; reply with `send_response(id, ..)`.
    Request {
        id: u64,
        method: String,
        params: Vec<Value>,
    },
    Notification { method: String, params: Vec<Value> },
}

/// Bookkeeping for one outstanding request.
#[derive(Debug)]
struct PendingCall {
    method: String,
    outcome: Option<Result<Value>>,
}

/// Frame-level session state over a single transport.
#[derive(Debug)]
pub struct AsyncSession {
    transport: Transport,
    codec: MessageCodec,
    read_chunk_size: usize,
    next_id: u64,
    pending: HashMap<u64, PendingCall>,
    /// Ids whose waiter gave up; their late responses are dropped quietly.
    abandoned: BTreeSet<u64>,
    max_abandoned: usize,
    /// Set once the session has failed; every later operation reports it.
    closed: Option<NvimError>,
}

impl AsyncSession {
    /// Create a session over `transport`.
    pub fn new(transport: Transport, config: &SessionConfig) -> Self {
        debug!("Opening RPC session over {}", transport.description());
        Self {
            transport,
            codec: MessageCodec::new(config.max_frame_size),
            read_chunk_size: config.read_chunk_size,
            next_id: RpcConfig::FIRST_REQUEST_ID,
            pending: HashMap::new(),
            abandoned: BTreeSet::new(),
            max_abandoned: config.max_abandoned_ids,
            closed: None,
        }
    }

    /// Whether the transport is still usable.
    pub fn is_running(&self) -> bool {
        self.closed.is_none()
    }

    /// Ids of calls still awaiting a response, in ascending order.
    pub fn outstanding(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, call)| call.outcome.is_none())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Method name of a pending call, for error reporting.
    pub fn pending_method(&self, id: u64) -> Option<&str> {
        self.pending.get(&id).map(|call| call.method.as_str())
    }

    /// Send a request and register its pending slot. Returns immediately.
    pub async fn send_request(&mut self, method: &str, params: Vec<Value>) -> Result<u64> {
        self.ensure_running()?;

        let id = self.next_id;
        self.next_id += 1;

        debug!("-> request {} {} ({} params)", id, method, params.len());
        self.write_frame(Frame::Request {
            id,
            method: method.to_string(),
            params,
        })
        .await?;

        self.pending.insert(
            id,
            PendingCall {
                method: method.to_string(),
                outcome: None,
            },
        );
        Ok(id)
    }

    /// Answer a request the peer sent us.
    pub async fn send_response(
        &mut self,
        id: u64,
        result: std::result::Result<Value, Value>,
    ) -> Result<()> {
        self.ensure_running()?;
        debug!("-> response {} ({})", id, if result.is_ok() { "ok" } else { "error" });
        self.write_frame(Frame::Response { id, result }).await
    }

    /// Fire-and-forget notification.
    pub async fn send_notification(&mut self, method: &str, params: Vec<Value>) -> Result<()> {
        self.ensure_running()?;
        debug!("-> notification {}", method);
        self.write_frame(Frame::Notification {
            method: method.to_string(),
            params,
        })
        .await
    }

    /// Take the outcome of call `id` if its response has arrived.
    ///
    /// Removes the pending entry; returns `None` while still outstanding.
    pub fn take_outcome(&mut self, id: u64) -> Option<Result<Value>> {
        match self.pending.get(&id) {
            Some(call) if call.outcome.is_some() => {
                self.pending.remove(&id).and_then(|call| call.outcome)
            }
            _ => None,
        }
    }

    /// Stop waiting for call `id`; a response that arrives later is discarded.
    pub fn abandon(&mut self, id: u64) {
        if self.pending.remove(&id).is_some() {
            debug!("Abandoning request {}", id);
            self.abandoned.insert(id);
            while self.abandoned.len() > self.max_abandoned {
                if let Some(oldest) = self.abandoned.pop_first() {
                    trace!("Forgetting abandoned request {}", oldest);
                }
            }
        }
    }

    /// Number of abandoned ids still remembered.
    pub fn abandoned_count(&self) -> usize {
        self.abandoned.len()
    }

    /// Process the next frame from the peer.
    ///
    /// Reads from the transport only when no complete frame is buffered.
    /// `Ok(None)` means the deadline has passed; nothing is decoded after
    /// that, even if frames are already buffered or keep arriving.
    pub async fn run_once(&mut self, deadline: Option<Instant>) -> Result<Option<Inbound>> {
        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(None);
            }

            match self.codec.decode() {
                Ok(Some(frame)) => return Ok(Some(self.route(frame))),
                Ok(None) => {}
                Err(err) => return Err(self.fail(err)),
            }

            self.ensure_running()?;

            let chunk = self.read_chunk_size;
            let read = self.transport.read(self.codec.read_buffer(), chunk);
            let read = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, read).await {
                    Ok(read) => read,
                    Err(_) => return Ok(None),
                },
                None => read.await,
            };

            match read {
                Ok(0) => {
                    return Err(self.fail(NvimError::ConnectionClosed {
                        reason: format!("{} reached end of stream", self.transport.description()),
                    }))
                }
                Ok(n) => trace!("<- {} bytes ({} buffered)", n, self.codec.buffered()),
                Err(err) => {
                    return Err(self.fail(NvimError::ConnectionClosed {
                        reason: format!("read from {} failed: {}", self.transport.description(), err),
                    }))
                }
            }
        }
    }

    fn route(&mut self, frame: Frame) -> Inbound {
        match frame {
            Frame::Response { id, result } => {
                debug!("<- response {} ({})", id, if result.is_ok() { "ok" } else { "error" });
                self.complete(id, result);
                Inbound::Response { id }
            }
            Frame::Request { id, method, params } => {
                debug!("<- request {} {}", id, method);
                Inbound::Request { id, method, params }
            }
            Frame::Notification { method, params } => {
                debug!("<- notification {}", method);
                Inbound::Notification { method, params }
            }
        }
    }

    fn complete(&mut self, id: u64, result: std::result::Result<Value, Value>) {
        match self.pending.get_mut(&id) {
            Some(call) if call.outcome.is_none() => {
                call.outcome = Some(result.map_err(NvimError::from_peer));
            }
            Some(call) => {
                warn!("Duplicate response for request {} ({}); dropping", id, call.method);
            }
            None if self.abandoned.remove(&id) => {
                debug!("Discarding late response for abandoned request {}", id);
            }
            None => {
                warn!("Response for unknown request id {}; dropping", id);
            }
        }
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<()> {
        let bytes = MessageCodec::encode(&frame)?;
        if let Err(err) = self.transport.write(&bytes).await {
            return Err(self.fail(NvimError::ConnectionClosed {
                reason: format!("write to {} failed: {}", self.transport.description(), err),
            }));
        }
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        match &self.closed {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Stop the session and resolve every outstanding call.
    ///
    /// Codec failures are reported to waiters as `ConnectionClosed`; the
    /// returned error keeps its original kind for the caller that hit it.
    fn fail(&mut self, err: NvimError) -> NvimError {
        let broadcast = match &err {
            NvimError::ConnectionClosed { .. } => err.clone(),
            other => NvimError::ConnectionClosed {
                reason: other.to_string(),
            },
        };

        let outstanding = self.outstanding();
        if !outstanding.is_empty() {
            warn!(
                "RPC session failed with {} outstanding request(s) {:?}: {}",
                outstanding.len(),
                outstanding,
                err
            );
        } else {
            debug!("RPC session closed: {}", err);
        }

        for call in self.pending.values_mut() {
            if call.outcome.is_none() {
                call.outcome = Some(Err(broadcast.clone()));
            }
        }
        self.abandoned.clear();
        if self.closed.is_none() {
            self.closed = Some(broadcast);
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn session() -> (AsyncSession, DuplexStream) {
        session_with(&SessionConfig::default())
    }

    fn session_with(config: &SessionConfig) -> (AsyncSession, DuplexStream) {
        let (local, remote) = tokio::io::duplex(64 * 1024);
        let session = AsyncSession::new(Transport::from_stream(local, "duplex"), config);
        (session, remote)
    }

    async fn push(remote: &mut DuplexStream, frame: Frame) {
        remote
            .write_all(&MessageCodec::encode(&frame).unwrap())
            .await
            .unwrap();
    }

    async fn pull(remote: &mut DuplexStream) -> Frame {
        let mut codec = MessageCodec::default();
        loop {
            if let Some(frame) = codec.decode().unwrap() {
                return frame;
            }
            let mut chunk = [0u8; 256];
            let n = remote.read(&mut chunk).await.unwrap();
            assert!(n > 0, "peer stream closed");
            codec.feed(&chunk[..n]);
        }
    }

    #[tokio::test]
    async fn test_request_ids_are_monotonic() {
        let (mut session, mut remote) = session();

        let first = session.send_request("nvim_eval", vec![Value::from("1")]).await.unwrap();
        let second = session.send_request("nvim_eval", vec![Value::from("2")]).await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(session.outstanding(), vec![1, 2]);

        match pull(&mut remote).await {
            Frame::Request { id, method, .. } => {
                assert_eq!(id, 1);
                assert_eq!(method, "nvim_eval");
            }
            other => panic!("Expected request, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_response_routes_to_matching_slot() {
        let (mut session, mut remote) = session();
        let a = session.send_request("a", vec![]).await.unwrap();
        let b = session.send_request("b", vec![]).await.unwrap();

        push(&mut remote, Frame::Response { id: b, result: Ok(Value::from("B")) }).await;
        push(&mut remote, Frame::Response { id: a, result: Ok(Value::from("A")) }).await;

        assert_eq!(session.run_once(None).await.unwrap(), Some(Inbound::Response { id: b }));
        assert!(session.take_outcome(a).is_none());
        assert_eq!(session.take_outcome(b).unwrap().unwrap(), Value::from("B"));

        session.run_once(None).await.unwrap();
        assert_eq!(session.take_outcome(a).unwrap().unwrap(), Value::from("A"));
        assert!(session.outstanding().is_empty());
    }

    #[tokio::test]
    async fn test_inbound_request_and_notification_are_returned() {
        let (mut session, mut remote) = session();
        push(
            &mut remote,
            Frame::Request { id: 40, method: "poll".into(), params: vec![Value::from(1)] },
        )
        .await;
        push(
            &mut remote,
            Frame::Notification { method: "redraw".into(), params: vec![] },
        )
        .await;

        assert_eq!(
            session.run_once(None).await.unwrap(),
            Some(Inbound::Request { id: 40, method: "poll".into(), params: vec![Value::from(1)] })
        );
        assert_eq!(
            session.run_once(None).await.unwrap(),
            Some(Inbound::Notification { method: "redraw".into(), params: vec![] })
        );
    }

    #[tokio::test]
    async fn test_unknown_response_id_is_dropped() {
        let (mut session, mut remote) = session();
        push(&mut remote, Frame::Response { id: 99, result: Ok(Value::Nil) }).await;

        assert_eq!(session.run_once(None).await.unwrap(), Some(Inbound::Response { id: 99 }));
        assert!(session.is_running());
    }

    #[tokio::test]
    async fn test_eof_resolves_all_outstanding_with_connection_closed() {
        let (mut session, remote) = session();
        let a = session.send_request("a", vec![]).await.unwrap();
        let b = session.send_request("b", vec![]).await.unwrap();
        drop(remote);

        let err = session.run_once(None).await.unwrap_err();
        assert!(matches!(err, NvimError::ConnectionClosed { .. }));
        assert!(!session.is_running());
        for id in [a, b] {
            assert!(matches!(
                session.take_outcome(id),
                Some(Err(NvimError::ConnectionClosed { .. }))
            ));
        }
        assert!(session.send_request("c", vec![]).await.is_err());
    }

    #[tokio::test]
    async fn test_codec_error_is_fatal() {
        let (mut session, mut remote) = session();
        let id = session.send_request("a", vec![]).await.unwrap();

        // [7, "?"] has an unknown tag
        let mut bytes = Vec::new();
        rmpv::encode::write_value(
            &mut bytes,
            &Value::Array(vec![Value::from(7), Value::from("?")]),
        )
        .unwrap();
        remote.write_all(&bytes).await.unwrap();

        let err = session.run_once(None).await.unwrap_err();
        assert!(matches!(err, NvimError::Codec { .. }));
        assert!(matches!(
            session.take_outcome(id),
            Some(Err(NvimError::ConnectionClosed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_deadline_elapses_without_consuming() {
        let (mut session, _remote) = session();
        let deadline = Instant::now() + std::time::Duration::from_millis(20);
        assert_eq!(session.run_once(Some(deadline)).await.unwrap(), None);
        assert!(session.is_running());
    }

    #[tokio::test]
    async fn test_abandoned_id_discards_late_response() {
        let (mut session, mut remote) = session();
        let id = session.send_request("slow", vec![]).await.unwrap();
        session.abandon(id);
        assert!(session.outstanding().is_empty());

        push(&mut remote, Frame::Response { id, result: Ok(Value::from(1)) }).await;
        session.run_once(None).await.unwrap();
        assert!(session.take_outcome(id).is_none());
        assert!(session.is_running());
    }

    #[tokio::test]
    async fn test_passed_deadline_leaves_buffered_frames() {
        let (mut session, mut remote) = session();
        push(&mut remote, Frame::Notification { method: "redraw".into(), params: vec![] }).await;

        assert_eq!(session.run_once(Some(Instant::now())).await.unwrap(), None);
        assert_eq!(
            session.run_once(None).await.unwrap(),
            Some(Inbound::Notification { method: "redraw".into(), params: vec![] })
        );
    }

    #[tokio::test]
    async fn test_abandoned_ids_are_bounded() {
        let (mut session, mut remote) =
            session_with(&SessionConfig::default().with_max_abandoned_ids(2));
        let mut ids = Vec::new();
        for _ in 0..4 {
            let id = session.send_request("slow", vec![]).await.unwrap();
            session.abandon(id);
            ids.push(id);
        }
        assert_eq!(session.abandoned_count(), 2);

        // The newest ids are still recognized; the oldest fall back to unknown.
        push(&mut remote, Frame::Response { id: ids[3], result: Ok(Value::Nil) }).await;
        session.run_once(None).await.unwrap();
        assert_eq!(session.abandoned_count(), 1);

        push(&mut remote, Frame::Response { id: ids[0], result: Ok(Value::Nil) }).await;
        session.run_once(None).await.unwrap();
        assert_eq!(session.abandoned_count(), 1);
        assert!(session.is_running());
    }
}
