//! RPC multiplexer (C2): bidirectional request/response correlation over
//! the duplex frame stream.
//!
//! Per `spec.md` §9's open question, request ids are drawn from a
//! monotonic per-sender counter rather than the reference implementation's
//! random draw, to avoid collisions with a still-outstanding call.

use electric_protocol::message::{RpcMethod, RpcResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;
use tokio::sync::oneshot;

/// Monotonic per-connection, per-direction request id generator.
#[derive(Debug, Default)]
pub struct RequestIdGen(AtomicU32);

impl RequestIdGen {
    pub fn new() -> Self {
        RequestIdGen(AtomicU32::new(1))
    }

    pub fn next(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("duplicate outstanding request for {0} id {1}")]
    DuplicateRequest(RpcMethod, u32),
}

/// Why a pending call's future resolved without a matching `RpcResponse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCallError {
    /// The connection was torn down while the call was outstanding
    /// (`spec.md` §5: "all pending RPCs fail with Closed").
    Closed,
}

type PendingOutbound = oneshot::Sender<Result<RpcResult, RpcCallError>>;

/// Tracks this connection's outstanding calls in both directions.
///
/// - `outbound`: requests *we* sent, awaiting the peer's response.
/// - `inbound_inflight`: requests the *peer* sent that we have not yet
///   responded to, so a second request reusing the same key is rejected.
#[derive(Default)]
pub struct RpcMultiplexer {
    ids: RequestIdGen,
    outbound: HashMap<(RpcMethod, u32), PendingOutbound>,
    inbound_inflight: HashSet<(RpcMethod, u32)>,
}

impl RpcMultiplexer {
    pub fn new() -> Self {
        Self {
            ids: RequestIdGen::new(),
            outbound: HashMap::new(),
            inbound_inflight: HashSet::new(),
        }
    }

    pub fn next_request_id(&self) -> u32 {
        self.ids.next()
    }

    /// Register an outbound call before sending its `RpcRequest` frame.
    pub fn begin_call(
        &mut self,
        method: RpcMethod,
        request_id: u32,
    ) -> Result<oneshot::Receiver<Result<RpcResult, RpcCallError>>, RpcError> {
        let key = (method, request_id);
        if self.outbound.contains_key(&key) {
            return Err(RpcError::DuplicateRequest(method, request_id));
        }
        let (tx, rx) = oneshot::channel();
        self.outbound.insert(key, tx);
        Ok(rx)
    }

    /// Route an `RpcResponse` to its waiting call. Returns `false` if no
    /// call is outstanding for `(method, request_id)` -- the caller should
    /// log and drop it (`spec.md` §4.2).
    pub fn complete_call(&mut self, method: RpcMethod, request_id: u32, result: RpcResult) -> bool {
        match self.outbound.remove(&(method, request_id)) {
            Some(tx) => {
                let _ = tx.send(Ok(result));
                true
            }
            None => false,
        }
    }

    /// Register an inbound request before handling it. A duplicate key
    /// before the first is answered is `InvalidRequest` (`spec.md` §4.2).
    pub fn begin_inbound(&mut self, method: RpcMethod, request_id: u32) -> Result<(), RpcError> {
        if !self.inbound_inflight.insert((method, request_id)) {
            return Err(RpcError::DuplicateRequest(method, request_id));
        }
        Ok(())
    }

    pub fn end_inbound(&mut self, method: RpcMethod, request_id: u32) {
        self.inbound_inflight.remove(&(method, request_id));
    }

    /// Fail every outstanding outbound call with `Closed` (transport
    /// disconnect or fatal protocol violation).
    pub fn cancel_all(&mut self) {
        for (_, tx) in self.outbound.drain() {
            let _ = tx.send(Err(RpcCallError::Closed));
        }
    }

    pub fn outstanding_count(&self) -> usize {
        self.outbound.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_monotonic_per_generator() {
        let gen = RequestIdGen::new();
        assert_eq!(gen.next(), 1);
        assert_eq!(gen.next(), 2);
        assert_eq!(gen.next(), 3);
    }

    #[tokio::test]
    async fn complete_call_routes_to_the_matching_waiter_only() {
        let mut mux = RpcMultiplexer::new();
        let rx = mux
            .begin_call(RpcMethod::Authenticate, 1)
            .expect("first call registers");

        // An unmatched response for a different id is dropped, not routed.
        assert!(!mux.complete_call(RpcMethod::Authenticate, 2, RpcResult::Ok(vec![])));

        assert!(mux.complete_call(RpcMethod::Authenticate, 1, RpcResult::Ok(vec![9])));
        let result = rx.await.unwrap().unwrap();
        assert_eq!(result, RpcResult::Ok(vec![9]));
    }

    #[test]
    fn duplicate_outbound_request_id_before_response_is_rejected() {
        let mut mux = RpcMultiplexer::new();
        mux.begin_call(RpcMethod::Subscribe, 5).unwrap();
        let err = mux.begin_call(RpcMethod::Subscribe, 5).unwrap_err();
        assert_eq!(err, RpcError::DuplicateRequest(RpcMethod::Subscribe, 5));
    }

    #[test]
    fn duplicate_inbound_request_before_reply_is_rejected() {
        let mut mux = RpcMultiplexer::new();
        mux.begin_inbound(RpcMethod::Subscribe, 5).unwrap();
        let err = mux.begin_inbound(RpcMethod::Subscribe, 5).unwrap_err();
        assert_eq!(err, RpcError::DuplicateRequest(RpcMethod::Subscribe, 5));
        mux.end_inbound(RpcMethod::Subscribe, 5);
        // Now that the first was answered, the id can be reused.
        assert!(mux.begin_inbound(RpcMethod::Subscribe, 5).is_ok());
    }

    #[tokio::test]
    async fn cancel_all_fails_every_outstanding_call_with_closed() {
        let mut mux = RpcMultiplexer::new();
        let rx1 = mux.begin_call(RpcMethod::StartReplication, 1).unwrap();
        let rx2 = mux.begin_call(RpcMethod::StopReplication, 2).unwrap();
        mux.cancel_all();
        assert_eq!(rx1.await.unwrap(), Err(RpcCallError::Closed));
        assert_eq!(rx2.await.unwrap(), Err(RpcCallError::Closed));
        assert_eq!(mux.outstanding_count(), 0);
    }
}
