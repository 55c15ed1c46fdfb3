//! Connection state machine (C9): wires the RPC multiplexer, relation
//! registries, transaction (de)serializers, subscription manager and
//! replication cursor into the single object a transport loop drives
//! (`spec.md` §4.9).

use std::sync::Arc;

use electric_protocol::codec;
use electric_protocol::error::ErrorCode;
use electric_protocol::frame::{Frame, FrameType};
use electric_protocol::message::{
    AuthReq, AuthResp, OpInsert, OpLogMessage, RpcMethod, RpcRequest, RpcResponse, RpcResult,
    SatTransOp, ShapeDataBegin, ShapeDataEnd, StartReplicationReq, StartReplicationResp,
    StopReplicationReq, StopReplicationResp, SubsDataBegin, SubsDataEnd, SubsDataError,
    SubscribeReq, SubscribeResp, UnsubscribeReq, UnsubscribeResp,
};
use electric_protocol::relation::RelationMessage;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::collaborators::{AuthOutcome, AuthVerifier, MigrationTranslator, SchemaCache, SubscriptionDataSource, WalSource};
use crate::cursor::ReplicationCursor;
use crate::deserializer::{ProtocolViolation, TransactionDeserializer};
use crate::relation_registry::RelationRegistry;
use crate::rpc::{RpcCallError, RpcError, RpcMultiplexer};
use crate::serializer::{self, SerializeError};
use crate::subscription::{DeliverOutcome, SubscribeOutcome, SubscriptionManager};

/// `electric.<major>.<minor>` subprotocol negotiation (`spec.md` §4.9).
pub const SUPPORTED_PROTOCOL_MAJOR: u32 = 1;
pub const SUPPORTED_PROTOCOL_MINOR: u32 = 0;

pub fn negotiate_protocol(offered: &[String]) -> Result<String, ErrorCode> {
    let wanted = format!("electric.{SUPPORTED_PROTOCOL_MAJOR}.{SUPPORTED_PROTOCOL_MINOR}");
    if offered.iter().any(|p| p == &wanted) {
        Ok(wanted)
    } else {
        Err(ErrorCode::ProtoVsnMismatch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicatingSubState {
    Live,
    DeliveringSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Authenticated,
    Replicating(ReplicatingSubState),
    Closed,
}

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("fatal protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
    #[error("malformed frame payload: {0}")]
    Codec(#[from] codec::CodecError),
    #[error("serialization failure: {0}")]
    Serialize(#[from] SerializeError),
    #[error("{0} was called before authentication")]
    AuthRequired(RpcMethod),
    #[error("outbound rpc bookkeeping error: {0}")]
    Rpc(#[from] RpcError),
}

/// The collaborators an `electric-server` binary supplies; held behind
/// `Arc` since they're shared across every connection.
#[derive(Clone)]
pub struct Collaborators {
    pub auth: Arc<dyn AuthVerifier>,
    pub wal: Arc<dyn WalSource>,
    pub schema_cache: Arc<dyn SchemaCache>,
    pub translator: Arc<dyn MigrationTranslator>,
    pub subscription_data: Arc<dyn SubscriptionDataSource>,
}

pub struct Connection {
    state: ConnectionState,
    collaborators: Collaborators,
    rpc: RpcMultiplexer,
    outbound_registry: RelationRegistry,
    inbound_registry: RelationRegistry,
    deserializer: TransactionDeserializer,
    subscriptions: SubscriptionManager,
    cursor: ReplicationCursor,
    client_id: Option<String>,
}

impl Connection {
    pub fn new(collaborators: Collaborators) -> Self {
        Self {
            state: ConnectionState::Connected,
            collaborators,
            rpc: RpcMultiplexer::new(),
            outbound_registry: RelationRegistry::new(),
            inbound_registry: RelationRegistry::new(),
            deserializer: TransactionDeserializer::new(),
            subscriptions: SubscriptionManager::new(),
            cursor: ReplicationCursor::new(),
            client_id: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    fn require_authenticated(&self, method: RpcMethod) -> Result<(), ConnectionError> {
        match self.state {
            ConnectionState::Connected => Err(ConnectionError::AuthRequired(method)),
            _ => Ok(()),
        }
    }

    /// Dispatch one inbound frame, returning whatever frames should be
    /// written back to the peer. A fatal protocol violation (bad framing,
    /// decode failure) closes the connection and should be surfaced to the
    /// transport as a hard disconnect after any frames already queued are
    /// flushed.
    pub async fn handle_inbound(&mut self, frame: Frame) -> Result<Vec<Frame>, ConnectionError> {
        match frame.kind {
            FrameType::RpcRequest => {
                let req: RpcRequest = codec::decode(&frame.payload)?;
                self.handle_rpc_request(req).await
            }
            FrameType::RpcResponse => {
                let resp: RpcResponse = codec::decode(&frame.payload)?;
                if !self.rpc.complete_call(resp.method, resp.request_id, resp.result) {
                    debug!(method = %resp.method, request_id = resp.request_id, "rpc response for no outstanding call");
                }
                Ok(Vec::new())
            }
            FrameType::OpLog => self.handle_oplog(&frame.payload).await,
            FrameType::Relation => {
                let msg: RelationMessage = codec::decode(&frame.payload)?;
                self.inbound_registry
                    .observe(msg.relation_id, msg.relation.identity.clone(), msg.relation.columns.clone());
                Ok(Vec::new())
            }
            other => {
                debug!(?other, "ignoring frame kind not expected inbound");
                Ok(Vec::new())
            }
        }
    }

    /// Initiate an outbound `startReplication` call, asking the peer to
    /// emit its op-log to us (`spec.md` §4.2: the direction in which
    /// `startReplication` is fulfilled depends on which side is being
    /// asked to replicate). Returns the frame to send plus a receiver
    /// that resolves once the peer's `RpcResponse` arrives.
    pub fn call_start_replication(
        &mut self,
        req: StartReplicationReq,
    ) -> Result<(Frame, oneshot::Receiver<Result<RpcResult, RpcCallError>>), ConnectionError> {
        self.begin_outbound_call(RpcMethod::StartReplication, codec::encode(&req))
    }

    pub fn call_stop_replication(
        &mut self,
    ) -> Result<(Frame, oneshot::Receiver<Result<RpcResult, RpcCallError>>), ConnectionError> {
        self.begin_outbound_call(RpcMethod::StopReplication, codec::encode(&StopReplicationReq))
    }

    fn begin_outbound_call(
        &mut self,
        method: RpcMethod,
        payload: Vec<u8>,
    ) -> Result<(Frame, oneshot::Receiver<Result<RpcResult, RpcCallError>>), ConnectionError> {
        let request_id = self.rpc.next_request_id();
        let rx = self.rpc.begin_call(method, request_id)?;
        let frame = Frame::new(FrameType::RpcRequest, codec::encode(&RpcRequest { method, request_id, payload }));
        Ok((frame, rx))
    }

    /// Pull and serialize the next transaction from the WAL source while
    /// live replication is active; a no-op in any other state. Meant to be
    /// driven as its own branch of the transport's `tokio::select!` loop,
    /// alongside inbound frame handling, since nothing else calls it.
    pub async fn poll_replication(&mut self) -> Result<Vec<Frame>, ConnectionError> {
        if self.state != ConnectionState::Replicating(ReplicatingSubState::Live) {
            return Ok(Vec::new());
        }
        let from = self
            .cursor
            .current_lsn()
            .cloned()
            .unwrap_or_else(|| self.collaborators.wal.current_position());
        let Some(tx) = self.collaborators.wal.next_transaction(&from).await else {
            return Ok(Vec::new());
        };
        self.cursor.advance(tx.lsn.clone());
        let frames = serializer::serialize_transaction(
            &tx,
            &mut self.outbound_registry,
            &*self.collaborators.schema_cache,
            &*self.collaborators.translator,
        )
        .await?;
        Ok(frames)
    }

    async fn handle_rpc_request(&mut self, req: RpcRequest) -> Result<Vec<Frame>, ConnectionError> {
        let result = if self.rpc.begin_inbound(req.method, req.request_id).is_err() {
            Err(ErrorCode::InvalidRequest)
        } else {
            let result = match req.method {
                RpcMethod::Authenticate => self.handle_authenticate(&req.payload).await,
                RpcMethod::StartReplication => self.handle_start_replication(&req.payload).await,
                RpcMethod::StopReplication => self.handle_stop_replication(&req.payload),
                RpcMethod::Subscribe => self.handle_subscribe(&req.payload).await,
                RpcMethod::Unsubscribe => self.handle_unsubscribe(&req.payload),
            };
            self.rpc.end_inbound(req.method, req.request_id);
            result
        };

        let subscribed_id = match (req.method, &result) {
            (RpcMethod::Subscribe, Ok(RpcResult::Ok(bytes))) => match codec::decode::<SubscribeResp>(bytes) {
                Ok(SubscribeResp::Ack { subscription_id }) => Some(subscription_id),
                _ => None,
            },
            _ => None,
        };

        let mut frames = vec![Frame::new(
            FrameType::RpcResponse,
            codec::encode(&RpcResponse {
                method: req.method,
                request_id: req.request_id,
                result: result.unwrap_or_else(RpcResult::Err),
            }),
        )];

        if let Some(subscription_id) = subscribed_id {
            frames.extend(self.deliver_snapshot_frames(&subscription_id).await?);
        }

        Ok(frames)
    }

    /// Pulls the initial snapshot for a just-acked subscription and frames
    /// it per `spec.md` §4.7: `SubsDataBegin`, then per shape
    /// `ShapeDataBegin`/rows/`ShapeDataEnd`, then `SubsDataEnd` -- or a
    /// single `SubsDataError` if the pull fails.
    async fn deliver_snapshot_frames(&mut self, subscription_id: &str) -> Result<Vec<Frame>, ConnectionError> {
        let Some(outcome) = self
            .subscriptions
            .deliver_snapshot(subscription_id, &*self.collaborators.subscription_data)
            .await
        else {
            return Ok(Vec::new());
        };

        match outcome {
            DeliverOutcome::Delivered { batches } => {
                let lsn = self
                    .subscriptions
                    .get(subscription_id)
                    .and_then(|sub| sub.established_at_lsn.clone())
                    .unwrap_or_else(|| self.collaborators.wal.current_position());
                let mut frames = vec![Frame::new(
                    FrameType::SubsDataBegin,
                    codec::encode(&SubsDataBegin { subscription_id: subscription_id.to_string(), lsn }),
                )];
                for batch in &batches {
                    frames.push(Frame::new(
                        FrameType::ShapeDataBegin,
                        codec::encode(&ShapeDataBegin { request_id: batch.request_id.clone(), uuid: batch.uuid.clone() }),
                    ));
                    let mut ops = Vec::with_capacity(batch.rows.len());
                    for (relation, row) in &batch.rows {
                        let canonical_id = self
                            .collaborators
                            .schema_cache
                            .canonical_relation_id(&relation.identity)
                            .await
                            .ok_or_else(|| SerializeError::UnknownRelation(relation.identity.clone()))?;
                        let resolution = self.outbound_registry.resolve(relation, canonical_id);
                        if resolution.is_new {
                            frames.push(Frame::new(
                                FrameType::Relation,
                                codec::encode(&RelationMessage { relation_id: resolution.relation_id, relation: relation.clone() }),
                            ));
                        }
                        ops.push(SatTransOp::Insert(OpInsert {
                            relation_id: resolution.relation_id,
                            row: row.clone(),
                            tags: Vec::new(),
                        }));
                    }
                    if !ops.is_empty() {
                        frames.push(Frame::new(FrameType::OpLog, codec::encode(&OpLogMessage { ops })));
                    }
                    frames.push(Frame::new(FrameType::ShapeDataEnd, codec::encode(&ShapeDataEnd)));
                }
                frames.push(Frame::new(FrameType::SubsDataEnd, codec::encode(&SubsDataEnd)));
                Ok(frames)
            }
            DeliverOutcome::Failed(shape_request_errors) => Ok(vec![Frame::new(
                FrameType::SubsDataError,
                codec::encode(&SubsDataError {
                    code: ErrorCode::ShapeDeliveryError,
                    subscription_id: subscription_id.to_string(),
                    shape_request_errors,
                }),
            )]),
        }
    }

    async fn handle_authenticate(&mut self, payload: &[u8]) -> Result<RpcResult, ErrorCode> {
        let req: AuthReq = codec::decode(payload).map_err(|_| ErrorCode::InvalidRequest)?;
        match self.collaborators.auth.verify(&req.id, &req.token, &req.headers).await {
            AuthOutcome::Ok { identity } => {
                self.client_id = Some(identity);
                self.state = ConnectionState::Authenticated;
                info!(client = %req.id, "authenticated");
                Ok(RpcResult::Ok(codec::encode(&AuthResp { id: req.id })))
            }
            AuthOutcome::AuthFailed => Err(ErrorCode::AuthFailed),
            AuthOutcome::InvalidCredentials => Err(ErrorCode::AuthFailed),
        }
    }

    async fn handle_start_replication(&mut self, payload: &[u8]) -> Result<RpcResult, ErrorCode> {
        self.require_authenticated(RpcMethod::StartReplication)
            .map_err(|_| ErrorCode::AuthRequired)?;
        let req: StartReplicationReq = codec::decode(payload).map_err(|_| ErrorCode::InvalidRequest)?;
        let outcome = self
            .cursor
            .start_replication(
                req.lsn,
                &req.subscription_ids,
                req.schema_version.as_deref(),
                &*self.collaborators.wal,
                &*self.collaborators.schema_cache,
                &self.subscriptions,
            )
            .await;
        match outcome {
            Ok(()) => {
                self.state = ConnectionState::Replicating(ReplicatingSubState::Live);
                Ok(RpcResult::Ok(codec::encode(&StartReplicationResp { err: None })))
            }
            Err(code) => Ok(RpcResult::Ok(codec::encode(&StartReplicationResp { err: Some(code) }))),
        }
    }

    fn handle_stop_replication(&mut self, payload: &[u8]) -> Result<RpcResult, ErrorCode> {
        let _req: StopReplicationReq = codec::decode(payload).map_err(|_| ErrorCode::InvalidRequest)?;
        self.cursor.stop_replication();
        self.state = ConnectionState::Authenticated;
        Ok(RpcResult::Ok(codec::encode(&StopReplicationResp)))
    }

    async fn handle_subscribe(&mut self, payload: &[u8]) -> Result<RpcResult, ErrorCode> {
        self.require_authenticated(RpcMethod::Subscribe)
            .map_err(|_| ErrorCode::AuthRequired)?;
        let req: SubscribeReq = codec::decode(payload).map_err(|_| ErrorCode::InvalidRequest)?;
        // Table-name validation is a lookup against the schema cache's
        // warm, in-memory electrified-table set, so it stays synchronous
        // even though the cache's other methods are async (SPEC_FULL.md
        // §D). `electric-server`'s concrete `SchemaCache` keeps that set
        // behind an `ArcSwap` for exactly this reason.
        let electrified: std::collections::HashSet<String> = self
            .collaborators
            .schema_cache
            .electrified_tables()
            .await
            .into_iter()
            .map(|identity| identity.table_name)
            .collect();
        let known = |table: &str| electrified.contains(table);
        let outcome = self.subscriptions.subscribe(req.subscription_id, req.shape_requests, &known);
        let resp = match outcome {
            SubscribeOutcome::Ack { subscription_id } => SubscribeResp::Ack { subscription_id },
            SubscribeOutcome::DuplicateId => SubscribeResp::DuplicateId,
            SubscribeOutcome::ShapeRequestError(errors) => SubscribeResp::ShapeRequestError(errors),
        };
        Ok(RpcResult::Ok(codec::encode(&resp)))
    }

    fn handle_unsubscribe(&mut self, payload: &[u8]) -> Result<RpcResult, ErrorCode> {
        let req: UnsubscribeReq = codec::decode(payload).map_err(|_| ErrorCode::InvalidRequest)?;
        self.subscriptions.unsubscribe(&req.subscription_ids);
        Ok(RpcResult::Ok(codec::encode(&UnsubscribeResp)))
    }

    async fn handle_oplog(&mut self, payload: &[u8]) -> Result<Vec<Frame>, ConnectionError> {
        let msg: OpLogMessage = codec::decode(payload)?;
        let mut out = Vec::new();
        for op in msg.ops {
            let registry = &self.inbound_registry;
            let decode_change = |op: SatTransOp| decode_inbound_op(op, registry);
            if let Some(tx) = self.deserializer.feed(op, decode_change)? {
                let frames = serializer::serialize_transaction(
                    &tx,
                    &mut self.outbound_registry,
                    &*self.collaborators.schema_cache,
                    &*self.collaborators.translator,
                )
                .await?;
                out.extend(frames);
            }
        }
        Ok(out)
    }

    pub fn close(&mut self) {
        self.rpc.cancel_all();
        self.state = ConnectionState::Closed;
        warn!("connection closed, pending RPCs failed");
    }
}

fn decode_inbound_op(
    op: SatTransOp,
    registry: &RelationRegistry,
) -> Result<crate::txn::Change, ProtocolViolation> {
    use crate::txn::{CapturedDdl, Change};
    use electric_protocol::row;

    match op {
        SatTransOp::Insert(ins) => {
            let columns = registry
                .columns_for_id(ins.relation_id)
                .ok_or(ProtocolViolation::UnknownRelationId(ins.relation_id))?;
            let new = row::decode(&ins.row, columns).map_err(|e| ProtocolViolation::InvalidRow(e.to_string()))?;
            Ok(Change::Insert {
                relation: identity_for(registry, ins.relation_id)?,
                new,
                tags: ins.tags,
            })
        }
        SatTransOp::Update(upd) => {
            let columns = registry
                .columns_for_id(upd.relation_id)
                .ok_or(ProtocolViolation::UnknownRelationId(upd.relation_id))?;
            let new = row::decode(&upd.row, columns).map_err(|e| ProtocolViolation::InvalidRow(e.to_string()))?;
            let old = match upd.old_row {
                Some(r) => Some(row::decode(&r, columns).map_err(|e| ProtocolViolation::InvalidRow(e.to_string()))?),
                None => None,
            };
            Ok(Change::Update {
                relation: identity_for(registry, upd.relation_id)?,
                old,
                new,
                tags: upd.tags,
            })
        }
        SatTransOp::Delete(del) => {
            let columns = registry
                .columns_for_id(del.relation_id)
                .ok_or(ProtocolViolation::UnknownRelationId(del.relation_id))?;
            let old = match del.old_row {
                Some(r) => Some(row::decode(&r, columns).map_err(|e| ProtocolViolation::InvalidRow(e.to_string()))?),
                None => None,
            };
            Ok(Change::Delete {
                relation: identity_for(registry, del.relation_id)?,
                old,
                tags: del.tags,
            })
        }
        SatTransOp::Migrate(mig) => Ok(Change::Migrate(CapturedDdl {
            version: mig.version,
            sql: mig.stmts.into_iter().map(|s| s.sql).collect::<Vec<_>>().join(";\n"),
        })),
        SatTransOp::Begin(_) | SatTransOp::Commit(_) => {
            unreachable!("Begin/Commit are consumed by the deserializer's framing, never decoded as a Change")
        }
    }
}

fn identity_for(
    registry: &RelationRegistry,
    relation_id: u32,
) -> Result<electric_protocol::relation::RelationIdentity, ProtocolViolation> {
    registry
        .identity_for_id(relation_id)
        .ok_or(ProtocolViolation::UnknownRelationId(relation_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_protocol_accepts_the_supported_version() {
        let offered = vec!["electric.1.0".to_string(), "electric.2.0".to_string()];
        assert_eq!(negotiate_protocol(&offered).unwrap(), "electric.1.0");
    }

    #[test]
    fn negotiate_protocol_rejects_unknown_versions() {
        let offered = vec!["electric.9.9".to_string()];
        assert_eq!(negotiate_protocol(&offered).unwrap_err(), ErrorCode::ProtoVsnMismatch);
    }
}
