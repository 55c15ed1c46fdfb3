//! End-to-end `Connection` scenarios from `spec.md` §8's testable
//! properties: live replication (S1), a behind-window `startReplication`
//! (S2), duplicate subscribe (S3), and snapshot delivery carrying real
//! row data. Each drives `Connection` the way `electric-server`'s
//! transport loop does: feed inbound `RpcRequest` frames through
//! `handle_inbound`, and poll `poll_replication` for the live push.

use std::sync::Arc;

use electric_core::{Collaborators, Connection, ConnectionState, ReplicatingSubState, SchemaCache};
use electric_protocol::codec;
use electric_protocol::error::ErrorCode;
use electric_protocol::frame::{Frame, FrameType};
use electric_protocol::message::{
    AuthReq, OpLogMessage, RpcMethod, RpcRequest, RpcResponse, RpcResult, SatTransOp,
    StartReplicationReq, StartReplicationResp, SubscribeReq, SubscribeResp, ShapeRequest,
    ShapeSelect,
};
use electric_protocol::relation::RelationIdentity;
use electric_protocol::Lsn;
use electric_test_support::{
    accepting_auth_verifier, empty_snapshot_source, fixed_row_snapshot_source, fixed_wal_source,
    insert_change, mock_migration_translator, mock_schema_cache, queue_wal_source,
    transaction_with_changes, MockSchemaCache,
};

/// `subscribe`'s table-name check goes through `SchemaCache::electrified_tables`,
/// which `MockSchemaCache` only starts reporting once a relation has been
/// synthesized via another lookup -- force that here so "entries" is
/// known before a test issues a `Subscribe`.
async fn schema_cache_with_entries_table() -> MockSchemaCache {
    let cache = mock_schema_cache();
    cache.relation_by_identity(&RelationIdentity::new("public", "entries")).await;
    cache
}

fn rpc_request(method: RpcMethod, request_id: u32, payload: impl serde::Serialize) -> Frame {
    Frame::new(
        FrameType::RpcRequest,
        codec::encode(&RpcRequest { method, request_id, payload: codec::encode(&payload) }),
    )
}

fn single_response(frames: &[Frame]) -> RpcResponse {
    assert_eq!(frames.len(), 1, "expected exactly one RpcResponse frame, got {}", frames.len());
    assert_eq!(frames[0].kind, FrameType::RpcResponse);
    codec::decode(&frames[0].payload).unwrap()
}

async fn authenticate(conn: &mut Connection) {
    let frames = conn
        .handle_inbound(rpc_request(RpcMethod::Authenticate, 1, AuthReq {
            id: "client-1".into(),
            token: "t".into(),
            headers: Vec::new(),
        }))
        .await
        .unwrap();
    let resp = single_response(&frames);
    assert!(matches!(resp.result, RpcResult::Ok(_)), "authenticate should succeed");
}

#[tokio::test]
async fn s1_live_insert_is_pushed_as_relation_and_oplog_frames() {
    let wal = Arc::new(queue_wal_source(vec![1], vec![0]));
    let collaborators = Collaborators {
        auth: Arc::new(accepting_auth_verifier()),
        wal: wal.clone(),
        schema_cache: Arc::new(mock_schema_cache()),
        translator: Arc::new(mock_migration_translator()),
        subscription_data: Arc::new(empty_snapshot_source(vec![1])),
    };
    let mut conn = Connection::new(collaborators);

    authenticate(&mut conn).await;

    let frames = conn
        .handle_inbound(rpc_request(RpcMethod::StartReplication, 2, StartReplicationReq {
            lsn: None,
            subscription_ids: Vec::new(),
            schema_version: None,
        }))
        .await
        .unwrap();
    let resp: StartReplicationResp = match single_response(&frames).result {
        RpcResult::Ok(bytes) => codec::decode(&bytes).unwrap(),
        RpcResult::Err(e) => panic!("startReplication failed: {e:?}"),
    };
    assert_eq!(resp.err, None);
    assert_eq!(conn.state(), ConnectionState::Replicating(ReplicatingSubState::Live));

    wal.push_transaction(transaction_with_changes(
        vec![insert_change("public", "entries", &[("id", "row-1")])],
        1_700_000_000,
        "txn-1",
        vec![2],
    ))
    .await;

    let pushed = conn.poll_replication().await.unwrap();
    let kinds: Vec<FrameType> = pushed.iter().map(|f| f.kind).collect();
    assert_eq!(kinds, vec![FrameType::Relation, FrameType::OpLog]);

    let oplog: OpLogMessage = codec::decode(&pushed[1].payload).unwrap();
    assert_eq!(oplog.ops.len(), 3, "Begin, one Insert, Commit");
    assert!(matches!(oplog.ops[0], SatTransOp::Begin(_)));
    assert!(matches!(oplog.ops[1], SatTransOp::Insert(_)));
    assert!(matches!(oplog.ops[2], SatTransOp::Commit(_)));
}

#[tokio::test]
async fn s2_start_replication_behind_retention_window_is_rejected() {
    let collaborators = Collaborators {
        auth: Arc::new(accepting_auth_verifier()),
        wal: Arc::new(fixed_wal_source(vec![10], vec![5])),
        schema_cache: Arc::new(mock_schema_cache()),
        translator: Arc::new(mock_migration_translator()),
        subscription_data: Arc::new(empty_snapshot_source(vec![10])),
    };
    let mut conn = Connection::new(collaborators);
    authenticate(&mut conn).await;

    let frames = conn
        .handle_inbound(rpc_request(RpcMethod::StartReplication, 2, StartReplicationReq {
            lsn: Some(Lsn(vec![1])),
            subscription_ids: Vec::new(),
            schema_version: None,
        }))
        .await
        .unwrap();
    let resp: StartReplicationResp = match single_response(&frames).result {
        RpcResult::Ok(bytes) => codec::decode(&bytes).unwrap(),
        RpcResult::Err(e) => panic!("unexpected RpcResult::Err({e:?})"),
    };
    assert_eq!(resp.err, Some(ErrorCode::BehindWindow));
    assert_eq!(
        conn.state(),
        ConnectionState::Authenticated,
        "a rejected startReplication must not flip the connection into Replicating"
    );
}

#[tokio::test]
async fn s3_duplicate_subscribe_id_is_rejected_without_reopening_the_first() {
    let collaborators = Collaborators {
        auth: Arc::new(accepting_auth_verifier()),
        wal: Arc::new(fixed_wal_source(vec![1], vec![0])),
        schema_cache: Arc::new(schema_cache_with_entries_table().await),
        translator: Arc::new(mock_migration_translator()),
        subscription_data: Arc::new(empty_snapshot_source(vec![1])),
    };
    let mut conn = Connection::new(collaborators);
    authenticate(&mut conn).await;

    let shape_requests = vec![ShapeRequest {
        request_id: "r1".into(),
        selects: vec![ShapeSelect { table_name: "entries".into() }],
    }];
    let first = conn
        .handle_inbound(rpc_request(RpcMethod::Subscribe, 2, SubscribeReq {
            subscription_id: "sub1".into(),
            shape_requests: shape_requests.clone(),
        }))
        .await
        .unwrap();
    let first_resp: SubscribeResp = match single_response(&first).result {
        RpcResult::Ok(bytes) => codec::decode(&bytes).unwrap(),
        RpcResult::Err(e) => panic!("unexpected RpcResult::Err({e:?})"),
    };
    assert_eq!(first_resp, SubscribeResp::Ack { subscription_id: "sub1".into() });

    let second = conn
        .handle_inbound(rpc_request(RpcMethod::Subscribe, 3, SubscribeReq {
            subscription_id: "sub1".into(),
            shape_requests,
        }))
        .await
        .unwrap();
    let second_resp: SubscribeResp = match single_response(&second).result {
        RpcResult::Ok(bytes) => codec::decode(&bytes).unwrap(),
        RpcResult::Err(e) => panic!("unexpected RpcResult::Err({e:?})"),
    };
    assert_eq!(second_resp, SubscribeResp::DuplicateId);
}

#[tokio::test]
async fn subscribe_ack_triggers_snapshot_delivery_with_real_rows() {
    let collaborators = Collaborators {
        auth: Arc::new(accepting_auth_verifier()),
        wal: Arc::new(fixed_wal_source(vec![1], vec![0])),
        schema_cache: Arc::new(schema_cache_with_entries_table().await),
        translator: Arc::new(mock_migration_translator()),
        subscription_data: Arc::new(fixed_row_snapshot_source(vec![1], "row-1")),
    };
    let mut conn = Connection::new(collaborators);
    authenticate(&mut conn).await;

    let frames = conn
        .handle_inbound(rpc_request(RpcMethod::Subscribe, 2, SubscribeReq {
            subscription_id: "sub1".into(),
            shape_requests: vec![ShapeRequest {
                request_id: "r1".into(),
                selects: vec![ShapeSelect { table_name: "entries".into() }],
            }],
        }))
        .await
        .unwrap();

    let kinds: Vec<FrameType> = frames.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            FrameType::RpcResponse,
            FrameType::SubsDataBegin,
            FrameType::Relation,
            FrameType::ShapeDataBegin,
            FrameType::OpLog,
            FrameType::ShapeDataEnd,
            FrameType::SubsDataEnd,
        ]
    );

    let oplog: OpLogMessage = codec::decode(&frames[4].payload).unwrap();
    assert_eq!(oplog.ops.len(), 1);
    assert!(matches!(oplog.ops[0], SatTransOp::Insert(_)));
}
