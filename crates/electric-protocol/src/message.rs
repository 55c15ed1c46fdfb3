//! Structured message bodies carried inside frame payloads.
//!
//! Every type here is `bincode`-serializable; `frame.rs` only deals in raw
//! bytes, these types give the rest of the workspace a typed view.

use crate::error::{
    ErrorCode, ShapeDeliveryErrorDetail, ShapeRequestErrorDetail,
};
use crate::lsn::Lsn;
use crate::relation::RelationMessage;
use crate::row::Row;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RPC envelope (C2)
// ---------------------------------------------------------------------------

/// Recognized RPC methods, fulfilled by whichever peer owns the resource
/// (`spec.md` §4.2): `authenticate`/`subscribe`/`unsubscribe` are always
/// server-fulfilled; `startReplication`/`stopReplication` are fulfilled by
/// whichever side is being asked to emit the op-log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RpcMethod {
    Authenticate,
    StartReplication,
    StopReplication,
    Subscribe,
    Unsubscribe,
}

impl RpcMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            RpcMethod::Authenticate => "authenticate",
            RpcMethod::StartReplication => "startReplication",
            RpcMethod::StopReplication => "stopReplication",
            RpcMethod::Subscribe => "subscribe",
            RpcMethod::Unsubscribe => "unsubscribe",
        }
    }
}

impl std::fmt::Display for RpcMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `RpcRequest{method, request_id, payload}` (`spec.md` §4.2). `payload` is
/// the bincode-encoded, method-specific request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: RpcMethod,
    pub request_id: u32,
    pub payload: Vec<u8>,
}

/// `result` of an `RpcResponse`: `Ok(bytes)` (method-specific response
/// body) or `Err(ErrorCode)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RpcResult {
    Ok(Vec<u8>),
    Err(ErrorCode),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub method: RpcMethod,
    pub request_id: u32,
    pub result: RpcResult,
}

// ---------------------------------------------------------------------------
// authenticate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthReq {
    pub id: String,
    pub token: String,
    pub headers: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResp {
    pub id: String,
}

// ---------------------------------------------------------------------------
// startReplication / stopReplication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReplicationReq {
    pub lsn: Option<Lsn>,
    pub subscription_ids: Vec<String>,
    pub schema_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartReplicationResp {
    pub err: Option<ErrorCode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopReplicationReq;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopReplicationResp;

// ---------------------------------------------------------------------------
// subscribe / unsubscribe
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeSelect {
    pub table_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRequest {
    pub request_id: String,
    pub selects: Vec<ShapeSelect>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeReq {
    pub subscription_id: String,
    pub shape_requests: Vec<ShapeRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscribeResp {
    Ack { subscription_id: String },
    DuplicateId,
    ShapeRequestError(Vec<ShapeRequestErrorDetail>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeReq {
    pub subscription_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeResp;

// ---------------------------------------------------------------------------
// Op-log messages (C5/C6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpBegin {
    pub commit_timestamp: u64,
    pub trans_id: String,
    pub lsn: Lsn,
    pub origin: Option<String>,
    pub is_migration: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpCommit {
    pub commit_timestamp: u64,
    pub trans_id: String,
    pub lsn: Lsn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpInsert {
    pub relation_id: u32,
    pub row: Row,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpUpdate {
    pub relation_id: u32,
    /// `None` means "no previous image" (spec.md §4.6).
    pub old_row: Option<Row>,
    pub row: Row,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpDelete {
    pub relation_id: u32,
    pub old_row: Option<Row>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrateStmtType {
    CreateTable,
    AlterTable,
    DropTable,
    CreateIndex,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrateStmt {
    pub stmt_type: MigrateStmtType,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    pub columns: Vec<crate::row::Column>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpMigrate {
    pub version: String,
    pub stmts: Vec<MigrateStmt>,
    pub table: Option<TableDef>,
}

/// One op inside an `OpLog` frame's ordered sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SatTransOp {
    Begin(OpBegin),
    Insert(OpInsert),
    Update(OpUpdate),
    Delete(OpDelete),
    Migrate(OpMigrate),
    Commit(OpCommit),
}

/// `OpLog` frame payload: an ordered op sequence, Begin/Commit-framed for
/// real transactions, or a bare run of `Insert`s for snapshot delivery
/// (`spec.md` §4.7 step 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpLogMessage {
    pub ops: Vec<SatTransOp>,
}

// ---------------------------------------------------------------------------
// Subscription lifecycle frames (C7)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsDataBegin {
    pub subscription_id: String,
    pub lsn: Lsn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsDataEnd;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeDataBegin {
    pub request_id: String,
    pub uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeDataEnd;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsDataError {
    pub code: ErrorCode,
    pub subscription_id: String,
    pub shape_request_errors: Vec<ShapeDeliveryErrorDetail>,
}

pub use RelationMessage as RelationFrame;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_method_strings_match_wire_contract() {
        assert_eq!(RpcMethod::Authenticate.as_str(), "authenticate");
        assert_eq!(RpcMethod::StartReplication.as_str(), "startReplication");
        assert_eq!(RpcMethod::StopReplication.as_str(), "stopReplication");
        assert_eq!(RpcMethod::Subscribe.as_str(), "subscribe");
        assert_eq!(RpcMethod::Unsubscribe.as_str(), "unsubscribe");
    }
}
