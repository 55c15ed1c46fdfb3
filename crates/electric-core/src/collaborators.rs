//! External collaborator traits (`spec.md` §6). The core only consumes
//! these interfaces; the PostgreSQL-facing implementations (WAL decoding,
//! DDL capture, the schema cache's Postgres-backed storage, real auth
//! token verification) are out of scope for this crate.

use async_trait::async_trait;
use electric_protocol::relation::{Relation, RelationIdentity};
use electric_protocol::row::Column;
use electric_protocol::Lsn;
use std::cmp::Ordering;

use crate::txn::Transaction;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Ok { identity: String },
    AuthFailed,
    InvalidCredentials,
}

/// Boolean capability check standing in for real token verification
/// (`spec.md` §1, out-of-scope collaborators).
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    async fn verify(&self, id: &str, token: &str, headers: &[(String, String)]) -> AuthOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalSourceError {
    BehindWindow,
    InvalidPosition,
    Malformed,
}

/// Producer of the transaction stream the core serializes to the wire.
#[async_trait]
pub trait WalSource: Send + Sync {
    /// Compare two LSNs under this source's total order.
    fn compare(&self, a: &Lsn, b: &Lsn) -> Ordering;

    /// The source's current head position (used when a client starts
    /// replication with an empty/absent LSN).
    fn current_position(&self) -> Lsn;

    /// Validate and normalize an externally-supplied LSN (e.g. one a client
    /// sent to resume from). Returns `WalSourceError::BehindWindow` if it
    /// precedes the retention window.
    fn validate_position(&self, lsn: &Lsn) -> Result<(), WalSourceError>;

    /// Subscribe for transactions from `from` onward. Implementations are
    /// expected to deliver transactions in strict LSN order.
    async fn next_transaction(&self, from: &Lsn) -> Option<Transaction>;
}

/// Resolves relation identities/ids and schema versions. A multi-reader,
/// single-DDL-writer collaborator (`spec.md` §5).
#[async_trait]
pub trait SchemaCache: Send + Sync {
    async fn ready(&self, origin: &str) -> bool;
    async fn relation_by_identity(&self, identity: &RelationIdentity) -> Option<Relation>;
    async fn relation_by_id(&self, relation_id: u32) -> Option<Relation>;
    async fn canonical_relation_id(&self, identity: &RelationIdentity) -> Option<u32>;
    async fn electrified_tables(&self) -> Vec<RelationIdentity>;
    /// `None` if the server cannot reconstruct column layouts at that
    /// version (`UnknownSchemaVsn`, `spec.md` §4.8).
    async fn columns_at_version(
        &self,
        identity: &RelationIdentity,
        version: &str,
    ) -> Option<Vec<Column>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedMigration {
    pub version: String,
    pub stmts: Vec<electric_protocol::message::MigrateStmt>,
    pub table: Option<electric_protocol::message::TableDef>,
}

/// Translates captured DDL into target-dialect statements. Deterministic
/// and stable for a given `(schema, version, ddl_sql)` (`spec.md` §6).
pub trait MigrationTranslator: Send + Sync {
    fn translate(
        &self,
        version: &str,
        ddl_sql: &str,
    ) -> Result<TranslatedMigration, String>;
}

/// One batch of rows for a single shape within a subscription's initial
/// snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotBatch {
    pub request_id: String,
    pub uuid: String,
    pub rows: Vec<(Relation, electric_protocol::row::Row)>,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    ShapeSizeLimitExceeded { request_id: String },
}

/// Produces the initial-snapshot row stream for a subscription's shapes,
/// along with the LSN at which the snapshot is consistent.
#[async_trait]
pub trait SubscriptionDataSource: Send + Sync {
    async fn snapshot(
        &self,
        subscription_id: &str,
        shapes: &[crate::subscription::Shape],
    ) -> Result<(Lsn, Vec<SnapshotBatch>), SnapshotError>;
}
