//! Shared test doubles and builders used across `electric-core`'s and
//! `electric-server`'s test suites: mock collaborators plus small
//! constructors for the internal domain types, so every crate's tests
//! don't each hand-roll the same fixtures.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use electric_core::{
    AuthOutcome, AuthVerifier, CapturedDdl, Change, MigrationTranslator, RowMap, SchemaCache,
    SnapshotBatch, SnapshotError, SubscriptionDataSource, Transaction, TranslatedMigration,
    WalSource, WalSourceError,
};
use electric_protocol::relation::{Relation, RelationIdentity};
use electric_protocol::row::{Column, ColumnValue};
use electric_protocol::Lsn;
use tokio::sync::Notify;

/// Builds a `Transaction` from pre-built `Change`s for serializer/
/// deserializer tests.
pub fn transaction_with_changes(
    changes: Vec<Change>,
    commit_timestamp: u64,
    trans_id: &str,
    lsn: Vec<u8>,
) -> Transaction {
    Transaction {
        changes,
        commit_timestamp,
        trans_id: trans_id.to_string(),
        lsn: Lsn(lsn),
        origin: None,
    }
}

/// An `Insert` change against `schema.table` with plain-text column values.
pub fn insert_change(schema: &str, table: &str, fields: &[(&str, &str)]) -> Change {
    let mut row: RowMap = HashMap::new();
    for (name, value) in fields {
        row.insert((*name).to_string(), ColumnValue::Value(value.as_bytes().to_vec()));
    }
    Change::Insert {
        relation: RelationIdentity::new(schema, table),
        new: row,
        tags: Vec::new(),
    }
}

/// A `Migrate` change carrying one captured DDL statement.
pub fn migrate_change(version: &str, sql: &str) -> Change {
    Change::Migrate(CapturedDdl { version: version.to_string(), sql: sql.to_string() })
}

/// A schema cache that synthesizes a single-column (`id text`) relation
/// for any identity on first use and hands out stable, monotonically
/// increasing canonical ids -- enough structure for serializer/
/// deserializer tests without needing a real catalog.
pub struct MockSchemaCache {
    relations: Mutex<HashMap<RelationIdentity, (u32, Relation)>>,
    next_id: Mutex<u32>,
}

impl Default for MockSchemaCache {
    fn default() -> Self {
        Self { relations: Mutex::new(HashMap::new()), next_id: Mutex::new(1) }
    }
}

impl MockSchemaCache {
    fn relation_for(&self, identity: &RelationIdentity) -> (u32, Relation) {
        let mut relations = self.relations.lock().unwrap();
        if let Some(entry) = relations.get(identity) {
            return entry.clone();
        }
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        *next_id += 1;
        let relation = Relation {
            identity: identity.clone(),
            columns: vec![Column {
                name: "id".into(),
                pg_type_name: "text".into(),
                nullable: false,
                part_of_identity: true,
            }],
            primary_keys: std::collections::BTreeSet::from(["id".to_string()]),
        };
        relations.insert(identity.clone(), (id, relation.clone()));
        (id, relation)
    }
}

#[async_trait]
impl SchemaCache for MockSchemaCache {
    async fn ready(&self, _origin: &str) -> bool {
        true
    }

    async fn relation_by_identity(&self, identity: &RelationIdentity) -> Option<Relation> {
        Some(self.relation_for(identity).1)
    }

    async fn relation_by_id(&self, relation_id: u32) -> Option<Relation> {
        self.relations
            .lock()
            .unwrap()
            .values()
            .find(|(id, _)| *id == relation_id)
            .map(|(_, rel)| rel.clone())
    }

    async fn canonical_relation_id(&self, identity: &RelationIdentity) -> Option<u32> {
        Some(self.relation_for(identity).0)
    }

    async fn electrified_tables(&self) -> Vec<RelationIdentity> {
        self.relations.lock().unwrap().keys().cloned().collect()
    }

    async fn columns_at_version(
        &self,
        identity: &RelationIdentity,
        _version: &str,
    ) -> Option<Vec<Column>> {
        Some(self.relation_for(identity).1.columns)
    }
}

pub fn mock_schema_cache() -> MockSchemaCache {
    MockSchemaCache::default()
}

/// A migration translator that passes the captured SQL through unchanged,
/// as a single `Other`-typed statement.
pub struct PassthroughMigrationTranslator;

impl MigrationTranslator for PassthroughMigrationTranslator {
    fn translate(&self, version: &str, ddl_sql: &str) -> Result<TranslatedMigration, String> {
        Ok(TranslatedMigration {
            version: version.to_string(),
            stmts: vec![electric_protocol::message::MigrateStmt {
                stmt_type: electric_protocol::message::MigrateStmtType::Other,
                sql: ddl_sql.to_string(),
            }],
            table: None,
        })
    }
}

pub fn mock_migration_translator() -> PassthroughMigrationTranslator {
    PassthroughMigrationTranslator
}

/// Always-accept auth verifier for connection-level tests.
pub struct AcceptingAuthVerifier;

#[async_trait]
impl AuthVerifier for AcceptingAuthVerifier {
    async fn verify(&self, id: &str, _token: &str, _headers: &[(String, String)]) -> AuthOutcome {
        AuthOutcome::Ok { identity: id.to_string() }
    }
}

pub fn accepting_auth_verifier() -> AcceptingAuthVerifier {
    AcceptingAuthVerifier
}

/// Always-reject auth verifier, for negative-path tests.
pub struct RejectingAuthVerifier;

#[async_trait]
impl AuthVerifier for RejectingAuthVerifier {
    async fn verify(&self, _id: &str, _token: &str, _headers: &[(String, String)]) -> AuthOutcome {
        AuthOutcome::AuthFailed
    }
}

pub fn rejecting_auth_verifier() -> RejectingAuthVerifier {
    RejectingAuthVerifier
}

/// A `WalSource` with a fixed head and retention floor, and no actual
/// transaction stream (`next_transaction` always pends forever via
/// `None` -- callers that need live delivery should use a channel-backed
/// fake instead).
pub struct FixedWalSource {
    pub head: Lsn,
    pub retained_from: Lsn,
}

#[async_trait]
impl WalSource for FixedWalSource {
    fn compare(&self, a: &Lsn, b: &Lsn) -> std::cmp::Ordering {
        a.0.cmp(&b.0)
    }

    fn current_position(&self) -> Lsn {
        self.head.clone()
    }

    fn validate_position(&self, lsn: &Lsn) -> Result<(), WalSourceError> {
        if lsn.0 < self.retained_from.0 {
            Err(WalSourceError::BehindWindow)
        } else {
            Ok(())
        }
    }

    async fn next_transaction(&self, _from: &Lsn) -> Option<Transaction> {
        None
    }
}

pub fn fixed_wal_source(head: Vec<u8>, retained_from: Vec<u8>) -> FixedWalSource {
    FixedWalSource { head: Lsn(head), retained_from: Lsn(retained_from) }
}

/// A `WalSource` backed by a FIFO queue: `push_transaction` enqueues, and
/// `next_transaction` waits on a `Notify` until something is available.
/// For scenario tests that need to drive `Connection::poll_replication`
/// with a live insert, rather than a source that never yields.
pub struct QueueWalSource {
    head: Lsn,
    retained_from: Lsn,
    queue: Mutex<VecDeque<Transaction>>,
    notify: Notify,
}

impl QueueWalSource {
    pub fn new(head: Vec<u8>, retained_from: Vec<u8>) -> Self {
        Self {
            head: Lsn(head),
            retained_from: Lsn(retained_from),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    pub async fn push_transaction(&self, tx: Transaction) {
        self.queue.lock().unwrap().push_back(tx);
        self.notify.notify_one();
    }
}

#[async_trait]
impl WalSource for QueueWalSource {
    fn compare(&self, a: &Lsn, b: &Lsn) -> std::cmp::Ordering {
        a.0.cmp(&b.0)
    }

    fn current_position(&self) -> Lsn {
        self.head.clone()
    }

    fn validate_position(&self, lsn: &Lsn) -> Result<(), WalSourceError> {
        if lsn.0 < self.retained_from.0 {
            Err(WalSourceError::BehindWindow)
        } else {
            Ok(())
        }
    }

    async fn next_transaction(&self, _from: &Lsn) -> Option<Transaction> {
        loop {
            if let Some(tx) = self.queue.lock().unwrap().pop_front() {
                return Some(tx);
            }
            self.notify.notified().await;
        }
    }
}

pub fn queue_wal_source(head: Vec<u8>, retained_from: Vec<u8>) -> QueueWalSource {
    QueueWalSource::new(head, retained_from)
}

/// A subscription data source that always returns an empty, immediately
/// consistent snapshot at a fixed LSN.
pub struct EmptySnapshotSource {
    pub at_lsn: Lsn,
}

#[async_trait]
impl SubscriptionDataSource for EmptySnapshotSource {
    async fn snapshot(
        &self,
        _subscription_id: &str,
        _shapes: &[electric_core::Shape],
    ) -> Result<(Lsn, Vec<SnapshotBatch>), SnapshotError> {
        Ok((self.at_lsn.clone(), Vec::new()))
    }
}

pub fn empty_snapshot_source(at_lsn: Vec<u8>) -> EmptySnapshotSource {
    EmptySnapshotSource { at_lsn: Lsn(at_lsn) }
}

/// A subscription data source that returns one fixed row per requested
/// shape, tagged with the shape's own `request_id`/`table_name`, against a
/// single-column (`id text`) relation synthesized the same way
/// `MockSchemaCache` does -- enough to exercise snapshot-delivery framing
/// end to end without a real table scan.
pub struct FixedRowSnapshotSource {
    pub at_lsn: Lsn,
    pub row_id: String,
}

#[async_trait]
impl SubscriptionDataSource for FixedRowSnapshotSource {
    async fn snapshot(
        &self,
        _subscription_id: &str,
        shapes: &[electric_core::Shape],
    ) -> Result<(Lsn, Vec<SnapshotBatch>), SnapshotError> {
        let mut batches = Vec::with_capacity(shapes.len());
        for shape in shapes {
            let table_name = shape
                .selects
                .first()
                .map(|s| s.table_name.as_str())
                .unwrap_or("unknown");
            let relation = Relation {
                identity: RelationIdentity::new("public", table_name),
                columns: vec![Column {
                    name: "id".into(),
                    pg_type_name: "text".into(),
                    nullable: false,
                    part_of_identity: true,
                }],
                primary_keys: std::collections::BTreeSet::from(["id".to_string()]),
            };
            let mut fields = HashMap::new();
            fields.insert("id".to_string(), ColumnValue::Value(self.row_id.as_bytes().to_vec()));
            let wire_row = electric_protocol::row::encode(&fields, &relation.columns);
            batches.push(SnapshotBatch {
                request_id: shape.request_id.clone(),
                uuid: format!("{}-snapshot", shape.request_id),
                rows: vec![(relation, wire_row)],
                is_final: true,
            });
        }
        Ok((self.at_lsn.clone(), batches))
    }
}

pub fn fixed_row_snapshot_source(at_lsn: Vec<u8>, row_id: &str) -> FixedRowSnapshotSource {
    FixedRowSnapshotSource { at_lsn: Lsn(at_lsn), row_id: row_id.to_string() }
}
