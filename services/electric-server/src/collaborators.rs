//! In-memory stand-ins for the PostgreSQL-facing collaborators
//! (`electric_core::{WalSource, SchemaCache, SubscriptionDataSource,
//! MigrationTranslator}`). Real WAL decoding and catalog storage sit
//! outside this protocol's boundary; these implementations are enough
//! to run the broker end-to-end against an empty, static catalog.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use async_trait::async_trait;
use electric_core::{
    MigrationTranslator, SchemaCache, SnapshotBatch, SnapshotError, SubscriptionDataSource,
    Transaction, TranslatedMigration, WalSource, WalSourceError,
};
use electric_protocol::relation::{Relation, RelationIdentity};
use electric_protocol::row::Column;
use electric_protocol::{message::MigrateStmt, message::MigrateStmtType, Lsn};
use tokio::sync::{Mutex, Notify};

/// A WAL source with a fixed head and retention floor, backed by a queue
/// transactions can be pushed onto. A deployment would back this with a
/// real logical-replication slot; `next_transaction` here just waits on
/// whatever `push_transaction` enqueues, in FIFO order.
pub struct StaticWalSource {
    head: Lsn,
    retained_from: Lsn,
    queue: Mutex<VecDeque<Transaction>>,
    notify: Notify,
}

impl StaticWalSource {
    pub fn new(head: Vec<u8>, retained_from: Vec<u8>) -> Self {
        Self {
            head: Lsn(head),
            retained_from: Lsn(retained_from),
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Enqueue a transaction for delivery to the next `next_transaction`
    /// caller waiting on this source.
    pub async fn push_transaction(&self, tx: Transaction) {
        self.queue.lock().await.push_back(tx);
        self.notify.notify_one();
    }
}

#[async_trait]
impl WalSource for StaticWalSource {
    fn compare(&self, a: &Lsn, b: &Lsn) -> Ordering {
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
            if let Some(tx) = self.queue.lock().await.pop_front() {
                return Some(tx);
            }
            self.notify.notified().await;
        }
    }
}

/// A schema cache with no electrified tables registered. A deployment
/// would back this with the real Postgres catalog; absent that, every
/// `Subscribe` against a named table is rejected with `TableNotFound`,
/// which is the correct behavior for a server that has electrified
/// nothing.
#[derive(Default)]
pub struct StaticSchemaCache {
    relations: RwLock<HashMap<RelationIdentity, (u32, Relation)>>,
}

impl StaticSchemaCache {
    /// Electrifies one table against this cache. A real deployment would
    /// populate this from the Postgres catalog at startup; tests use it to
    /// stand up a known-table set without a real database.
    pub fn register(&self, relation_id: u32, relation: Relation) {
        self.relations.write().unwrap().insert(relation.identity.clone(), (relation_id, relation));
    }
}

#[async_trait]
impl SchemaCache for StaticSchemaCache {
    async fn ready(&self, _origin: &str) -> bool {
        true
    }

    async fn relation_by_identity(&self, identity: &RelationIdentity) -> Option<Relation> {
        self.relations.read().unwrap().get(identity).map(|(_, r)| r.clone())
    }

    async fn relation_by_id(&self, relation_id: u32) -> Option<Relation> {
        self.relations
            .read()
            .unwrap()
            .values()
            .find(|(id, _)| *id == relation_id)
            .map(|(_, r)| r.clone())
    }

    async fn canonical_relation_id(&self, identity: &RelationIdentity) -> Option<u32> {
        self.relations.read().unwrap().get(identity).map(|(id, _)| *id)
    }

    async fn electrified_tables(&self) -> Vec<RelationIdentity> {
        self.relations.read().unwrap().keys().cloned().collect()
    }

    async fn columns_at_version(&self, identity: &RelationIdentity, _version: &str) -> Option<Vec<Column>> {
        self.relations.read().unwrap().get(identity).map(|(_, r)| r.columns.clone())
    }
}

/// Passes captured DDL through unchanged. A real translator would
/// rewrite Postgres DDL into SQLite-compatible statements; that
/// rewriting is out of this protocol's scope (`spec.md` §6).
pub struct PassthroughMigrationTranslator;

impl MigrationTranslator for PassthroughMigrationTranslator {
    fn translate(&self, version: &str, ddl_sql: &str) -> Result<TranslatedMigration, String> {
        Ok(TranslatedMigration {
            version: version.to_owned(),
            stmts: vec![MigrateStmt { stmt_type: MigrateStmtType::Other, sql: ddl_sql.to_owned() }],
            table: None,
        })
    }
}

/// Always produces an empty snapshot at the WAL's current head. A
/// deployment would back this with a real table scan per shape.
pub struct EmptySubscriptionDataSource {
    at_lsn: Lsn,
}

impl EmptySubscriptionDataSource {
    pub fn new(at_lsn: Vec<u8>) -> Self {
        Self { at_lsn: Lsn(at_lsn) }
    }
}

#[async_trait]
impl SubscriptionDataSource for EmptySubscriptionDataSource {
    async fn snapshot(
        &self,
        _subscription_id: &str,
        _shapes: &[electric_core::Shape],
    ) -> Result<(Lsn, Vec<SnapshotBatch>), SnapshotError> {
        Ok((self.at_lsn.clone(), Vec::new()))
    }
}
