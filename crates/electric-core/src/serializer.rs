//! Transaction serializer (C5): an internal `Transaction` plus the
//! connection's `RelationRegistry` becomes an ordered list of frames.

use electric_protocol::codec;
use electric_protocol::frame::{Frame, FrameType};
use electric_protocol::message::{
    MigrateStmt, OpBegin, OpCommit, OpDelete, OpInsert, OpLogMessage, OpMigrate, OpUpdate,
    SatTransOp, TableDef,
};
use electric_protocol::relation::{RelationIdentity, RelationMessage};
use electric_protocol::row;
use thiserror::Error;

use crate::collaborators::{MigrationTranslator, SchemaCache};
use crate::relation_registry::RelationRegistry;
use crate::txn::{Change, Transaction};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerializeError {
    #[error("relation {0:?} is unknown to the schema cache")]
    UnknownRelation(RelationIdentity),
    #[error("transaction carries DDL rows reporting more than one migration version")]
    InvalidMigration,
}

/// Convert `tx` into zero or more frames, per `spec.md` §4.5.
pub async fn serialize_transaction(
    tx: &Transaction,
    registry: &mut RelationRegistry,
    schema_cache: &dyn SchemaCache,
    translator: &dyn MigrationTranslator,
) -> Result<Vec<Frame>, SerializeError> {
    let mut frames: Vec<Frame> = Vec::new();
    let mut ops: Vec<SatTransOp> = Vec::new();
    let mut migration_version: Option<String> = None;

    for change in &tx.changes {
        match change {
            Change::Migrate(ddl) => {
                match &migration_version {
                    None => migration_version = Some(ddl.version.clone()),
                    Some(v) if v != &ddl.version => return Err(SerializeError::InvalidMigration),
                    Some(_) => {}
                }
                let translated = translator
                    .translate(&ddl.version, &ddl.sql)
                    .map_err(|_| SerializeError::InvalidMigration)?;
                ops.push(SatTransOp::Migrate(OpMigrate {
                    version: translated.version,
                    stmts: translated
                        .stmts
                        .into_iter()
                        .map(|s| MigrateStmt { stmt_type: s.stmt_type, sql: s.sql })
                        .collect(),
                    table: translated.table.map(|t| TableDef { name: t.name, columns: t.columns }),
                }));
            }
            Change::Insert { relation, new, tags } => {
                if relation.is_extension_schema() {
                    continue;
                }
                let (relation_id, columns) =
                    resolve(relation, registry, schema_cache, &mut frames).await?;
                ops.push(SatTransOp::Insert(OpInsert {
                    relation_id,
                    row: row::encode(new, &columns),
                    tags: tags.clone(),
                }));
            }
            Change::Update { relation, old, new, tags } => {
                if relation.is_extension_schema() {
                    continue;
                }
                let (relation_id, columns) =
                    resolve(relation, registry, schema_cache, &mut frames).await?;
                ops.push(SatTransOp::Update(OpUpdate {
                    relation_id,
                    old_row: old.as_ref().map(|o| row::encode(o, &columns)),
                    row: row::encode(new, &columns),
                    tags: tags.clone(),
                }));
            }
            Change::Delete { relation, old, tags } => {
                if relation.is_extension_schema() {
                    continue;
                }
                let (relation_id, columns) =
                    resolve(relation, registry, schema_cache, &mut frames).await?;
                ops.push(SatTransOp::Delete(OpDelete {
                    relation_id,
                    old_row: old.as_ref().map(|o| row::encode(o, &columns)),
                    tags: tags.clone(),
                }));
            }
        }
    }

    if ops.is_empty() {
        return Ok(Vec::new());
    }

    let is_migration = migration_version.is_some();
    let mut all_ops = Vec::with_capacity(ops.len() + 2);
    all_ops.push(SatTransOp::Begin(OpBegin {
        commit_timestamp: tx.commit_timestamp,
        trans_id: tx.trans_id.clone(),
        lsn: tx.lsn.clone(),
        origin: tx.origin.clone(),
        is_migration,
    }));
    all_ops.append(&mut ops);
    all_ops.push(SatTransOp::Commit(OpCommit {
        commit_timestamp: tx.commit_timestamp,
        trans_id: tx.trans_id.clone(),
        lsn: tx.lsn.clone(),
    }));

    frames.push(Frame::new(
        FrameType::OpLog,
        codec::encode(&OpLogMessage { ops: all_ops }),
    ));
    Ok(frames)
}

async fn resolve(
    identity: &RelationIdentity,
    registry: &mut RelationRegistry,
    schema_cache: &dyn SchemaCache,
    frames: &mut Vec<Frame>,
) -> Result<(u32, Vec<electric_protocol::row::Column>), SerializeError> {
    let relation = schema_cache
        .relation_by_identity(identity)
        .await
        .ok_or_else(|| SerializeError::UnknownRelation(identity.clone()))?;
    let canonical_id = schema_cache
        .canonical_relation_id(identity)
        .await
        .ok_or_else(|| SerializeError::UnknownRelation(identity.clone()))?;
    let resolution = registry.resolve(&relation, canonical_id);
    if resolution.is_new {
        frames.push(Frame::new(
            FrameType::Relation,
            codec::encode(&RelationMessage {
                relation_id: resolution.relation_id,
                relation,
            }),
        ));
    }
    Ok((resolution.relation_id, resolution.columns))
}
