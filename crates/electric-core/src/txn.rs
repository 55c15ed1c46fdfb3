//! Internal transaction/change domain model (`spec.md` §3), distinct from
//! the wire `SatTransOp` sequence `serializer.rs` translates it into.

use electric_protocol::relation::RelationIdentity;
use electric_protocol::row::ColumnValue;
use electric_protocol::Lsn;
use std::collections::HashMap;

pub type RowMap = HashMap<String, ColumnValue>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedDdl {
    pub version: String,
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Insert {
        relation: RelationIdentity,
        new: RowMap,
        tags: Vec<String>,
    },
    Update {
        relation: RelationIdentity,
        old: Option<RowMap>,
        new: RowMap,
        tags: Vec<String>,
    },
    Delete {
        relation: RelationIdentity,
        old: Option<RowMap>,
        tags: Vec<String>,
    },
    Migrate(CapturedDdl),
}

impl Change {
    pub fn relation(&self) -> Option<&RelationIdentity> {
        match self {
            Change::Insert { relation, .. }
            | Change::Update { relation, .. }
            | Change::Delete { relation, .. } => Some(relation),
            Change::Migrate(_) => None,
        }
    }

    pub fn is_migration(&self) -> bool {
        matches!(self, Change::Migrate(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub changes: Vec<Change>,
    pub commit_timestamp: u64,
    pub trans_id: String,
    pub lsn: Lsn,
    pub origin: Option<String>,
}

impl Transaction {
    pub fn is_migration(&self) -> bool {
        self.changes.iter().any(Change::is_migration)
    }
}
