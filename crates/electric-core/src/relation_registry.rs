//! Relation registry (C4): connection-local mapping between stable
//! `(schema, table)` identities and the volatile `relation_id` advertised
//! to the peer on this connection.

use electric_protocol::relation::{Relation, RelationIdentity};
use electric_protocol::row::Column;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct Entry {
    relation_id: u32,
    columns: Vec<Column>,
}

/// One direction's worth of relation state. A connection holds two of
/// these -- one per direction -- since `relation_id` assignment is
/// independent in each direction (`spec.md` §3).
#[derive(Debug, Default)]
pub struct RelationRegistry {
    by_identity: HashMap<RelationIdentity, Entry>,
    by_id: HashMap<u32, RelationIdentity>,
}

pub struct Resolution {
    pub relation_id: u32,
    pub columns: Vec<Column>,
    pub is_new: bool,
}

impl RelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `resolve(relation_identity) -> (relation_id, columns, is_new)`
    /// (`spec.md` §4.4). `canonical_id` comes from the schema cache (e.g. a
    /// PG OID) and is only consulted the first time an identity is seen.
    pub fn resolve(&mut self, relation: &Relation, canonical_id: u32) -> Resolution {
        if let Some(entry) = self.by_identity.get(&relation.identity) {
            return Resolution {
                relation_id: entry.relation_id,
                columns: entry.columns.clone(),
                is_new: false,
            };
        }
        let entry = Entry {
            relation_id: canonical_id,
            columns: relation.columns.clone(),
        };
        self.by_identity
            .insert(relation.identity.clone(), entry.clone());
        self.by_id.insert(canonical_id, relation.identity.clone());
        Resolution {
            relation_id: canonical_id,
            columns: entry.columns,
            is_new: true,
        }
    }

    /// Columns previously advertised for a `relation_id` seen from the
    /// peer. Used by the deserializer to decode incoming rows.
    pub fn columns_for_id(&self, relation_id: u32) -> Option<&[Column]> {
        let identity = self.by_id.get(&relation_id)?;
        self.by_identity
            .get(identity)
            .map(|e| e.columns.as_slice())
    }

    /// Record a `Relation` frame observed from the peer (inbound
    /// direction): entries are added lazily on first use, never mutated.
    pub fn observe(&mut self, relation_id: u32, identity: RelationIdentity, columns: Vec<Column>) {
        if self.by_id.contains_key(&relation_id) {
            return;
        }
        self.by_id.insert(relation_id, identity.clone());
        self.by_identity.insert(identity, Entry { relation_id, columns });
    }

    pub fn knows_id(&self, relation_id: u32) -> bool {
        self.by_id.contains_key(&relation_id)
    }

    pub fn identity_for_id(&self, relation_id: u32) -> Option<RelationIdentity> {
        self.by_id.get(&relation_id).cloned()
    }
}
