//! Wire-facing relation types shared by the relation registry (C4), the
//! transaction serializer (C5) and deserializer (C6).

use crate::row::Column;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Stable identity of a relation: `(schema_name, table_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationIdentity {
    pub schema_name: String,
    pub table_name: String,
}

impl RelationIdentity {
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            schema_name: schema_name.into(),
            table_name: table_name.into(),
        }
    }

    /// `true` for the internal extension schema (`electric.*`), whose
    /// changes the serializer drops (`spec.md` §4.5 step 2).
    pub fn is_extension_schema(&self) -> bool {
        self.schema_name == "electric"
    }
}

/// Full relation definition as advertised on the wire in a `Relation`
/// frame: stable identity, ordered columns, and the primary-key subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub identity: RelationIdentity,
    pub columns: Vec<Column>,
    pub primary_keys: BTreeSet<String>,
}

/// The `Relation` wire message: `relation_id` plus the definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationMessage {
    pub relation_id: u32,
    pub relation: Relation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_schema_is_detected() {
        let id = RelationIdentity::new("electric", "shadow__entries");
        assert!(id.is_extension_schema());
        let other = RelationIdentity::new("public", "entries");
        assert!(!other.is_extension_schema());
    }
}
