//! Replication cursor (C8): `startReplication`/`stopReplication` semantics
//! and the current-position bookkeeping for the outbound direction
//! (`spec.md` §4.8).

use std::cmp::Ordering;

use electric_protocol::error::ErrorCode;
use electric_protocol::Lsn;

use crate::collaborators::{SchemaCache, WalSource, WalSourceError};
use crate::subscription::SubscriptionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationState {
    Stopped,
    Live,
}

/// Per-connection replication position, established by `startReplication`
/// and advanced as transactions are emitted.
pub struct ReplicationCursor {
    state: ReplicationState,
    current_lsn: Option<Lsn>,
    schema_version: Option<String>,
}

impl Default for ReplicationCursor {
    fn default() -> Self {
        Self {
            state: ReplicationState::Stopped,
            current_lsn: None,
            schema_version: None,
        }
    }
}

impl ReplicationCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ReplicationState {
        self.state
    }

    pub fn current_lsn(&self) -> Option<&Lsn> {
        self.current_lsn.as_ref()
    }

    /// `startReplication(lsn, subscription_ids, schema_version)` per the
    /// §4.8 decision table:
    ///
    /// - empty/absent `lsn` resumes from the source's current head
    /// - a malformed `lsn` (the source can't parse it) is `MalformedLsn`
    /// - an `lsn` behind the retention window is `BehindWindow`
    /// - an `lsn` ahead of every named subscription's established cursor
    ///   is `InvalidPosition`
    /// - an unrecognized `schema_version` is `UnknownSchemaVsn`
    /// - a named subscription id the manager doesn't know is
    ///   `SubscriptionNotFound`
    pub async fn start_replication(
        &mut self,
        lsn: Option<Lsn>,
        subscription_ids: &[String],
        schema_version: Option<&str>,
        wal: &dyn WalSource,
        schema_cache: &dyn SchemaCache,
        subscriptions: &SubscriptionManager,
    ) -> Result<(), ErrorCode> {
        for id in subscription_ids {
            if subscriptions.get(id).is_none() {
                return Err(ErrorCode::SubscriptionNotFound);
            }
        }

        if let Some(version) = schema_version {
            let known_table = schema_cache.electrified_tables().await;
            let mut any_known = known_table.is_empty();
            for identity in &known_table {
                if schema_cache.columns_at_version(identity, version).await.is_some() {
                    any_known = true;
                    break;
                }
            }
            if !any_known {
                return Err(ErrorCode::UnknownSchemaVsn);
            }
            self.schema_version = Some(version.to_string());
        }

        let resume_at = match lsn {
            None => wal.current_position(),
            Some(ref l) if l.is_empty() => wal.current_position(),
            Some(l) => {
                wal.validate_position(&l).map_err(|e| match e {
                    WalSourceError::BehindWindow => ErrorCode::BehindWindow,
                    WalSourceError::InvalidPosition => ErrorCode::InvalidPosition,
                    WalSourceError::Malformed => ErrorCode::MalformedLsn,
                })?;
                for id in subscription_ids {
                    if let Some(sub) = subscriptions.get(id) {
                        if let Some(cursor) = &sub.established_at_lsn {
                            if wal.compare(&l, cursor) == Ordering::Greater {
                                return Err(ErrorCode::InvalidPosition);
                            }
                        }
                    }
                }
                l
            }
        };

        self.current_lsn = Some(resume_at);
        self.state = ReplicationState::Live;
        Ok(())
    }

    /// Clean shutdown of the live stream; idempotent.
    pub fn stop_replication(&mut self) {
        self.state = ReplicationState::Stopped;
    }

    pub fn advance(&mut self, lsn: Lsn) {
        self.current_lsn = Some(lsn);
    }
}
