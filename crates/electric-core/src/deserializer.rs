//! Transaction deserializer (C6): reassembles inbound `OpLog` frames into
//! whole transactions, enforcing Begin/Commit framing.

use electric_protocol::message::{OpBegin, OpCommit, SatTransOp};
use electric_protocol::Lsn;
use thiserror::Error;

use crate::txn::{Change, Transaction};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("Begin received while a transaction is already open")]
    BeginWhileOpen,
    #[error("Begin carries an empty LSN")]
    EmptyLsnOnBegin,
    #[error("op received outside of a Begin/Commit bracket")]
    OpOutsideTransaction,
    #[error("Commit received with no open transaction")]
    CommitWithoutBegin,
    #[error("relation id {0} was never introduced by a Relation frame")]
    UnknownRelationId(u32),
    #[error("row does not match its relation's column schema: {0}")]
    InvalidRow(String),
}

struct Partial {
    begin: OpBegin,
    // Accumulated in reverse arrival order; reversed on Commit.
    changes_rev: Vec<Change>,
}

/// Holds the "current partial transaction" slot described in `spec.md`
/// §4.6. One instance per inbound direction per connection.
#[derive(Default)]
pub struct TransactionDeserializer {
    partial: Option<Partial>,
}

impl TransactionDeserializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_partial(&self) -> bool {
        self.partial.is_some()
    }

    /// Feed one op. Returns `Some(Transaction)` when a `Commit` closes out
    /// a partial transaction, `None` otherwise.
    pub fn feed(
        &mut self,
        op: SatTransOp,
        decode_change: impl FnOnce(SatTransOp) -> Result<Change, ProtocolViolation>,
    ) -> Result<Option<Transaction>, ProtocolViolation> {
        match op {
            SatTransOp::Begin(begin) => {
                if self.partial.is_some() {
                    return Err(ProtocolViolation::BeginWhileOpen);
                }
                if begin.lsn.is_empty() {
                    return Err(ProtocolViolation::EmptyLsnOnBegin);
                }
                self.partial = Some(Partial {
                    begin,
                    changes_rev: Vec::new(),
                });
                Ok(None)
            }
            SatTransOp::Commit(commit) => {
                let Some(partial) = self.partial.take() else {
                    return Err(ProtocolViolation::CommitWithoutBegin);
                };
                let mut changes = partial.changes_rev;
                changes.reverse();
                Ok(Some(Transaction {
                    changes,
                    commit_timestamp: commit.commit_timestamp,
                    trans_id: commit.trans_id,
                    lsn: commit.lsn,
                    origin: partial.begin.origin,
                }))
            }
            other => {
                let Some(partial) = self.partial.as_mut() else {
                    return Err(ProtocolViolation::OpOutsideTransaction);
                };
                let change = decode_change(other)?;
                partial.changes_rev.push(change);
                Ok(None)
            }
        }
    }

    /// The LSN of the currently-open transaction, if any (for diagnostics).
    pub fn open_lsn(&self) -> Option<&Lsn> {
        self.partial.as_ref().map(|p| &p.begin.lsn)
    }
}

/// Standalone sentinel "op commit" pairing helper used by tests and by
/// `connection.rs` when it needs a bare Commit without re-deriving one.
pub fn commit_of(begin: &OpBegin, lsn: Lsn) -> OpCommit {
    OpCommit {
        commit_timestamp: begin.commit_timestamp,
        trans_id: begin.trans_id.clone(),
        lsn,
    }
}
