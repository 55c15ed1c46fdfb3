//! Transport-agnostic replication logic: everything `spec.md` §4 describes
//! except the wire codec itself (which lives in `electric-protocol`) and
//! the concrete collaborator implementations (PostgreSQL WAL decoding,
//! schema storage, auth) that a server binary supplies.

pub mod collaborators;
pub mod connection;
pub mod cursor;
pub mod deserializer;
pub mod relation_registry;
pub mod rpc;
pub mod serializer;
pub mod subscription;
pub mod txn;

pub use collaborators::{
    AuthOutcome, AuthVerifier, MigrationTranslator, SchemaCache, SnapshotBatch, SnapshotError,
    SubscriptionDataSource, TranslatedMigration, WalSource, WalSourceError,
};
pub use connection::{Collaborators, Connection, ConnectionError, ConnectionState, ReplicatingSubState};
pub use cursor::{ReplicationCursor, ReplicationState};
pub use deserializer::{ProtocolViolation, TransactionDeserializer};
pub use relation_registry::{RelationRegistry, Resolution};
pub use rpc::{RequestIdGen, RpcCallError, RpcError, RpcMultiplexer};
pub use serializer::SerializeError;
pub use subscription::{
    DeliverOutcome, Shape, ShapeStatus, SubscribeOutcome, Subscription, SubscriptionManager,
    SubscriptionStatus,
};
pub use txn::{CapturedDdl, Change, RowMap, Transaction};
