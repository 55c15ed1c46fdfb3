//! Wire-format types for the Satellite replication protocol: frame codec
//! (C1), row codec (C3), relation types (C4), and the symbolic error
//! taxonomy (C10). No I/O and no async here -- see `electric-core` for the
//! stateful engine that drives these over a real connection.

pub mod codec;
pub mod error;
pub mod frame;
pub mod lsn;
pub mod message;
pub mod relation;
pub mod row;

pub use error::ErrorCode;
pub use frame::{Frame, FrameError, FrameType};
pub use lsn::Lsn;
pub use relation::{Relation, RelationIdentity};
pub use row::{Column, ColumnValue, Row};
