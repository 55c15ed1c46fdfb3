//! Wire error taxonomy (C10).
//!
//! These are the normalized, symbolic error identifiers exchanged on the
//! wire -- distinct from the `thiserror` enums elsewhere in the workspace,
//! which carry Rust-side context for logs rather than peer-facing codes.

use serde::{Deserialize, Serialize};

/// General + RPC-scoped error codes, exact symbolic identifiers per the
/// wire contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    // General
    Internal,
    AuthRequired,
    AuthFailed,
    ReplicationFailed,
    InvalidRequest,
    ProtoVsnMismatch,
    SchemaVsnMismatch,
    // Replication start
    BehindWindow,
    InvalidPosition,
    SubscriptionNotFound,
    MalformedLsn,
    UnknownSchemaVsn,
    // Subscribe
    SubscriptionIdAlreadyExists,
    ShapeRequestError,
    // Snapshot delivery
    ShapeDeliveryError,
}

impl ErrorCode {
    /// The exact wire identifier, per `spec.md` §6.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Internal => "INTERNAL",
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::AuthFailed => "AUTH_FAILED",
            ErrorCode::ReplicationFailed => "REPLICATION_FAILED",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::ProtoVsnMismatch => "PROTO_VSN_MISMATCH",
            ErrorCode::SchemaVsnMismatch => "SCHEMA_VSN_MISMATCH",
            ErrorCode::BehindWindow => "BEHIND_WINDOW",
            ErrorCode::InvalidPosition => "INVALID_POSITION",
            ErrorCode::SubscriptionNotFound => "SUBSCRIPTION_NOT_FOUND",
            ErrorCode::MalformedLsn => "MALFORMED_LSN",
            ErrorCode::UnknownSchemaVsn => "UNKNOWN_SCHEMA_VSN",
            ErrorCode::SubscriptionIdAlreadyExists => "SUBSCRIPTION_ID_ALREADY_EXISTS",
            ErrorCode::ShapeRequestError => "SHAPE_REQUEST_ERROR",
            ErrorCode::ShapeDeliveryError => "SHAPE_DELIVERY_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inner `ShapeRequestError` reasons (`spec.md` §4.7, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeRequestErrorCode {
    TableNotFound,
    ReferentialIntegrityViolation,
    EmptyShapeDefinition,
    DuplicateTableInShape,
}

impl ShapeRequestErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ShapeRequestErrorCode::TableNotFound => "TABLE_NOT_FOUND",
            ShapeRequestErrorCode::ReferentialIntegrityViolation => {
                "REFERENTIAL_INTEGRITY_VIOLATION"
            }
            ShapeRequestErrorCode::EmptyShapeDefinition => "EMPTY_SHAPE_DEFINITION",
            ShapeRequestErrorCode::DuplicateTableInShape => {
                "DUPLICATE_TABLE_IN_SHAPE_DEFINITION"
            }
        }
    }
}

/// Inner `ShapeDeliveryError` reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShapeDeliveryErrorCode {
    ShapeSizeLimitExceeded,
}

impl ShapeDeliveryErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ShapeDeliveryErrorCode::ShapeSizeLimitExceeded => "SHAPE_SIZE_LIMIT_EXCEEDED",
        }
    }
}

/// One entry in a `ShapeRequestError` or `SubsDataError` detail list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeRequestErrorDetail {
    pub request_id: String,
    pub code: ShapeRequestErrorCode,
    pub table_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeDeliveryErrorDetail {
    pub request_id: String,
    pub code: ShapeDeliveryErrorCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_strings_match_wire_contract() {
        assert_eq!(ErrorCode::Internal.as_str(), "INTERNAL");
        assert_eq!(ErrorCode::BehindWindow.as_str(), "BEHIND_WINDOW");
        assert_eq!(
            ErrorCode::SubscriptionIdAlreadyExists.as_str(),
            "SUBSCRIPTION_ID_ALREADY_EXISTS"
        );
        assert_eq!(
            ShapeRequestErrorCode::DuplicateTableInShape.as_str(),
            "DUPLICATE_TABLE_IN_SHAPE_DEFINITION"
        );
        assert_eq!(
            ShapeDeliveryErrorCode::ShapeSizeLimitExceeded.as_str(),
            "SHAPE_SIZE_LIMIT_EXCEEDED"
        );
    }
}
