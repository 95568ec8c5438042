//! Caller-facing reconciliation error model and mapping helpers.
//! This module provides the single error enum every authenticated route sees,
//! along with the HTTP status mapping each kind carries. Each kind is a
//! distinct, actionable signal: re-authenticate, retry later, or contact an
//! administrator. Kinds are never conflated.

use serde::{Deserialize, Serialize};

use crate::identity::{GatewayError, IdentityDescriptor, VerificationError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileError {
    #[error("authentication token is missing")]
    TokenMissing,
    #[error("invalid authentication token: {reason}")]
    TokenInvalid { reason: String },
    #[error("authentication token has expired")]
    TokenExpired,
    #[error("authentication token has been revoked")]
    TokenRevoked,
    #[error("account has been disabled")]
    AccountDisabled,
    #[error("identity verification service unavailable: {reason}")]
    VerificationServiceUnavailable { reason: String },
    #[error("email {email} is already associated with a different account")]
    EmailConflict {
        email: String,
        /// Opaque descriptor of the identity currently holding the email.
        /// Enough for an operator-facing message, nothing more.
        owner: IdentityDescriptor,
    },
    #[error("persistence failure: {reason}")]
    PersistenceFailure { reason: String },
}

impl ReconcileError {
    /// Stable machine-readable kind label, used in response bodies and logs.
    pub fn kind_str(&self) -> &'static str {
        match self {
            ReconcileError::TokenMissing => "token_missing",
            ReconcileError::TokenInvalid { .. } => "token_invalid",
            ReconcileError::TokenExpired => "token_expired",
            ReconcileError::TokenRevoked => "token_revoked",
            ReconcileError::AccountDisabled => "account_disabled",
            ReconcileError::VerificationServiceUnavailable { .. } => "verification_unavailable",
            ReconcileError::EmailConflict { .. } => "email_conflict",
            ReconcileError::PersistenceFailure { .. } => "persistence_failure",
        }
    }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            ReconcileError::TokenMissing => 401,
            ReconcileError::TokenInvalid { .. } => 401,
            ReconcileError::TokenExpired => 401,
            ReconcileError::TokenRevoked => 401,
            ReconcileError::AccountDisabled => 403,
            ReconcileError::VerificationServiceUnavailable { .. } => 503,
            ReconcileError::EmailConflict { .. } => 409,
            ReconcileError::PersistenceFailure { .. } => 500,
        }
    }
}

/// Verification failures propagate unchanged as the corresponding kind.
impl From<VerificationError> for ReconcileError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::Missing => ReconcileError::TokenMissing,
            VerificationError::Invalid { reason } => ReconcileError::TokenInvalid { reason },
            VerificationError::Expired => ReconcileError::TokenExpired,
            VerificationError::Revoked => ReconcileError::TokenRevoked,
            VerificationError::Disabled => ReconcileError::AccountDisabled,
            VerificationError::Unavailable { reason } => {
                ReconcileError::VerificationServiceUnavailable { reason }
            }
        }
    }
}

/// Storage failures surface as PersistenceFailure. The benign create-race
/// (`GatewayError::Duplicate` on external_id) is recovered inside the
/// resolver and must never reach this conversion.
impl From<GatewayError> for ReconcileError {
    fn from(err: GatewayError) -> Self {
        ReconcileError::PersistenceFailure { reason: err.to_string() }
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(ReconcileError::TokenMissing.http_status(), 401);
        assert_eq!(ReconcileError::TokenInvalid { reason: "bad sig".into() }.http_status(), 401);
        assert_eq!(ReconcileError::TokenExpired.http_status(), 401);
        assert_eq!(ReconcileError::TokenRevoked.http_status(), 401);
        assert_eq!(ReconcileError::AccountDisabled.http_status(), 403);
        assert_eq!(
            ReconcileError::VerificationServiceUnavailable { reason: "timeout".into() }.http_status(),
            503
        );
        assert_eq!(ReconcileError::PersistenceFailure { reason: "io".into() }.http_status(), 500);
    }

    #[test]
    fn conflict_maps_to_409_and_serializes_kind_tag() {
        let err = ReconcileError::EmailConflict {
            email: "t@x.org".into(),
            owner: IdentityDescriptor {
                local_id: uuid::Uuid::nil(),
                display_name: Some("Ms T".into()),
            },
        };
        assert_eq!(err.http_status(), 409);
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v.get("kind").and_then(|k| k.as_str()), Some("email_conflict"));
        assert_eq!(v.get("email").and_then(|e| e.as_str()), Some("t@x.org"));
        // The owner descriptor must not leak anything beyond id + display name
        let owner = v.get("owner").unwrap().as_object().unwrap();
        assert_eq!(owner.len(), 2);
    }

    #[test]
    fn verification_errors_map_kind_for_kind() {
        let e: ReconcileError = VerificationError::Expired.into();
        assert_eq!(e, ReconcileError::TokenExpired);
        let e: ReconcileError = VerificationError::Unavailable { reason: "connect".into() }.into();
        assert_eq!(e.kind_str(), "verification_unavailable");
    }
}
