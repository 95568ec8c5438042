//! Verified-token claim extraction and normalization.
//! The verifier resolves signature, expiry, revocation and account status;
//! nothing here re-derives them. This module only normalizes what a verified
//! token asserts into a `ClaimSet` the rest of the core can trust.

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

/// Upstream sign-in mechanism as reported by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Federated single sign-on (e.g. the school's Microsoft tenancy).
    FederatedSso,
    /// Provider-hosted email+password accounts.
    Password,
    /// Anything else the provider may report (anonymous, phone, ...).
    Other,
}

impl Provider {
    /// Map the provider's wire string onto our enum. Federated issuers the
    /// deployment recognizes are listed here in one place.
    pub fn from_wire(s: &str) -> Provider {
        match s {
            "microsoft.com" => Provider::FederatedSso,
            "password" => Provider::Password,
            _ => Provider::Other,
        }
    }
}

/// Normalized claims from one verified token. Ephemeral: one per
/// verification call, consumed by the resolver and dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSet {
    /// Stable per-provider subject identifier. Always present.
    pub external_id: String,
    /// Verified email, if the provider shared one. Already normalized.
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub provider: Provider,
}

/// Distinct verification failure signals. Never conflated: each maps to a
/// different caller-facing status and a different remedial action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("token missing")]
    Missing,
    #[error("token invalid: {reason}")]
    Invalid { reason: String },
    #[error("token expired")]
    Expired,
    #[error("token revoked")]
    Revoked,
    #[error("subject account disabled")]
    Disabled,
    #[error("verification backend unreachable: {reason}")]
    Unavailable { reason: String },
}

/// The external identity-provider verification call.
#[async_trait::async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, raw_token: &str) -> Result<ClaimSet, VerificationError>;
}

#[async_trait::async_trait]
impl<V: TokenVerifier + ?Sized> TokenVerifier for std::sync::Arc<V> {
    async fn verify(&self, raw_token: &str) -> Result<ClaimSet, VerificationError> {
        (**self).verify(raw_token).await
    }
}

/// Canonical email comparison key: NFC-normalized, trimmed, lowercased.
/// Both the conflict check and the allow-list lookup go through this.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().nfc().collect::<String>().to_lowercase()
}

fn non_blank(raw: Option<String>) -> Option<String> {
    match raw {
        Some(s) => {
            let t = s.trim();
            if t.is_empty() { None } else { Some(t.to_string()) }
        }
        None => None,
    }
}

/// Wraps a `TokenVerifier` and yields normalized claim sets.
///
/// Rejects empty tokens before any network call, lowercases emails and maps
/// blank optional claims to `None` so downstream comparisons never see
/// whitespace variants of the same value.
pub struct ClaimsExtractor<V> {
    verifier: V,
}

impl<V: TokenVerifier> ClaimsExtractor<V> {
    pub fn new(verifier: V) -> Self {
        Self { verifier }
    }

    pub async fn extract(&self, raw_token: &str) -> Result<ClaimSet, VerificationError> {
        if raw_token.trim().is_empty() {
            return Err(VerificationError::Missing);
        }
        let mut claims = self.verifier.verify(raw_token).await?;
        claims.email = non_blank(claims.email).map(|e| normalize_email(&e));
        claims.display_name = non_blank(claims.display_name);
        Ok(claims)
    }
}
