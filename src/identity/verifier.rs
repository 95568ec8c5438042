//! HTTP-backed token verifier.
//! Calls the identity provider's token-introspection endpoint and maps its
//! outcomes onto the distinct `VerificationError` kinds. Transport problems
//! (connect failure, timeout, 5xx) are infrastructure failures and surface
//! as `Unavailable`, never as a token fault.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use super::claims::{ClaimSet, Provider, TokenVerifier, VerificationError};

/// Success body of the introspection endpoint.
#[derive(Debug, Deserialize)]
struct IntrospectBody {
    external_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    provider: Option<String>,
}

/// Error body: a short machine-readable code plus optional detail.
#[derive(Debug, Deserialize)]
struct IntrospectError {
    error: String,
    #[serde(default)]
    detail: Option<String>,
}

pub struct HttpTokenVerifier {
    client: reqwest::Client,
    introspect_url: String,
}

impl HttpTokenVerifier {
    /// `timeout` is the caller-supplied bound on the whole verification call;
    /// hitting it surfaces as `Unavailable`.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            introspect_url: format!("{}/v1/introspect", base_url.trim_end_matches('/')),
        })
    }

    fn map_error_code(code: &str, detail: Option<String>) -> VerificationError {
        match code {
            "expired" => VerificationError::Expired,
            "revoked" => VerificationError::Revoked,
            "disabled" => VerificationError::Disabled,
            // Unknown codes are treated as invalid-token: the provider did
            // examine the token and rejected it.
            other => VerificationError::Invalid {
                reason: detail.unwrap_or_else(|| other.to_string()),
            },
        }
    }
}

#[async_trait::async_trait]
impl TokenVerifier for HttpTokenVerifier {
    async fn verify(&self, raw_token: &str) -> Result<ClaimSet, VerificationError> {
        let resp = self
            .client
            .post(&self.introspect_url)
            .json(&serde_json::json!({ "token": raw_token }))
            .send()
            .await
            .map_err(|e| {
                warn!(target: "identity", error = %e, "introspection request failed");
                VerificationError::Unavailable { reason: e.to_string() }
            })?;

        let status = resp.status();
        if status.is_server_error() {
            warn!(target: "identity", status = %status, "introspection endpoint errored");
            return Err(VerificationError::Unavailable { reason: format!("upstream {}", status) });
        }
        if !status.is_success() {
            let err: IntrospectError = resp.json().await.map_err(|e| {
                VerificationError::Unavailable { reason: format!("malformed error body: {}", e) }
            })?;
            return Err(Self::map_error_code(&err.error, err.detail));
        }

        let body: IntrospectBody = resp.json().await.map_err(|e| {
            VerificationError::Unavailable { reason: format!("malformed claims body: {}", e) }
        })?;
        Ok(ClaimSet {
            external_id: body.external_id,
            email: body.email,
            display_name: body.display_name,
            provider: Provider::from_wire(body.provider.as_deref().unwrap_or("")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_distinct_kinds() {
        assert_eq!(HttpTokenVerifier::map_error_code("expired", None), VerificationError::Expired);
        assert_eq!(HttpTokenVerifier::map_error_code("revoked", None), VerificationError::Revoked);
        assert_eq!(HttpTokenVerifier::map_error_code("disabled", None), VerificationError::Disabled);
        assert_eq!(
            HttpTokenVerifier::map_error_code("bad_signature", Some("kid mismatch".into())),
            VerificationError::Invalid { reason: "kid mismatch".into() }
        );
    }

    #[test]
    fn introspect_body_tolerates_missing_optionals() {
        let body: IntrospectBody =
            serde_json::from_str(r#"{"external_id":"E1","provider":"microsoft.com"}"#).unwrap();
        assert_eq!(body.external_id, "E1");
        assert_eq!(body.email, None);
        assert_eq!(Provider::from_wire(body.provider.as_deref().unwrap()), Provider::FederatedSso);
    }
}
