//! Identity reconciliation orchestration.
//!
//! `reconcile` is the single gate between an inbound token and a canonical
//! local identity record: verify, look up by external id, then either
//! create (first login) or bring the mutable fields in line with the fresh
//! claims. The idempotency and role-monotonicity invariants live here, not
//! at call sites.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{ReconcileError, ReconcileResult};

use super::claims::{ClaimSet, ClaimsExtractor, TokenVerifier};
use super::classifier::{classify, effective_role, Role, TeacherAllowlist};
use super::conflict::find_email_conflict;
use super::gateway::{
    GatewayError, IdentityGateway, IdentityRecord, NewIdentity, Provisioning, UniqueField,
};
use super::handle::friendly_handle;

pub struct IdentityResolver {
    extractor: ClaimsExtractor<Arc<dyn TokenVerifier>>,
    gateway: Arc<dyn IdentityGateway>,
    allowlist: TeacherAllowlist,
}

impl IdentityResolver {
    /// Collaborators are injected; the resolver holds no other state.
    pub fn new(
        verifier: Arc<dyn TokenVerifier>,
        gateway: Arc<dyn IdentityGateway>,
        allowlist: TeacherAllowlist,
    ) -> Self {
        Self { extractor: ClaimsExtractor::new(verifier), gateway, allowlist }
    }

    pub fn gateway(&self) -> &Arc<dyn IdentityGateway> {
        &self.gateway
    }

    /// Verify the token and return the canonical identity record for it,
    /// creating or updating the local record as needed. Verification
    /// failures are surfaced as-is and never retried here.
    pub async fn reconcile(&self, raw_token: &str) -> ReconcileResult<IdentityRecord> {
        let claims = self.extractor.extract(raw_token).await?;
        match self.gateway.get_by_external_id(&claims.external_id).await? {
            Some(existing) => self.reconcile_existing(existing, &claims).await,
            None => self.first_login(&claims).await,
        }
    }

    async fn first_login(&self, claims: &ClaimSet) -> ReconcileResult<IdentityRecord> {
        let role = classify(claims, &self.allowlist);

        if let Some(email) = &claims.email {
            if let Some(owner) = find_email_conflict(self.gateway.as_ref(), email, &claims.external_id).await? {
                warn!(
                    target: "identity",
                    external_id = %claims.external_id,
                    email = %email,
                    "email already owned by another identity, refusing to create"
                );
                return Err(ReconcileError::EmailConflict { email: email.clone(), owner });
            }
        }

        let display_name = claims
            .display_name
            .clone()
            .or_else(|| claims.email.clone())
            .or_else(|| Some(friendly_handle()));
        let new = NewIdentity {
            external_id: claims.external_id.clone(),
            email: claims.email.clone(),
            display_name,
            role,
            provisioned: Provisioning::Automatic,
        };

        match self.gateway.create(new).await {
            Ok(record) => {
                info!(
                    target: "identity",
                    external_id = %record.external_id,
                    local_id = %record.local_id,
                    role = ?record.role,
                    "created identity on first login"
                );
                Ok(record)
            }
            Err(GatewayError::Duplicate { field: UniqueField::ExternalId }) => {
                // A concurrent first login won the insert. The record exists
                // now; re-read and continue as a normal repeat login.
                info!(
                    target: "identity",
                    external_id = %claims.external_id,
                    "create lost a concurrent first-login race, recovering"
                );
                let existing = self
                    .gateway
                    .get_by_external_id(&claims.external_id)
                    .await?
                    .ok_or_else(|| ReconcileError::PersistenceFailure {
                        reason: format!(
                            "identity {} missing after duplicate-key insert",
                            claims.external_id
                        ),
                    })?;
                self.reconcile_existing(existing, claims).await
            }
            Err(GatewayError::Duplicate { field: UniqueField::Email }) => {
                // A conflicting identity committed this email between our
                // check and the insert. Same outcome as a detected conflict.
                let email = claims.email.clone().unwrap_or_default();
                match find_email_conflict(self.gateway.as_ref(), &email, &claims.external_id).await? {
                    Some(owner) => Err(ReconcileError::EmailConflict { email, owner }),
                    None => Err(ReconcileError::PersistenceFailure {
                        reason: format!("email {} uniquely constrained but owner not found", email),
                    }),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn reconcile_existing(
        &self,
        existing: IdentityRecord,
        claims: &ClaimSet,
    ) -> ReconcileResult<IdentityRecord> {
        let mut next = existing.clone();

        // Provider-side email changes propagate, but never at the cost of
        // capturing an email another identity owns; on collision the email
        // update alone is skipped and the login still succeeds.
        if let Some(new_email) = &claims.email {
            if existing.email.as_deref() != Some(new_email.as_str()) {
                match find_email_conflict(self.gateway.as_ref(), new_email, &claims.external_id).await? {
                    Some(_) => {
                        warn!(
                            target: "identity",
                            external_id = %claims.external_id,
                            email = %new_email,
                            "changed email already owned elsewhere, keeping stored email"
                        );
                    }
                    None => next.email = Some(new_email.clone()),
                }
            }
        }

        if let Some(name) = &claims.display_name {
            if existing.display_name.as_deref() != Some(name.as_str()) {
                next.display_name = Some(name.clone());
            }
        }

        let role = effective_role(claims, Some(&existing), &self.allowlist);
        if existing.role == Role::Student && role == Role::Teacher {
            info!(
                target: "identity",
                external_id = %existing.external_id,
                local_id = %existing.local_id,
                "escalating role to teacher"
            );
        }
        next.role = role;

        if next == existing {
            // Nothing to write; repeat reconciles are observably idempotent.
            return Ok(existing);
        }

        match self.gateway.update(&next).await {
            Ok(record) => Ok(record),
            Err(GatewayError::Duplicate { field: UniqueField::Email }) => {
                // The conflict check raced a concurrent email grab. Apply the
                // skip rule: revert the email, keep the rest of the update.
                warn!(
                    target: "identity",
                    external_id = %existing.external_id,
                    "email update raced a concurrent owner, reverting email field"
                );
                next.email = existing.email.clone();
                if next == existing {
                    Ok(existing)
                } else {
                    Ok(self.gateway.update(&next).await?)
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "resolver_tests.rs"]
mod resolver_tests;
