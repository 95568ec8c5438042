//! Persistence gateway contract and the in-process implementation.
//!
//! The resolver only ever talks to `IdentityGateway`; durable deployments
//! put a relational store behind it. `MemoryGateway` backs the dev server
//! and the test suite: every create/update runs inside one write-lock
//! critical section, which is the transactional boundary the resolver
//! relies on: a record is either fully inserted or absent, and the
//! uniqueness constraints are checked and applied atomically.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tprintln;

use super::claims::normalize_email;
use super::classifier::Role;

/// How the record came to exist: automatic self-registration on first login,
/// or administrative creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provisioning {
    Automatic,
    Administrative,
}

/// One local identity. `external_id` is the reconciliation key and immutable
/// once set; `local_id` is opaque and owned by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub local_id: Uuid,
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
    pub provisioned: Provisioning,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field set for a record that does not exist yet. The gateway assigns
/// `local_id` and the timestamps.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub external_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub role: Role,
    pub provisioned: Provisioning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    ExternalId,
    Email,
}

impl Display for UniqueField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueField::ExternalId => write!(f, "external_id"),
            UniqueField::Email => write!(f, "email"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// A storage uniqueness constraint rejected the write. On create with
    /// `ExternalId` this is the benign concurrent-first-login race and the
    /// resolver recovers it; everything else is a real failure.
    #[error("unique constraint violated on {field}")]
    Duplicate { field: UniqueField },
    #[error("storage failure: {0}")]
    Storage(String),
}

#[async_trait::async_trait]
pub trait IdentityGateway: Send + Sync {
    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<IdentityRecord>, GatewayError>;

    /// Case-insensitive email owner lookup, excluding the given external id.
    async fn get_by_email_excluding(
        &self,
        email: &str,
        excluding_external_id: &str,
    ) -> Result<Option<IdentityRecord>, GatewayError>;

    /// Transactional insert. Fails with `Duplicate` if either uniqueness
    /// constraint trips; nothing is persisted in that case.
    async fn create(&self, identity: NewIdentity) -> Result<IdentityRecord, GatewayError>;

    /// Transactional update of the mutable fields (email, display_name,
    /// role), keyed by `external_id`. `local_id` and `created_at` never
    /// change.
    async fn update(&self, record: &IdentityRecord) -> Result<IdentityRecord, GatewayError>;

    async fn list(&self) -> Result<Vec<IdentityRecord>, GatewayError>;
}

#[derive(Default)]
struct MemoryState {
    /// external_id -> record
    records: HashMap<String, IdentityRecord>,
    /// normalized email -> external_id
    email_index: HashMap<String, String>,
}

/// In-process gateway. Instance state only; collaborators receive it
/// explicitly rather than through process globals.
#[derive(Default)]
pub struct MemoryGateway {
    state: RwLock<MemoryState>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl IdentityGateway for MemoryGateway {
    async fn get_by_external_id(&self, external_id: &str) -> Result<Option<IdentityRecord>, GatewayError> {
        Ok(self.state.read().records.get(external_id).cloned())
    }

    async fn get_by_email_excluding(
        &self,
        email: &str,
        excluding_external_id: &str,
    ) -> Result<Option<IdentityRecord>, GatewayError> {
        let key = normalize_email(email);
        let st = self.state.read();
        match st.email_index.get(&key) {
            Some(eid) if eid != excluding_external_id => Ok(st.records.get(eid).cloned()),
            _ => Ok(None),
        }
    }

    async fn create(&self, identity: NewIdentity) -> Result<IdentityRecord, GatewayError> {
        let mut st = self.state.write();
        if st.records.contains_key(&identity.external_id) {
            return Err(GatewayError::Duplicate { field: UniqueField::ExternalId });
        }
        let email_key = identity.email.as_deref().map(normalize_email);
        if let Some(key) = &email_key {
            if st.email_index.contains_key(key) {
                return Err(GatewayError::Duplicate { field: UniqueField::Email });
            }
        }
        let now = Utc::now();
        let record = IdentityRecord {
            local_id: Uuid::new_v4(),
            external_id: identity.external_id.clone(),
            email: identity.email,
            display_name: identity.display_name,
            role: identity.role,
            provisioned: identity.provisioned,
            created_at: now,
            updated_at: now,
        };
        if let Some(key) = email_key {
            st.email_index.insert(key, identity.external_id.clone());
        }
        st.records.insert(identity.external_id, record.clone());
        tprintln!("gateway.create external_id={} local_id={}", record.external_id, record.local_id);
        Ok(record)
    }

    async fn update(&self, record: &IdentityRecord) -> Result<IdentityRecord, GatewayError> {
        let mut st = self.state.write();
        let Some(stored) = st.records.get(&record.external_id).cloned() else {
            return Err(GatewayError::Storage(format!(
                "update of unknown identity {}",
                record.external_id
            )));
        };
        let new_key = record.email.as_deref().map(normalize_email);
        if let Some(key) = &new_key {
            if let Some(owner) = st.email_index.get(key) {
                if owner != &record.external_id {
                    return Err(GatewayError::Duplicate { field: UniqueField::Email });
                }
            }
        }
        // Re-index the email before applying the new row
        if let Some(old_email) = &stored.email {
            let old_key = normalize_email(old_email);
            if new_key.as_deref() != Some(old_key.as_str()) {
                st.email_index.remove(&old_key);
            }
        }
        if let Some(key) = new_key {
            st.email_index.insert(key, record.external_id.clone());
        }
        let updated = IdentityRecord {
            local_id: stored.local_id,
            external_id: stored.external_id.clone(),
            email: record.email.clone(),
            display_name: record.display_name.clone(),
            role: record.role,
            provisioned: stored.provisioned,
            created_at: stored.created_at,
            updated_at: Utc::now(),
        };
        st.records.insert(stored.external_id.clone(), updated.clone());
        tprintln!("gateway.update external_id={} role={:?}", updated.external_id, updated.role);
        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<IdentityRecord>, GatewayError> {
        let st = self.state.read();
        let mut out: Vec<IdentityRecord> = st.records.values().cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }
}
