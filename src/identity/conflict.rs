//! Cross-account email conflict detection.
//! A second identity-provider account must not capture an email an existing
//! local identity already owns; the collision is surfaced, never merged.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gateway::{GatewayError, IdentityGateway, IdentityRecord};

/// Non-sensitive descriptor of the identity holding a contested email:
/// enough for an operator-facing message, nothing from the record beyond
/// its opaque id and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDescriptor {
    pub local_id: Uuid,
    pub display_name: Option<String>,
}

impl From<&IdentityRecord> for IdentityDescriptor {
    fn from(rec: &IdentityRecord) -> Self {
        Self { local_id: rec.local_id, display_name: rec.display_name.clone() }
    }
}

/// Look up whether `email` is already owned by an identity other than
/// `candidate_external_id`. Callers skip the check entirely when the claim
/// set carries no email; a null email can never collide.
pub async fn find_email_conflict(
    gateway: &dyn IdentityGateway,
    email: &str,
    candidate_external_id: &str,
) -> Result<Option<IdentityDescriptor>, GatewayError> {
    let owner = gateway.get_by_email_excluding(email, candidate_external_id).await?;
    Ok(owner.as_ref().map(IdentityDescriptor::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::classifier::Role;
    use crate::identity::gateway::{MemoryGateway, NewIdentity, Provisioning};

    #[tokio::test]
    async fn reports_owner_descriptor_for_foreign_email() {
        let gw = MemoryGateway::new();
        let owner = gw
            .create(NewIdentity {
                external_id: "E1".into(),
                email: Some("t@x.org".into()),
                display_name: Some("Ms T".into()),
                role: Role::Teacher,
                provisioned: Provisioning::Automatic,
            })
            .await
            .unwrap();

        let hit = find_email_conflict(&gw, "t@x.org", "E3").await.unwrap().unwrap();
        assert_eq!(hit.local_id, owner.local_id);
        assert_eq!(hit.display_name.as_deref(), Some("Ms T"));

        // The same identity re-presenting its own email is not a conflict.
        assert!(find_email_conflict(&gw, "t@x.org", "E1").await.unwrap().is_none());
    }
}
