//! Role inference from a verified claim set.
//! Pure functions of their inputs; the resolver owns applying the result.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::claims::{normalize_email, ClaimSet, Provider};
use super::gateway::IdentityRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Teacher,
    Student,
}

/// Configured teacher identities, keyed by normalized email.
///
/// This is the bootstrap mechanism for the first teacher account: a
/// hand-maintained, explicitly injected list, loaded from configuration at
/// startup. Entries are compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct TeacherAllowlist {
    emails: HashSet<String>,
}

impl TeacherAllowlist {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let emails = emails
            .into_iter()
            .map(|e| normalize_email(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();
        Self { emails }
    }

    /// Parse the comma-separated configuration form.
    pub fn from_csv(csv: &str) -> Self {
        Self::new(csv.split(',').map(str::trim).filter(|s| !s.is_empty()))
    }

    pub fn contains(&self, email: &str) -> bool {
        self.emails.contains(&normalize_email(email))
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

/// Infer the role a claim set warrants. Precedence, first match wins:
/// 1. federated SSO sign-in → Teacher
/// 2. password sign-in with an allow-listed email → Teacher
/// 3. everything else → Student
pub fn classify(claims: &ClaimSet, allowlist: &TeacherAllowlist) -> Role {
    match claims.provider {
        Provider::FederatedSso => Role::Teacher,
        Provider::Password => {
            let allowlisted = claims.email.as_deref().map(|e| allowlist.contains(e)).unwrap_or(false);
            if allowlisted { Role::Teacher } else { Role::Student }
        }
        Provider::Other => Role::Student,
    }
}

/// Apply the monotonic role rule against an existing record.
///
/// The only permitted transition is Student to Teacher. A stored Teacher is
/// retained even when the fresh classification says Student, so a teacher
/// re-authenticating through a weaker sign-in path keeps the stored role.
pub fn effective_role(claims: &ClaimSet, existing: Option<&IdentityRecord>, allowlist: &TeacherAllowlist) -> Role {
    let computed = classify(claims, allowlist);
    match existing {
        Some(rec) if rec.role == Role::Teacher => Role::Teacher,
        _ => computed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::gateway::{IdentityRecord, Provisioning};

    fn claims(provider: Provider, email: Option<&str>) -> ClaimSet {
        ClaimSet {
            external_id: "E1".into(),
            email: email.map(str::to_string),
            display_name: None,
            provider,
        }
    }

    fn record_with_role(role: Role) -> IdentityRecord {
        IdentityRecord {
            local_id: uuid::Uuid::nil(),
            external_id: "E1".into(),
            email: None,
            display_name: None,
            role,
            provisioned: Provisioning::Automatic,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn federated_sso_is_teacher_regardless_of_email() {
        let allow = TeacherAllowlist::default();
        assert_eq!(classify(&claims(Provider::FederatedSso, None), &allow), Role::Teacher);
        assert_eq!(classify(&claims(Provider::FederatedSso, Some("s@x.org")), &allow), Role::Teacher);
    }

    #[test]
    fn password_needs_allowlisted_email_for_teacher() {
        let allow = TeacherAllowlist::from_csv("t@x.org, head@x.org");
        assert_eq!(classify(&claims(Provider::Password, Some("t@x.org")), &allow), Role::Teacher);
        assert_eq!(classify(&claims(Provider::Password, Some("T@X.ORG")), &allow), Role::Teacher);
        assert_eq!(classify(&claims(Provider::Password, Some("s@x.org")), &allow), Role::Student);
        assert_eq!(classify(&claims(Provider::Password, None), &allow), Role::Student);
    }

    #[test]
    fn other_provider_is_student() {
        let allow = TeacherAllowlist::from_csv("t@x.org");
        assert_eq!(classify(&claims(Provider::Other, Some("t@x.org")), &allow), Role::Student);
    }

    #[test]
    fn stored_teacher_never_downgrades() {
        let allow = TeacherAllowlist::default();
        let teacher = record_with_role(Role::Teacher);
        let got = effective_role(&claims(Provider::Password, Some("s@x.org")), Some(&teacher), &allow);
        assert_eq!(got, Role::Teacher);
    }

    #[test]
    fn stored_student_escalates_on_teacher_classification() {
        let allow = TeacherAllowlist::default();
        let student = record_with_role(Role::Student);
        let got = effective_role(&claims(Provider::FederatedSso, None), Some(&student), &allow);
        assert_eq!(got, Role::Teacher);
    }

    #[test]
    fn csv_parsing_skips_blanks() {
        let allow = TeacherAllowlist::from_csv(" t@x.org ,, head@x.org ,");
        assert_eq!(allow.len(), 2);
        assert!(allow.contains("head@x.org"));
    }
}
