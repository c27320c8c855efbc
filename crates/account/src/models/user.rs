//! The merged user view-model.

use std::sync::Arc;

use segno_core::{Email, Role, SubjectId};

use crate::identity::IdentityHandle;
use crate::profile::ProfileRecord;

/// The application's read-only view of the signed-in account.
///
/// Merged from the identity handle and the profile record on every session
/// change; never mutated in place - the synchronizer always replaces the
/// whole value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// Subject id shared by both sources.
    pub id: SubjectId,
    /// Sign-in email (from the identity provider).
    pub email: Email,
    /// Whether the provider has verified the email.
    pub email_verified: bool,
    /// Display name; identity provider wins over the profile record.
    pub display_name: Option<String>,
    /// Avatar URL; identity provider wins over the profile record.
    pub avatar_url: Option<String>,
    /// Role from the profile record; `None` while the record is missing or
    /// the fetch was degraded.
    pub role: Option<Role>,
    /// Raw profile record, when one was available at merge time.
    pub profile: Option<ProfileRecord>,
}

impl User {
    /// Merge an identity handle with an optionally-fetched profile record.
    #[must_use]
    pub fn merge(handle: IdentityHandle, profile: Option<ProfileRecord>) -> Arc<Self> {
        let display_name = handle
            .display_name
            .clone()
            .or_else(|| profile.as_ref().map(|record| record.full_name.clone()));
        let avatar_url = handle
            .avatar_url
            .clone()
            .or_else(|| profile.as_ref().and_then(|record| record.avatar_url.clone()));
        let role = profile.as_ref().map(|record| record.role);

        Arc::new(Self {
            id: handle.subject,
            email: handle.email,
            email_verified: handle.email_verified,
            display_name,
            avatar_url,
            role,
            profile,
        })
    }

    /// Whether the profile half of the merge was available.
    #[must_use]
    pub const fn has_profile(&self) -> bool {
        self.profile.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn handle(display_name: Option<&str>, avatar_url: Option<&str>) -> IdentityHandle {
        IdentityHandle {
            subject: SubjectId::parse("sub-1").unwrap(),
            email: Email::parse("ann@example.com").unwrap(),
            email_verified: true,
            display_name: display_name.map(str::to_owned),
            avatar_url: avatar_url.map(str::to_owned),
        }
    }

    fn record(full_name: &str, avatar_url: Option<&str>, role: Role) -> ProfileRecord {
        ProfileRecord {
            full_name: full_name.to_owned(),
            avatar_url: avatar_url.map(str::to_owned),
            role,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_identity_fields_win_over_profile() {
        let user = User::merge(
            handle(Some("Ann"), Some("https://cdn/a.png")),
            Some(record("Ann Byrne", Some("https://cdn/old.png"), Role::Admin)),
        );
        assert_eq!(user.display_name.as_deref(), Some("Ann"));
        assert_eq!(user.avatar_url.as_deref(), Some("https://cdn/a.png"));
        assert_eq!(user.role, Some(Role::Admin));
    }

    #[test]
    fn test_profile_fills_identity_gaps() {
        let user = User::merge(
            handle(None, None),
            Some(record("Ann Byrne", Some("https://cdn/p.png"), Role::User)),
        );
        assert_eq!(user.display_name.as_deref(), Some("Ann Byrne"));
        assert_eq!(user.avatar_url.as_deref(), Some("https://cdn/p.png"));
    }

    #[test]
    fn test_degraded_merge_has_no_role() {
        let user = User::merge(handle(Some("Ann"), None), None);
        assert_eq!(user.role, None);
        assert!(!user.has_profile());
        assert_eq!(user.email.as_str(), "ann@example.com");
    }
}
