//! Profile store adapter.
//!
//! Wraps the remote document store that holds one profile record per
//! account, keyed by the identity provider's subject id. The record is
//! created exactly once at registration and only ever mutated through
//! explicit update requests.

mod rest;

pub use rest::RestProfileStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use segno_core::{Role, SubjectId};

/// A profile document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Full name given at registration.
    pub full_name: String,
    /// Avatar URL, if one was uploaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Account role.
    pub role: Role,
    /// When the profile was created.
    pub created_at: DateTime<Utc>,
}

impl ProfileRecord {
    /// Build the initial record written at registration.
    #[must_use]
    pub fn initial(full_name: &str) -> Self {
        Self {
            full_name: full_name.to_owned(),
            avatar_url: None,
            role: Role::User,
            created_at: Utc::now(),
        }
    }
}

/// Partial update applied to an existing profile.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    /// New full name, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// New avatar URL, if changing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// Errors surfaced by the profile store adapter.
///
/// The session synchronizer recovers from fetch failures locally (degraded
/// identity-only merge); these errors reach callers only through explicit
/// profile mutations.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// Store rejected the request.
    #[error("profile store error ({status})")]
    Store {
        /// HTTP status returned by the store.
        status: reqwest::StatusCode,
    },

    /// The stored document could not be interpreted.
    #[error("invalid profile document: {0}")]
    InvalidDocument(String),

    /// Network-level failure talking to the store.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// A remote document store holding profile records.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Fetch the profile for a subject. `Ok(None)` means no record exists.
    ///
    /// # Errors
    ///
    /// Returns an error for transport or store failures (not for a missing
    /// record).
    async fn get_profile(&self, id: &SubjectId) -> Result<Option<ProfileRecord>, ProfileError>;

    /// Create the profile record for a subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write (including when a
    /// record already exists).
    async fn create_profile(
        &self,
        id: &SubjectId,
        record: &ProfileRecord,
    ) -> Result<(), ProfileError>;

    /// Apply a partial update to an existing profile.
    ///
    /// Mutations are authorized: `token` is attached as a bearer
    /// credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    async fn update_profile(
        &self,
        id: &SubjectId,
        changes: &ProfileUpdate,
        token: &str,
    ) -> Result<(), ProfileError>;
}
