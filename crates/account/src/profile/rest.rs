//! REST profile store client.
//!
//! Documents live at `v1/profiles/{subject}`. Reads are keyed lookups with
//! 404 mapped to "no record"; writes are `PUT` (create) and `PATCH`
//! (partial update, bearer-authorized).

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

use segno_core::SubjectId;

use crate::config::AccountConfig;
use crate::profile::{ProfileError, ProfileRecord, ProfileStore, ProfileUpdate};

/// Client for the hosted profile document store.
#[derive(Clone)]
pub struct RestProfileStore {
    inner: Arc<RestProfileInner>,
}

struct RestProfileInner {
    http: reqwest::Client,
    base_url: Url,
}

impl RestProfileStore {
    /// Create a new profile store client from configuration.
    #[must_use]
    pub fn new(config: &AccountConfig) -> Self {
        Self {
            inner: Arc::new(RestProfileInner {
                http: reqwest::Client::new(),
                base_url: config.profile_store_url.clone(),
            }),
        }
    }

    fn document_url(&self, id: &SubjectId) -> Result<Url, ProfileError> {
        self.inner
            .base_url
            .join(&format!("v1/profiles/{id}"))
            .map_err(|err| ProfileError::InvalidDocument(err.to_string()))
    }
}

#[async_trait]
impl ProfileStore for RestProfileStore {
    async fn get_profile(&self, id: &SubjectId) -> Result<Option<ProfileRecord>, ProfileError> {
        let url = self.document_url(id)?;
        let response = self.inner.http.get(url).send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let record = response
                    .json::<ProfileRecord>()
                    .await
                    .map_err(|err| ProfileError::InvalidDocument(err.to_string()))?;
                Ok(Some(record))
            }
            status => Err(ProfileError::Store { status }),
        }
    }

    async fn create_profile(
        &self,
        id: &SubjectId,
        record: &ProfileRecord,
    ) -> Result<(), ProfileError> {
        let url = self.document_url(id)?;
        let response = self.inner.http.put(url).json(record).send().await?;

        if response.status().is_success() {
            tracing::info!(subject = %id, "profile record created");
            Ok(())
        } else {
            Err(ProfileError::Store {
                status: response.status(),
            })
        }
    }

    async fn update_profile(
        &self,
        id: &SubjectId,
        changes: &ProfileUpdate,
        token: &str,
    ) -> Result<(), ProfileError> {
        let url = self.document_url(id)?;
        let response = self
            .inner
            .http
            .patch(url)
            .bearer_auth(token)
            .json(changes)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ProfileError::Store {
                status: response.status(),
            })
        }
    }
}
