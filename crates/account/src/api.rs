//! Token-authorized requests against the Segno backend.
//!
//! Callers never manage token lifetime: a fresh bearer token is obtained
//! from the identity provider immediately before each dispatch (the
//! provider silently refreshes one it knows to be stale). With no active
//! session the request fails fast, before anything goes on the wire.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use thiserror::Error;
use url::Url;

use crate::config::AccountConfig;
use crate::identity::{IdentityError, IdentityProvider};
use crate::profile::ProfileUpdate;

/// Errors surfaced by authorized requests.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No active session; the request was not dispatched.
    #[error("not signed in")]
    Unauthenticated,

    /// Backend rejected the token (401/403). Not retried here - the caller
    /// decides between a session refresh and re-authentication.
    #[error("request rejected by the backend ({status})")]
    AuthorizationRejected {
        /// The rejecting status code.
        status: StatusCode,
    },

    /// Backend answered with a non-auth error status.
    #[error("backend error ({status})")]
    Backend {
        /// The failing status code.
        status: StatusCode,
    },

    /// Obtaining the token failed for a reason other than being signed
    /// out.
    #[error("token unavailable: {0}")]
    Identity(IdentityError),

    /// The request path was not valid relative to the API base.
    #[error("invalid request path: {0}")]
    InvalidPath(String),

    /// Network-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client for mutating requests that must carry a bearer token.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base_url: Url,
    provider: Arc<dyn IdentityProvider>,
}

impl ApiClient {
    /// Create a new API client.
    #[must_use]
    pub fn new(config: &AccountConfig, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            inner: Arc::new(ApiClientInner {
                http: reqwest::Client::new(),
                base_url: config.api_url.clone(),
                provider,
            }),
        }
    }

    /// Dispatch an authorized request.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Unauthenticated`] without dispatching when no
    /// session is active, and [`ApiError::AuthorizationRejected`] when the
    /// backend answers 401 or 403. Any other response is handed back to
    /// the caller as-is.
    pub async fn authorized_request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, ApiError> {
        let token = self
            .inner
            .provider
            .token(false)
            .await
            .map_err(|err| match err {
                IdentityError::NoSession => ApiError::Unauthenticated,
                other => ApiError::Identity(other),
            })?;

        let url = self
            .inner
            .base_url
            .join(path)
            .map_err(|err| ApiError::InvalidPath(err.to_string()))?;

        let mut request = self.inner.http.request(method, url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(ApiError::AuthorizationRejected {
                    status: response.status(),
                })
            }
            _ => Ok(response),
        }
    }

    /// Update the signed-in account's profile through the backend.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::authorized_request`] errors; any other
    /// non-success status becomes [`ApiError::Backend`].
    pub async fn update_profile(&self, changes: &ProfileUpdate) -> Result<(), ApiError> {
        let body = serde_json::json!({
            "full_name": changes.full_name,
            "avatar_url": changes.avatar_url,
        });

        let response = self
            .authorized_request(Method::PUT, "api/auth/profile", Some(&body))
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ApiError::Backend {
                status: response.status(),
            })
        }
    }
}
