//! REST identity provider client.
//!
//! Talks to the hosted identity service over its JSON API:
//!
//! - `POST v1/accounts/sign-in` - password sign-in
//! - `POST v1/accounts/sign-up` - account creation
//! - `POST v1/accounts/update` - display-name update (bearer-authorized)
//! - `POST v1/token` - refresh grant, on the secure-token host
//!
//! The client owns the active session: a successful sign-in or sign-up
//! stores the token bundle and emits a session-changed event; sign-out
//! clears it. Tokens are refreshed lazily when a caller asks for one and
//! the cached token is within 60 seconds of expiry.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::sync::Mutex;
use url::Url;

use segno_core::{Email, SubjectId};

use crate::config::AccountConfig;
use crate::identity::types::{
    AccountResponse, CredentialRequest, ErrorResponse, RefreshRequest, RefreshResponse,
    TokenBundle, UpdateAccountRequest,
};
use crate::identity::{
    IdentityError, IdentityHandle, IdentityProvider, SessionListener, SessionListeners,
    SessionWatch,
};

/// Active session held by the client.
struct ActiveSession {
    handle: IdentityHandle,
    tokens: TokenBundle,
}

/// Client for the hosted identity service.
#[derive(Clone)]
pub struct RestIdentityClient {
    inner: Arc<RestIdentityInner>,
}

struct RestIdentityInner {
    http: reqwest::Client,
    identity_url: Url,
    token_url: Url,
    api_key: SecretString,
    listeners: SessionListeners,
    session: Mutex<Option<ActiveSession>>,
}

impl RestIdentityClient {
    /// Create a new identity client from configuration.
    #[must_use]
    pub fn new(config: &AccountConfig) -> Self {
        Self {
            inner: Arc::new(RestIdentityInner {
                http: reqwest::Client::new(),
                identity_url: config.identity_url.clone(),
                token_url: config.secure_token_url.clone(),
                api_key: config.api_key.clone(),
                listeners: SessionListeners::new(),
                session: Mutex::new(None),
            }),
        }
    }

    /// Build an endpoint URL with the API key attached.
    fn endpoint(&self, base: &Url, path: &str) -> Result<Url, IdentityError> {
        let mut url = base
            .join(path)
            .map_err(|err| IdentityError::InvalidPayload(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair("key", self.inner.api_key.expose_secret());
        Ok(url)
    }

    /// POST a JSON body and triage non-success responses into the error
    /// taxonomy.
    async fn execute(
        &self,
        url: Url,
        body: &(impl Serialize + Sync),
        bearer: Option<&str>,
    ) -> Result<reqwest::Response, IdentityError> {
        let mut request = self.inner.http.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        Err(match response.json::<ErrorResponse>().await {
            Ok(envelope) => IdentityError::from_provider_code(&envelope.error.code),
            Err(_) => IdentityError::Provider {
                code: status.to_string(),
            },
        })
    }

    /// Sign-in and sign-up share everything but the endpoint.
    async fn authenticate(
        &self,
        path: &str,
        email: &str,
        secret: &str,
    ) -> Result<IdentityHandle, IdentityError> {
        let url = self.endpoint(&self.inner.identity_url, path)?;
        let account: AccountResponse = self
            .execute(url, &CredentialRequest { email, secret }, None)
            .await?
            .json()
            .await?;

        let handle = parse_handle(&account)?;
        let tokens = TokenBundle::new(account.id_token, account.refresh_token, account.expires_in);

        {
            let mut session = self.inner.session.lock().await;
            *session = Some(ActiveSession {
                handle: handle.clone(),
                tokens,
            });
        }

        tracing::info!(subject = %handle.subject, "identity session established");
        self.inner.listeners.emit(Some(&handle));
        Ok(handle)
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityClient {
    fn on_session_changed(&self, listener: SessionListener) -> SessionWatch {
        let listener = Arc::new(listener);
        let watch = self.inner.listeners.register(Box::new({
            let listener = Arc::clone(&listener);
            move |identity| (*listener)(identity)
        }));

        // Initial delivery happens off the registration call so the caller
        // never observes its own listener re-entrantly.
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let handle = inner
                .session
                .lock()
                .await
                .as_ref()
                .map(|session| session.handle.clone());
            (*listener)(handle.as_ref());
        });

        watch
    }

    async fn sign_in(&self, email: &str, secret: &str) -> Result<IdentityHandle, IdentityError> {
        self.authenticate("v1/accounts/sign-in", email, secret)
            .await
    }

    async fn sign_up(&self, email: &str, secret: &str) -> Result<IdentityHandle, IdentityError> {
        self.authenticate("v1/accounts/sign-up", email, secret)
            .await
    }

    async fn update_display_name(&self, name: &str) -> Result<(), IdentityError> {
        let token = self.token(false).await?;
        let url = self.endpoint(&self.inner.identity_url, "v1/accounts/update")?;
        self.execute(
            url,
            &UpdateAccountRequest { display_name: name },
            Some(&token),
        )
        .await?;

        // Keep the cached handle in line with the provider. No event: the
        // session itself did not change.
        let mut session = self.inner.session.lock().await;
        if let Some(active) = session.as_mut() {
            active.handle.display_name = Some(name.to_owned());
        }
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        let had_session = {
            let mut session = self.inner.session.lock().await;
            session.take().is_some()
        };

        // Idempotent: signing out twice resolves without a second event.
        if had_session {
            tracing::info!("identity session ended");
            self.inner.listeners.emit(None);
        }
        Ok(())
    }

    async fn token(&self, force_refresh: bool) -> Result<String, IdentityError> {
        let mut session = self.inner.session.lock().await;
        let active = session.as_mut().ok_or(IdentityError::NoSession)?;

        if !force_refresh && !active.tokens.is_stale() {
            return Ok(active.tokens.id_token.clone());
        }

        let url = self.endpoint(&self.inner.token_url, "v1/token")?;
        let refreshed: RefreshResponse = self
            .execute(
                url,
                &RefreshRequest {
                    grant_type: "refresh_token",
                    refresh_token: &active.tokens.refresh_token,
                },
                None,
            )
            .await
            .map_err(|err| match err {
                IdentityError::Transport(transport) => IdentityError::Transport(transport),
                _ => IdentityError::TokenRefresh,
            })?
            .json()
            .await?;

        active.tokens = TokenBundle::new(
            refreshed.id_token,
            refreshed.refresh_token,
            refreshed.expires_in,
        );
        tracing::debug!("identity token refreshed");
        Ok(active.tokens.id_token.clone())
    }
}

/// Validate the account payload into an identity handle.
fn parse_handle(account: &AccountResponse) -> Result<IdentityHandle, IdentityError> {
    let subject = SubjectId::parse(&account.subject)
        .map_err(|err| IdentityError::InvalidPayload(err.to_string()))?;
    let email = Email::parse(&account.email)
        .map_err(|err| IdentityError::InvalidPayload(err.to_string()))?;

    Ok(IdentityHandle {
        subject,
        email,
        email_verified: account.email_verified,
        display_name: account.display_name.clone(),
        avatar_url: account.avatar_url.clone(),
    })
}
