//! Account layer configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SEGNO_IDENTITY_API_KEY` - API key for the identity service
//! - `SEGNO_IDENTITY_URL` - Base URL of the identity service
//! - `SEGNO_SECURE_TOKEN_URL` - Base URL of the token refresh endpoint
//! - `SEGNO_PROFILE_STORE_URL` - Base URL of the profile document store
//! - `SEGNO_API_URL` - Base URL of the Segno backend API

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Account layer configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct AccountConfig {
    /// API key identifying this client to the identity service.
    pub api_key: SecretString,
    /// Identity service base URL.
    pub identity_url: Url,
    /// Token refresh endpoint base URL.
    pub secure_token_url: Url,
    /// Profile document store base URL.
    pub profile_store_url: Url,
    /// Segno backend API base URL.
    pub api_url: Url,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("api_key", &"[REDACTED]")
            .field("identity_url", &self.identity_url.as_str())
            .field("secure_token_url", &self.secure_token_url.as_str())
            .field("profile_store_url", &self.profile_store_url.as_str())
            .field("api_url", &self.api_url.as_str())
            .finish()
    }
}

impl AccountConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, not valid
    /// URLs, or if the API key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Ok(Self {
            api_key: get_validated_secret("SEGNO_IDENTITY_API_KEY")?,
            identity_url: get_url("SEGNO_IDENTITY_URL")?,
            secure_token_url: get_url("SEGNO_SECURE_TOKEN_URL")?,
            profile_store_url: get_url("SEGNO_PROFILE_STORE_URL")?,
            api_url: get_url("SEGNO_API_URL")?,
        })
    }

    /// Fixed configuration for unit tests; points at unroutable hosts.
    #[cfg(test)]
    #[allow(clippy::unwrap_used)]
    pub(crate) fn for_tests() -> Self {
        Self {
            api_key: SecretString::from("k9Qf27ZpLmW4"),
            identity_url: Url::parse("https://identity.test.invalid/").unwrap(),
            secure_token_url: Url::parse("https://token.test.invalid/").unwrap(),
            profile_store_url: Url::parse("https://profiles.test.invalid/").unwrap(),
            api_url: Url::parse("https://api.test.invalid/").unwrap(),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable parsed as a URL.
fn get_url(key: &str) -> Result<Url, ConfigError> {
    let value = get_required_env(key)?;
    Url::parse(&value).map_err(|err| ConfigError::InvalidEnvVar(key.to_string(), err.to_string()))
}

/// Validate that a secret is not a placeholder.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
