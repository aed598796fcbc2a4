//! Credential schemes and the resolved credential value a client is built from.

mod resolve;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use resolve::{env_fields, resolve_credentials, CredentialFields, ResolvedCredentials};

/// Authentication mechanism of one client instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    ApiKeySecret,
    BearerToken,
    #[serde(rename = "oauth2")]
    OAuth2,
    ApiKeyOnly,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKeySecret => write!(f, "api-key-secret"),
            Self::BearerToken => write!(f, "bearer-token"),
            Self::OAuth2 => write!(f, "oauth2"),
            Self::ApiKeyOnly => write!(f, "api-key-only"),
        }
    }
}

/// OAuth2 material. Valid only with a refresh token or a live access token.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct OAuth2Credentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Absolute expiry in unix milliseconds.
    pub expires_at_ms: Option<i64>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// Exactly one auth scheme's worth of credentials.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    ApiKeySecret { key: String, secret: String },
    BearerToken { access_token: String },
    OAuth2(OAuth2Credentials),
    ApiKeyOnly { api_key: String },
}

impl Credentials {
    pub fn scheme(&self) -> Scheme {
        match self {
            Self::ApiKeySecret { .. } => Scheme::ApiKeySecret,
            Self::BearerToken { .. } => Scheme::BearerToken,
            Self::OAuth2(_) => Scheme::OAuth2,
            Self::ApiKeyOnly { .. } => Scheme::ApiKeyOnly,
        }
    }
}

// Secrets stay out of debug output and therefore out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKeySecret { .. } => f.write_str("Credentials::ApiKeySecret(<redacted>)"),
            Self::BearerToken { .. } => f.write_str("Credentials::BearerToken(<redacted>)"),
            Self::OAuth2(creds) => write!(f, "Credentials::OAuth2({creds:?})"),
            Self::ApiKeyOnly { .. } => f.write_str("Credentials::ApiKeyOnly(<redacted>)"),
        }
    }
}

impl fmt::Debug for OAuth2Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Credentials")
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at_ms", &self.expires_at_ms)
            .field("client_id", &self.client_id)
            .finish()
    }
}
