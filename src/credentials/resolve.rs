//! Credential resolution over three already-loaded layers.
//!
//! Precedence per field, highest first:
//! 1. Explicit call-time override.
//! 2. Connector environment variables (`<PREFIX>_API_KEY`, ...).
//! 3. Profile values from the config file.
//!
//! Resolution is pure: the environment arrives as a lookup closure and the
//! profile as plain data, so no test has to touch real env vars or disk.

use serde::Deserialize;

use super::{Credentials, OAuth2Credentials, Scheme};
use crate::auth::strategy::AuthStrategy;
use crate::auth::token::unix_now_ms;
use crate::connectors::{AuthBinding, ConnectorSpec};
use crate::error::ConfigurationError;

/// Raw credential/settings fields from any one layer. Absent is `None`,
/// never an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CredentialFields {
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub customer_id: Option<String>,
    pub base_url: Option<String>,
    pub token_url: Option<String>,
    /// Access-token expiry in unix seconds.
    pub expires_at: Option<i64>,
}

impl CredentialFields {
    /// Drop blank strings so they never shadow a lower layer.
    pub fn normalized(self) -> Self {
        Self {
            api_key: normalized(self.api_key),
            api_secret: normalized(self.api_secret),
            access_token: normalized(self.access_token),
            refresh_token: normalized(self.refresh_token),
            client_id: normalized(self.client_id),
            client_secret: normalized(self.client_secret),
            customer_id: normalized(self.customer_id),
            base_url: normalized(self.base_url),
            token_url: normalized(self.token_url),
            expires_at: self.expires_at,
        }
    }

    /// Field-wise merge where `self` wins over `lower`.
    ///
    /// `expires_at` describes one particular access token, so it comes from
    /// whichever layer supplied the winning `access_token`.
    pub fn layered_over(self, lower: Self) -> Self {
        let expires_at = match (&self.access_token, &lower.access_token) {
            (Some(_), _) => self.expires_at,
            (None, Some(_)) => lower.expires_at,
            (None, None) => self.expires_at.or(lower.expires_at),
        };
        Self {
            api_key: self.api_key.or(lower.api_key),
            api_secret: self.api_secret.or(lower.api_secret),
            access_token: self.access_token.or(lower.access_token),
            refresh_token: self.refresh_token.or(lower.refresh_token),
            client_id: self.client_id.or(lower.client_id),
            client_secret: self.client_secret.or(lower.client_secret),
            customer_id: self.customer_id.or(lower.customer_id),
            base_url: self.base_url.or(lower.base_url),
            token_url: self.token_url.or(lower.token_url),
            expires_at,
        }
    }
}

/// Credentials plus the connection settings resolved alongside them.
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub credentials: Credentials,
    pub strategy: AuthStrategy,
    pub base_url: String,
    pub token_url: Option<String>,
    pub customer_id: Option<String>,
}

/// Read the connector's documented env vars into one layer.
pub fn env_fields<FEnv>(prefix: &str, env_lookup: &FEnv) -> Result<CredentialFields, ConfigurationError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| env_lookup(&format!("{prefix}_{suffix}"));
    let expires_at = match normalized(var("TOKEN_EXPIRES_AT")) {
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            ConfigurationError::Invalid(format!(
                "invalid {prefix}_TOKEN_EXPIRES_AT value `{raw}`: expected unix seconds"
            ))
        })?),
        None => None,
    };
    Ok(CredentialFields {
        api_key: var("API_KEY"),
        api_secret: var("API_SECRET"),
        access_token: var("ACCESS_TOKEN"),
        refresh_token: var("REFRESH_TOKEN"),
        client_id: var("CLIENT_ID"),
        client_secret: var("CLIENT_SECRET"),
        customer_id: var("CUSTOMER_ID"),
        base_url: var("BASE_URL"),
        token_url: var("TOKEN_URL"),
        expires_at,
    }
    .normalized())
}

/// Merge override > env > profile and build credentials for the first auth
/// binding of `connector` whose mandatory fields are all present.
pub fn resolve_credentials<FEnv>(
    connector: &ConnectorSpec,
    explicit: Option<&CredentialFields>,
    env_lookup: FEnv,
    profile: &CredentialFields,
) -> Result<ResolvedCredentials, ConfigurationError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    let env = env_fields(&connector.env_prefix, &env_lookup)?;
    let merged = explicit
        .cloned()
        .unwrap_or_default()
        .normalized()
        .layered_over(env)
        .layered_over(profile.clone().normalized());

    let base_url = merged
        .base_url
        .clone()
        .unwrap_or_else(|| connector.base_url.clone())
        .trim_end_matches('/')
        .to_string();
    if base_url.is_empty() {
        return Err(ConfigurationError::MissingPrerequisite {
            field: "base_url".to_string(),
            hint: format!(
                "connector `{}` has no default host; set {}_BASE_URL or base_url in the profile",
                connector.name, connector.env_prefix
            ),
        });
    }
    let token_url = merged.token_url.clone().or_else(|| connector.token_url.clone());

    let mut hints = Vec::new();
    for binding in &connector.auth {
        match credentials_for(binding, &merged, token_url.as_deref(), &connector.env_prefix) {
            Ok(credentials) => {
                return Ok(ResolvedCredentials {
                    credentials,
                    strategy: binding.strategy.clone(),
                    base_url,
                    token_url,
                    customer_id: merged.customer_id,
                });
            }
            Err(hint) => hints.push(hint),
        }
    }

    Err(ConfigurationError::MissingCredentials {
        connector: connector.name.clone(),
        hint: if hints.is_empty() {
            "connector declares no auth scheme".to_string()
        } else {
            hints.join("; or ")
        },
    })
}

fn credentials_for(
    binding: &AuthBinding,
    fields: &CredentialFields,
    token_url: Option<&str>,
    prefix: &str,
) -> Result<Credentials, String> {
    match binding.scheme {
        Scheme::ApiKeySecret => match (&fields.api_key, &fields.api_secret) {
            (Some(key), Some(secret)) => Ok(Credentials::ApiKeySecret {
                key: key.clone(),
                secret: secret.clone(),
            }),
            _ => Err(format!(
                "set {prefix}_API_KEY and {prefix}_API_SECRET (or api_key/api_secret in the profile)"
            )),
        },
        Scheme::BearerToken => fields
            .access_token
            .clone()
            .or_else(|| fields.api_key.clone())
            .map(|access_token| Credentials::BearerToken { access_token })
            .ok_or_else(|| {
                format!("set {prefix}_API_KEY or {prefix}_ACCESS_TOKEN (or api_key in the profile)")
            }),
        Scheme::ApiKeyOnly => fields
            .api_key
            .clone()
            .map(|api_key| Credentials::ApiKeyOnly { api_key })
            .ok_or_else(|| format!("set {prefix}_API_KEY (or api_key in the profile)")),
        Scheme::OAuth2 => oauth2_credentials(fields, token_url, prefix),
    }
}

fn oauth2_credentials(
    fields: &CredentialFields,
    token_url: Option<&str>,
    prefix: &str,
) -> Result<Credentials, String> {
    let expires_at_ms = fields.expires_at.map(|secs| secs.saturating_mul(1000));
    if fields.refresh_token.is_some() {
        if fields.client_id.is_none() {
            return Err(format!(
                "set {prefix}_CLIENT_ID so {prefix}_REFRESH_TOKEN can be exchanged"
            ));
        }
        if token_url.is_none() {
            return Err(format!(
                "set {prefix}_TOKEN_URL so {prefix}_REFRESH_TOKEN can be exchanged"
            ));
        }
    } else {
        let live = fields.access_token.is_some()
            && expires_at_ms.map_or(true, |expires_at| expires_at > unix_now_ms());
        if !live {
            return Err(format!(
                "set {prefix}_REFRESH_TOKEN (with {prefix}_CLIENT_ID) or a non-expired {prefix}_ACCESS_TOKEN"
            ));
        }
    }
    Ok(Credentials::OAuth2(OAuth2Credentials {
        access_token: fields.access_token.clone(),
        refresh_token: fields.refresh_token.clone(),
        expires_at_ms,
        client_id: fields.client_id.clone(),
        client_secret: fields.client_secret.clone(),
    }))
}

fn normalized(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
