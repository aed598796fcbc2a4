//! Connector descriptions: where an API lives and how it authenticates.
//!
//! A connector is data, not code. Adding a provider means adding a preset
//! here (or a `[connectors.<name>]` table in the config file), never a new
//! client type.

use serde::Deserialize;

use crate::auth::strategy::AuthStrategy;
use crate::credentials::Scheme;
use crate::error::ConfigurationError;

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// One accepted credential scheme and the wire placement it uses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthBinding {
    pub scheme: Scheme,
    pub strategy: AuthStrategy,
}

impl AuthBinding {
    pub fn new(scheme: Scheme, strategy: AuthStrategy) -> Self {
        Self { scheme, strategy }
    }
}

/// Everything the core needs to know about one third-party API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectorSpec {
    pub name: String,
    /// Prefix of the documented env vars, e.g. `GODADDY` for `GODADDY_API_KEY`.
    pub env_prefix: String,
    /// Empty when the API has no canonical host (self-hosted installs).
    pub base_url: String,
    pub token_url: Option<String>,
    pub auth_url: Option<String>,
    pub scopes: Vec<String>,
    /// Accepted schemes, highest priority first.
    pub auth: Vec<AuthBinding>,
    pub default_headers: Vec<(String, String)>,
}

impl ConnectorSpec {
    /// Reject bindings whose strategy cannot carry their scheme.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.auth.is_empty() {
            return Err(ConfigurationError::Invalid(format!(
                "connector `{}` declares no auth binding",
                self.name
            )));
        }
        for binding in &self.auth {
            if !binding.strategy.accepts(binding.scheme) {
                return Err(ConfigurationError::Invalid(format!(
                    "connector `{}`: strategy {:?} cannot carry {} credentials",
                    self.name, binding.strategy, binding.scheme
                )));
            }
        }
        if self.env_prefix.trim().is_empty() {
            return Err(ConfigurationError::Invalid(format!(
                "connector `{}` has an empty env_prefix",
                self.name
            )));
        }
        Ok(())
    }
}

/// Names of all built-in presets, in display order.
pub const BUILTIN_CONNECTORS: &[&str] = &[
    "godaddy",
    "elevenlabs",
    "figma",
    "google-sheets",
    "google-contacts",
    "google-drive",
    "wordpress",
    "openai",
];

/// Look up a built-in preset by name.
pub fn builtin_connector(name: &str) -> Option<ConnectorSpec> {
    let spec = match name {
        "godaddy" => preset(
            name,
            "GODADDY",
            "https://api.godaddy.com",
            vec![AuthBinding::new(Scheme::ApiKeySecret, AuthStrategy::SsoKey)],
        ),
        "elevenlabs" => preset(
            name,
            "ELEVENLABS",
            "https://api.elevenlabs.io",
            vec![AuthBinding::new(
                Scheme::BearerToken,
                AuthStrategy::Header {
                    name: "xi-api-key".to_string(),
                },
            )],
        ),
        "figma" => preset(
            name,
            "FIGMA",
            "https://api.figma.com",
            vec![AuthBinding::new(
                Scheme::BearerToken,
                AuthStrategy::Header {
                    name: "X-Figma-Token".to_string(),
                },
            )],
        ),
        "google-sheets" => google(
            name,
            "GOOGLE_SHEETS",
            "https://sheets.googleapis.com",
            &["https://www.googleapis.com/auth/spreadsheets"],
            true,
        ),
        "google-contacts" => google(
            name,
            "GOOGLE_CONTACTS",
            "https://people.googleapis.com",
            &["https://www.googleapis.com/auth/contacts"],
            false,
        ),
        "google-drive" => google(
            name,
            "GOOGLE_DRIVE",
            "https://www.googleapis.com/drive/v3",
            &[
                "https://www.googleapis.com/auth/drive.readonly",
                "https://www.googleapis.com/auth/drive.file",
            ],
            false,
        ),
        "wordpress" => preset(
            name,
            "WORDPRESS",
            "",
            vec![AuthBinding::new(Scheme::ApiKeySecret, AuthStrategy::Basic)],
        ),
        "openai" => preset(
            name,
            "OPENAI",
            "https://api.openai.com/v1",
            vec![AuthBinding::new(Scheme::BearerToken, AuthStrategy::Bearer)],
        ),
        _ => return None,
    };
    Some(spec)
}

fn preset(name: &str, env_prefix: &str, base_url: &str, auth: Vec<AuthBinding>) -> ConnectorSpec {
    ConnectorSpec {
        name: name.to_string(),
        env_prefix: env_prefix.to_string(),
        base_url: base_url.to_string(),
        token_url: None,
        auth_url: None,
        scopes: Vec::new(),
        auth,
        default_headers: Vec::new(),
    }
}

fn google(
    name: &str,
    env_prefix: &str,
    base_url: &str,
    scopes: &[&str],
    read_only_key: bool,
) -> ConnectorSpec {
    let mut auth = vec![AuthBinding::new(Scheme::OAuth2, AuthStrategy::Bearer)];
    if read_only_key {
        auth.push(AuthBinding::new(
            Scheme::ApiKeyOnly,
            AuthStrategy::QueryKey {
                param: "key".to_string(),
            },
        ));
    }
    ConnectorSpec {
        token_url: Some(GOOGLE_TOKEN_URL.to_string()),
        auth_url: Some(GOOGLE_AUTH_URL.to_string()),
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
        ..preset(name, env_prefix, base_url, auth)
    }
}

/// Default env prefix for a custom connector: `my-api` becomes `MY_API`.
pub fn default_env_prefix(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_builtin_preset_resolves_and_validates() {
        for name in BUILTIN_CONNECTORS {
            let spec = builtin_connector(name).unwrap_or_else(|| panic!("missing preset {name}"));
            assert_eq!(spec.name, *name);
            spec.validate()
                .unwrap_or_else(|e| panic!("preset {name} invalid: {e}"));
        }
        assert!(builtin_connector("nope").is_none());
    }

    #[test]
    fn google_presets_carry_token_endpoint() {
        let drive = builtin_connector("google-drive").expect("preset");
        assert_eq!(drive.token_url.as_deref(), Some(GOOGLE_TOKEN_URL));
        assert_eq!(drive.scopes.len(), 2);
        assert_eq!(drive.auth[0].scheme, Scheme::OAuth2);
    }

    #[test]
    fn validate_rejects_incompatible_binding() {
        let mut spec = builtin_connector("godaddy").expect("preset");
        spec.auth = vec![AuthBinding::new(Scheme::OAuth2, AuthStrategy::SsoKey)];
        let err = spec.validate().expect_err("must fail");
        assert!(err.to_string().contains("cannot carry oauth2"), "got: {err}");
    }

    #[test]
    fn default_env_prefix_upper_snakes_name() {
        assert_eq!(default_env_prefix("my-api.v2"), "MY_API_V2");
    }
}
