//! Configuration data model.
//!
//! This module holds struct definitions plus default values. Loading and
//! profile selection stay in `config::mod`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::defaults::{DEFAULT_MAX_ATTEMPTS, DEFAULT_TIMEOUT_SECS};
use crate::api::RetryPolicy;
use crate::connectors::{AuthBinding, ConnectorSpec};
use crate::credentials::CredentialFields;

/// Raw `tether.toml` shape.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct FileConfig {
    pub default_profile: Option<String>,
    pub network: NetworkConfig,
    pub profiles: BTreeMap<String, ProfileConfig>,
    pub connectors: BTreeMap<String, ConnectorConfig>,
}

/// Network settings under `[network]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    /// Total attempts for transient failures; `1` disables retries.
    pub max_attempts: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl NetworkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_attempts(self.max_attempts)
    }
}

/// Named credential set under `[profiles.<name>]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileConfig {
    /// Connector this profile talks to; defaults to the profile name.
    #[serde(default)]
    pub connector: Option<String>,
    #[serde(flatten)]
    pub fields: CredentialFields,
}

/// User-defined connector (or preset override) under `[connectors.<name>]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(super) struct ConnectorConfig {
    pub base_url: Option<String>,
    pub env_prefix: Option<String>,
    pub token_url: Option<String>,
    pub auth_url: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub auth: Option<Vec<AuthBinding>>,
    pub headers: BTreeMap<String, String>,
}

impl ConnectorConfig {
    /// Layer this table over `base` (a preset, or an empty spec).
    pub(super) fn apply_to(self, mut base: ConnectorSpec) -> ConnectorSpec {
        if let Some(url) = self.base_url {
            base.base_url = url;
        }
        if let Some(prefix) = self.env_prefix {
            base.env_prefix = prefix;
        }
        if self.token_url.is_some() {
            base.token_url = self.token_url;
        }
        if self.auth_url.is_some() {
            base.auth_url = self.auth_url;
        }
        if let Some(scopes) = self.scopes {
            base.scopes = scopes;
        }
        if let Some(auth) = self.auth {
            base.auth = auth;
        }
        for (name, value) in self.headers {
            base.default_headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
            base.default_headers.push((name, value));
        }
        base
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,
    pub network: NetworkConfig,
    pub profiles: BTreeMap<String, ProfileConfig>,
    /// Custom connectors and preset overrides, already merged.
    pub connectors: BTreeMap<String, ConnectorSpec>,
}

/// Where the config text came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicit `--config` path.
    Explicit(PathBuf),
    /// `./tether.toml`.
    Local,
    /// `$XDG_CONFIG_HOME/tether/tether.toml`.
    Global(PathBuf),
    /// No file found; runtime defaults were used.
    BuiltInDefaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit(path) | Self::Global(path) => write!(f, "{}", path.display()),
            Self::Local => write!(f, "./tether.toml"),
            Self::BuiltInDefaults => write!(f, "built-in defaults"),
        }
    }
}

/// Config plus its provenance.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub source: ConfigSource,
}
