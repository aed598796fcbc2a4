//! Configuration loading from TOML files and environment variables.
//!
//! Config is loaded in this order of precedence (highest wins):
//! 1. Environment variables (`TETHER_PROFILE`, `TETHER_TIMEOUT_SECS`,
//!    `TETHER_MAX_ATTEMPTS`)
//! 2. TOML file specified via --config CLI flag
//! 3. ./tether.toml in the current directory
//! 4. $XDG_CONFIG_HOME/tether/tether.toml (or ~/.config/tether/tether.toml)
//! 5. Built-in defaults
//!
//! Connector credentials are not resolved here; profiles are handed to
//! [`crate::credentials::resolve_credentials`] as one already-loaded layer.

use std::path::{Path, PathBuf};

use crate::connectors::{builtin_connector, default_env_prefix, ConnectorSpec, BUILTIN_CONNECTORS};
use crate::credentials::{env_fields, resolve_credentials, CredentialFields, ResolvedCredentials};
use crate::error::ConfigurationError;

mod defaults;
mod env;
mod sources;
mod types;

use env::apply_runtime_env_overrides;
use sources::read_config_text_with_sources;
pub use types::{Config, ConfigSource, LoadedConfig, NetworkConfig, ProfileConfig};
use types::FileConfig;

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Load configuration from disk and environment.
///
/// `path_override` is an explicit config file path (from --config flag).
pub fn load_config(path_override: Option<&str>) -> Result<LoadedConfig, ConfigurationError> {
    load_config_from_sources(
        path_override,
        |path| std::fs::read_to_string(path),
        |name| std::env::var(name).ok(),
        config_root_dir,
    )
}

fn load_config_from_sources<FRead, FEnv, FRoot>(
    path_override: Option<&str>,
    read_file: FRead,
    env_lookup: FEnv,
    config_root: FRoot,
) -> Result<LoadedConfig, ConfigurationError>
where
    FRead: Fn(&Path) -> Result<String, std::io::Error>,
    FEnv: Fn(&str) -> Option<String>,
    FRoot: Fn() -> Option<PathBuf>,
{
    let (config_text, source) =
        read_config_text_with_sources(path_override, &read_file, &config_root)?;
    let parsed: FileConfig = toml::from_str(&config_text)?;
    let mut config = config_from_file(parsed)?;
    apply_runtime_env_overrides(&mut config, &env_lookup)?;
    Ok(LoadedConfig { config, source })
}

fn config_from_file(parsed: FileConfig) -> Result<Config, ConfigurationError> {
    let mut connectors = std::collections::BTreeMap::new();
    for (name, table) in parsed.connectors {
        let base = builtin_connector(&name).unwrap_or_else(|| ConnectorSpec {
            name: name.clone(),
            env_prefix: default_env_prefix(&name),
            base_url: String::new(),
            token_url: None,
            auth_url: None,
            scopes: Vec::new(),
            auth: Vec::new(),
            default_headers: Vec::new(),
        });
        let spec = table.apply_to(base);
        spec.validate()?;
        connectors.insert(name, spec);
    }

    Ok(Config {
        default_profile: normalized_option(&parsed.default_profile),
        network: parsed.network,
        profiles: parsed.profiles,
        connectors,
    })
}

/// Platform config root, e.g. `~/.config` on Linux.
fn config_root_dir() -> Option<PathBuf> {
    dirs::config_dir()
}

// ---------------------------------------------------------------------------
// Lookup
// ---------------------------------------------------------------------------

impl Config {
    /// Connector by name: config-file entries shadow built-in presets.
    pub fn connector(&self, name: &str) -> Result<ConnectorSpec, ConfigurationError> {
        self.connectors
            .get(name)
            .cloned()
            .or_else(|| builtin_connector(name))
            .ok_or_else(|| ConfigurationError::UnknownConnector(name.to_string()))
    }

    /// Every known connector name: presets first, then custom ones.
    pub fn connector_names(&self) -> Vec<String> {
        let mut names: Vec<String> = BUILTIN_CONNECTORS.iter().map(|n| n.to_string()).collect();
        for name in self.connectors.keys() {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }

    /// Pick the active profile name.
    ///
    /// Order: explicit name > `default_profile` (or `TETHER_PROFILE`) > the
    /// only configured profile.
    pub fn select_profile(&self, explicit: Option<&str>) -> Result<String, ConfigurationError> {
        if let Some(name) = explicit.map(str::trim).filter(|n| !n.is_empty()) {
            return Ok(name.to_string());
        }
        if let Some(name) = &self.default_profile {
            return Ok(name.clone());
        }
        if self.profiles.len() == 1 {
            if let Some(name) = self.profiles.keys().next() {
                return Ok(name.clone());
            }
        }
        Err(ConfigurationError::Invalid(
            "no profile selected; pass --profile, set TETHER_PROFILE, or set default_profile"
                .to_string(),
        ))
    }

    /// Resolve connector and credentials for one profile.
    ///
    /// A name with no `[profiles.<name>]` table but matching a connector
    /// resolves from environment variables alone.
    pub fn resolve_profile<FEnv>(
        &self,
        profile_name: &str,
        explicit: Option<&CredentialFields>,
        env_lookup: FEnv,
    ) -> Result<(ConnectorSpec, ResolvedCredentials), ConfigurationError>
    where
        FEnv: Fn(&str) -> Option<String>,
    {
        let (connector, profile) = self.profile_with_connector(profile_name)?;
        let resolved = resolve_credentials(&connector, explicit, env_lookup, &profile.fields)?;
        Ok((connector, resolved))
    }

    /// Raw env-over-profile fields, without picking an auth scheme.
    ///
    /// The authorization-code bootstrap needs `client_id` and `token_url`
    /// before any token exists, so it cannot go through credential
    /// resolution.
    pub fn profile_fields<FEnv>(
        &self,
        profile_name: &str,
        env_lookup: FEnv,
    ) -> Result<(ConnectorSpec, CredentialFields), ConfigurationError>
    where
        FEnv: Fn(&str) -> Option<String>,
    {
        let (connector, profile) = self.profile_with_connector(profile_name)?;
        let env = env_fields(&connector.env_prefix, &env_lookup)?;
        let mut fields = env.layered_over(profile.fields.normalized());
        if fields.token_url.is_none() {
            fields.token_url = connector.token_url.clone();
        }
        Ok((connector, fields))
    }

    fn profile_with_connector(
        &self,
        profile_name: &str,
    ) -> Result<(ConnectorSpec, ProfileConfig), ConfigurationError> {
        let profile = match self.profiles.get(profile_name) {
            Some(profile) => profile.clone(),
            None if self.connector(profile_name).is_ok() => ProfileConfig::default(),
            None => return Err(ConfigurationError::UnknownProfile(profile_name.to_string())),
        };
        let connector_name = normalized_option(&profile.connector)
            .unwrap_or_else(|| profile_name.to_string());
        let connector = self.connector(&connector_name)?;
        Ok((connector, profile))
    }
}

pub(crate) fn normalized_option(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
