//! Runtime environment overrides for non-credential settings.
//!
//! Connector credentials are read separately by the credential resolver,
//! with their own `<PREFIX>_*` names.

use super::Config;
use crate::error::ConfigurationError;

pub(super) const PROFILE_ENV: &str = "TETHER_PROFILE";
pub(super) const TIMEOUT_ENV: &str = "TETHER_TIMEOUT_SECS";
pub(super) const MAX_ATTEMPTS_ENV: &str = "TETHER_MAX_ATTEMPTS";

pub(super) fn apply_runtime_env_overrides<FEnv>(
    config: &mut Config,
    env_lookup: &FEnv,
) -> Result<(), ConfigurationError>
where
    FEnv: Fn(&str) -> Option<String>,
{
    if let Some(profile) = non_empty_env(env_lookup, PROFILE_ENV) {
        config.default_profile = Some(profile);
    }
    if let Some(timeout) = non_empty_env(env_lookup, TIMEOUT_ENV) {
        // Clamp to at least 1 second to avoid "no-timeout" accidental behavior.
        let parsed = timeout.parse::<u64>().map_err(|_| {
            ConfigurationError::Invalid(format!(
                "invalid {TIMEOUT_ENV} value `{timeout}`: expected positive integer seconds"
            ))
        })?;
        config.network.timeout_secs = parsed.max(1);
    }
    if let Some(attempts) = non_empty_env(env_lookup, MAX_ATTEMPTS_ENV) {
        let parsed = attempts.parse::<u32>().map_err(|_| {
            ConfigurationError::Invalid(format!(
                "invalid {MAX_ATTEMPTS_ENV} value `{attempts}`: expected a positive integer"
            ))
        })?;
        config.network.max_attempts = parsed.max(1);
    }
    Ok(())
}

fn non_empty_env<FEnv>(env_lookup: &FEnv, name: &str) -> Option<String>
where
    FEnv: Fn(&str) -> Option<String>,
{
    env_lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
