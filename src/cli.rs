//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};

/// Send authenticated requests through a configured connector profile.
#[derive(Debug, Parser)]
#[command(name = "tether", version, long_version = tether::build_info::LONG_VERSION)]
pub struct Args {
    /// Path to config file (default: ./tether.toml or ~/.config/tether/tether.toml).
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<String>,

    /// Profile (or bare connector name) to use.
    #[arg(short = 'p', long = "profile", global = true)]
    pub profile: Option<String>,

    /// Per-request deadline in seconds; overrides `[network].timeout_secs`.
    #[arg(short = 't', long = "timeout", global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one request and print the payload.
    Request {
        /// HTTP method, e.g. GET or POST.
        method: String,
        /// Path relative to the connector base URL, or an absolute URL.
        path: String,
        /// Query parameter as `key=value`. Repeatable.
        #[arg(short = 'q', long = "query", value_name = "KEY=VALUE")]
        query: Vec<String>,
        /// Header as `name:value`. Repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
        header: Vec<String>,
        /// JSON request body.
        #[arg(short = 'd', long = "data")]
        data: Option<String>,
        /// Write binary payloads to this file.
        #[arg(short = 'o', long = "output")]
        output: Option<String>,
    },
    /// HEAD a path and print `active` or `inactive`.
    Check { path: String },
    /// Force a refresh exchange and print the new expiry.
    Refresh,
    /// Authorization-code bootstrap for OAuth2 connectors.
    #[command(subcommand)]
    Oauth(OauthCommand),
    /// List built-in and configured connectors.
    Connectors,
}

#[derive(Debug, Subcommand)]
pub enum OauthCommand {
    /// Print (and try to open) the consent URL.
    Authorize {
        /// Scope to request. Repeatable; defaults to the connector's scopes.
        #[arg(long = "scope")]
        scope: Vec<String>,
        #[arg(long = "redirect-uri", default_value = DEFAULT_REDIRECT_URI)]
        redirect_uri: String,
        /// Opaque value echoed back by the provider. Random when omitted.
        #[arg(long = "state")]
        state: Option<String>,
    },
    /// Exchange an authorization code for the first token pair.
    Exchange {
        #[arg(long = "code")]
        code: String,
        #[arg(long = "redirect-uri", default_value = DEFAULT_REDIRECT_URI)]
        redirect_uri: String,
    },
}

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8085/callback";

/// Split `key=value` (query) or `name:value` (header) pairs.
pub fn split_pair(raw: &str, separator: char) -> Result<(String, String), String> {
    let Some((key, value)) = raw.split_once(separator) else {
        return Err(format!("expected `key{separator}value`, got `{raw}`"));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty name in `{raw}`"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
