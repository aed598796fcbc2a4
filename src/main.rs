//! CLI entry point for tether.

mod cli;

use clap::Parser;
use serde_json::json;
use std::time::{Duration, UNIX_EPOCH};
use tether::api::{ApiClient, Payload, RequestDescriptor};
use tether::auth::{
    authorization_url, exchange_authorization_code, try_open_browser, AuthorizationRequest,
    TokenEndpoint,
};
use tether::config::{load_config, Config, LoadedConfig};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cli::{split_pair, Args, Command, OauthCommand};

#[tokio::main]
async fn main() {
    init_tracing();
    let args = Args::parse();
    if let Err(msg) = run(args).await {
        eprintln!("error: {msg}");
        std::process::exit(1);
    }
}

/// `TETHER_LOG` wins over `RUST_LOG`; default is `warn`. Logs go to stderr so
/// payloads on stdout stay pipeable.
fn init_tracing() {
    let filter = std::env::var("TETHER_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

async fn run(args: Args) -> Result<(), String> {
    let LoadedConfig { config, source } =
        load_config(args.config.as_deref()).map_err(|e| e.to_string())?;
    debug!(%source, "config loaded");

    match &args.command {
        Command::Connectors => {
            list_connectors(&config);
            Ok(())
        }
        Command::Request {
            method,
            path,
            query,
            header,
            data,
            output,
        } => {
            let request = build_request(method, path, query, header, data.as_deref())?;
            let client = build_client(&args, &config)?;
            let response = client.send(&request).await.map_err(|e| e.to_string())?;
            if response.more_available {
                eprintln!("note: status {}: more data available", response.status);
            }
            print_payload(response.payload, output.as_deref()).await
        }
        Command::Check { path } => {
            let client = build_client(&args, &config)?;
            let active = client.head(path).await.map_err(|e| e.to_string())?;
            println!("{}", if active { "active" } else { "inactive" });
            Ok(())
        }
        Command::Refresh => {
            let client = build_client(&args, &config)?;
            let snapshot = client.refresh_now().await.map_err(|e| e.to_string())?;
            match snapshot.expires_at_ms {
                Some(ms) => println!("refreshed; expires {}", format_expiry(ms)),
                None => println!("refreshed; no expiry reported"),
            }
            Ok(())
        }
        Command::Oauth(command) => run_oauth(&args, &config, command).await,
    }
}

fn list_connectors(config: &Config) {
    for name in config.connector_names() {
        let Ok(connector) = config.connector(&name) else {
            continue;
        };
        let schemes: Vec<String> = connector
            .auth
            .iter()
            .map(|binding| binding.scheme.to_string())
            .collect();
        let host = if connector.base_url.is_empty() {
            "(base_url required)"
        } else {
            connector.base_url.as_str()
        };
        println!("{name}\t{host}\t{}", schemes.join(","));
    }
}

fn build_client(args: &Args, config: &Config) -> Result<ApiClient, String> {
    let profile = config
        .select_profile(args.profile.as_deref())
        .map_err(|e| e.to_string())?;
    let (connector, resolved) = config
        .resolve_profile(&profile, None, |name| std::env::var(name).ok())
        .map_err(|e| e.to_string())?;
    debug!(profile = %profile, connector = %connector.name, scheme = %resolved.credentials.scheme(), "credentials resolved");
    let timeout = args
        .timeout
        .map(|secs| Duration::from_secs(secs.max(1)))
        .unwrap_or_else(|| config.network.timeout());
    let client = ApiClient::new(connector, resolved, timeout).map_err(|e| e.to_string())?;
    Ok(client.with_retry_policy(config.network.retry_policy()))
}

fn build_request(
    method: &str,
    path: &str,
    query: &[String],
    headers: &[String],
    data: Option<&str>,
) -> Result<RequestDescriptor, String> {
    let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .map_err(|_| format!("invalid HTTP method `{method}`"))?;
    let mut request = RequestDescriptor::new(method, path);
    for raw in query {
        let (name, value) = split_pair(raw, '=')?;
        request = request.query(name, value);
    }
    for raw in headers {
        let (name, value) = split_pair(raw, ':')?;
        request = request.header(name, value);
    }
    if let Some(data) = data {
        let body = serde_json::from_str(data).map_err(|e| format!("--data is not valid JSON: {e}"))?;
        request = request.json(body);
    }
    Ok(request)
}

async fn print_payload(payload: Payload, output: Option<&str>) -> Result<(), String> {
    match payload {
        Payload::Json(value) => {
            let text = serde_json::to_string_pretty(&value).map_err(|e| e.to_string())?;
            println!("{text}");
        }
        Payload::Text(text) => println!("{text}"),
        Payload::Binary(bytes) => {
            let Some(path) = output else {
                return Err(format!(
                    "response is binary ({} bytes); pass --output FILE to save it",
                    bytes.len()
                ));
            };
            tokio::fs::write(path, &bytes)
                .await
                .map_err(|e| format!("failed to write {path}: {e}"))?;
            eprintln!("wrote {} bytes to {path}", bytes.len());
        }
        Payload::Empty => {}
        Payload::Active(active) => println!("{active}"),
    }
    Ok(())
}

async fn run_oauth(args: &Args, config: &Config, command: &OauthCommand) -> Result<(), String> {
    let profile = config
        .select_profile(args.profile.as_deref())
        .map_err(|e| e.to_string())?;
    let (connector, fields) = config
        .profile_fields(&profile, |name| std::env::var(name).ok())
        .map_err(|e| e.to_string())?;
    let prefix = &connector.env_prefix;
    let client_id = fields
        .client_id
        .clone()
        .ok_or_else(|| format!("set {prefix}_CLIENT_ID (or client_id in the profile)"))?;

    match command {
        OauthCommand::Authorize {
            scope,
            redirect_uri,
            state,
        } => {
            let auth_url = connector.auth_url.as_deref().ok_or_else(|| {
                format!("connector `{}` has no authorization endpoint", connector.name)
            })?;
            let scopes = if scope.is_empty() {
                connector.scopes.clone()
            } else {
                scope.clone()
            };
            let state = state
                .clone()
                .unwrap_or_else(|| format!("{:016x}", rand::random::<u64>()));
            let url = authorization_url(&AuthorizationRequest {
                auth_url,
                client_id: &client_id,
                redirect_uri,
                scopes: &scopes,
                state: &state,
            })
            .map_err(|e| e.to_string())?;
            println!("{url}");
            if !try_open_browser(&url) {
                eprintln!("open the URL above in a browser, then run `tether oauth exchange --code <CODE>`");
            }
            Ok(())
        }
        OauthCommand::Exchange { code, redirect_uri } => {
            let token_url = fields
                .token_url
                .clone()
                .ok_or_else(|| format!("set {prefix}_TOKEN_URL (or token_url in the profile)"))?;
            let endpoint = TokenEndpoint {
                url: token_url,
                client_id,
                client_secret: fields.client_secret.clone(),
            };
            let timeout = args
                .timeout
                .map(|secs| Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| config.network.timeout());
            let http = reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(tether::build_info::user_agent())
                .build()
                .map_err(|e| e.to_string())?;
            let grant = exchange_authorization_code(&http, &endpoint, code, redirect_uri)
                .await
                .map_err(|e| e.to_string())?;
            let out = json!({
                "access_token": grant.access_token,
                "refresh_token": grant.refresh_token,
                "expires_in": grant.expires_in,
                "token_type": grant.token_type,
                "scope": grant.scope,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&out).map_err(|e| e.to_string())?
            );
            eprintln!("store refresh_token in [profiles.{profile}] or {prefix}_REFRESH_TOKEN");
            Ok(())
        }
    }
}

fn format_expiry(expires_at_ms: i64) -> String {
    let Ok(ms) = u64::try_from(expires_at_ms) else {
        return format!("at unix ms {expires_at_ms}");
    };
    httpdate::fmt_http_date(UNIX_EPOCH + Duration::from_millis(ms))
}
