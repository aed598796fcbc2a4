//! Tether: an authenticated request core for third-party HTTP APIs.
//!
//! One generic client covers every connector. Credentials resolve from an
//! explicit override, connector env vars, or a config profile; the client
//! attaches them per the connector's auth strategy, refreshes OAuth2 tokens
//! behind a single-flight lock, and normalizes responses into typed
//! payloads or a closed error set.
//!
//! # Quick start
//!
//! ```no_run
//! use tether::api::{ApiClient, RequestDescriptor};
//! use tether::config::load_config;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config(None)?.config;
//! let profile = config.select_profile(Some("godaddy"))?;
//! let (connector, resolved) =
//!     config.resolve_profile(&profile, None, |name| std::env::var(name).ok())?;
//! let client = ApiClient::new(connector, resolved, config.network.timeout())?;
//!
//! let request = RequestDescriptor::get("/v1/domains/available")
//!     .query("domain", "example.com")
//!     .query("period", 1);
//! let response = client.send(&request).await?;
//! println!("{:?}", response.json());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod build_info;
pub mod config;
pub mod connectors;
pub mod credentials;
pub mod error;
#[cfg(test)]
pub mod testsupport;
