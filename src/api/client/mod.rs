//! Authenticated request dispatch for connector APIs.
//!
//! The client facade stays small:
//! - token lifetime and refresh are delegated to `auth::session`.
//! - header layering and the raw round trip are delegated to `transport`.
//! - transient retry policy is delegated to `retry`.
//! - the refresh-once contract is enforced by the `state` machine.

mod retry;
mod state;
mod transport;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::request::RequestDescriptor;
use super::response::{normalize, retry_after_secs, ApiResponse, NormalizedResponse, Payload, RawResponse};
use super::Dispatch;
use crate::auth::session::{IssuedToken, TokenObserver, TokenSession};
use crate::auth::strategy::{AuthMaterial, AuthPlacement, AuthStrategy};
use crate::auth::token::{TokenSnapshot, TokenState};
use crate::auth::TokenEndpoint;
use crate::connectors::ConnectorSpec;
use crate::credentials::{Credentials, ResolvedCredentials, Scheme};
use crate::error::{AuthError, ClientError, ConfigurationError, TimeoutError};
pub use retry::RetryPolicy;
use state::{DispatchEvent, DispatchState};

/// Credential material held for the client's lifetime.
enum ClientAuth {
    KeySecret { key: String, secret: String },
    ApiKey(String),
    /// Static bearer tokens and OAuth2 both live in a token session.
    Token(TokenSession),
}

/// Client for one connector, bound to exactly one credential scheme.
pub struct ApiClient {
    http: reqwest::Client,
    connector: ConnectorSpec,
    base_url: String,
    customer_id: Option<String>,
    scheme: Scheme,
    strategy: AuthStrategy,
    auth: ClientAuth,
    timeout: Duration,
    retry_policy: RetryPolicy,
}

impl ApiClient {
    /// Build a client from a connector and credentials resolved for it.
    pub fn new(
        connector: ConnectorSpec,
        resolved: ResolvedCredentials,
        timeout: Duration,
    ) -> Result<Self, ConfigurationError> {
        let scheme = resolved.credentials.scheme();
        if !resolved.strategy.accepts(scheme) {
            return Err(ConfigurationError::Invalid(format!(
                "connector `{}`: strategy {:?} cannot carry {scheme} credentials",
                connector.name, resolved.strategy
            )));
        }

        let auth = match resolved.credentials {
            Credentials::ApiKeySecret { key, secret } => ClientAuth::KeySecret { key, secret },
            Credentials::ApiKeyOnly { api_key } => ClientAuth::ApiKey(api_key),
            Credentials::BearerToken { access_token } => ClientAuth::Token(TokenSession::new(
                connector.name.clone(),
                TokenState::new(Some(access_token), None, None),
                None,
            )),
            Credentials::OAuth2(oauth) => {
                let endpoint = match (resolved.token_url.clone(), oauth.client_id.clone()) {
                    (Some(url), Some(client_id)) => Some(TokenEndpoint {
                        url,
                        client_id,
                        client_secret: oauth.client_secret.clone(),
                    }),
                    _ => None,
                };
                ClientAuth::Token(TokenSession::new(
                    connector.name.clone(),
                    TokenState::new(oauth.access_token, oauth.refresh_token, oauth.expires_at_ms),
                    endpoint,
                ))
            }
        };

        Ok(Self {
            http: transport::build_http_client(timeout),
            base_url: resolved.base_url,
            customer_id: resolved.customer_id,
            scheme,
            strategy: resolved.strategy,
            auth,
            timeout,
            retry_policy: RetryPolicy::default(),
            connector,
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Notify `observer` after every successful token refresh.
    pub fn with_observer(mut self, observer: Arc<dyn TokenObserver>) -> Self {
        self.auth = match self.auth {
            ClientAuth::Token(session) => ClientAuth::Token(session.with_observer(observer)),
            other => other,
        };
        self
    }

    pub fn connector(&self) -> &ConnectorSpec {
        &self.connector
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer_id.as_deref()
    }

    /// Send one request through auth, refresh-once and normalization.
    ///
    /// The deadline (per-call, else the client's) covers the whole call:
    /// any refresh exchange, the request and the retried request.
    pub async fn send(&self, request: &RequestDescriptor) -> Result<ApiResponse, ClientError> {
        // Configuration problems surface before any network I/O.
        request.build_url(&self.base_url, self.customer_id.as_deref(), None)?;
        let limit = request.get_timeout().unwrap_or(self.timeout);
        match timeout(limit, self.run_call(request)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(connector = %self.connector.name, path = request.path(), ?limit, "call deadline elapsed");
                Err(ClientError::Timeout(TimeoutError { limit }))
            }
        }
    }

    async fn run_call(&self, request: &RequestDescriptor) -> Result<ApiResponse, ClientError> {
        let mut issued = self.ensure_token().await?;

        let mut state = DispatchState::Idle.on(DispatchEvent::Sent);
        loop {
            let raw = match self.dispatch_with_retries(request, issued.as_ref()).await {
                Ok(raw) => raw,
                Err(err) => {
                    state = state.on(DispatchEvent::Errored);
                    debug_assert!(state.is_terminal());
                    debug!(connector = %self.connector.name, ?state, "dispatch aborted");
                    return Err(err);
                }
            };

            if raw.status != 401 {
                state = state.on(DispatchEvent::Responded);
                debug_assert_eq!(state, DispatchState::Done);
                return self.finish(raw, request);
            }

            let previous = state;
            let can_refresh = self.session().is_some_and(TokenSession::can_refresh);
            state = state.on(DispatchEvent::Unauthorized { can_refresh });
            match state {
                DispatchState::Refreshing => {
                    let observed = issued.as_ref().map_or(0, |t| t.generation);
                    let Some(session) = self.session() else {
                        return self.finish(raw, request);
                    };
                    match session.refresh_after_unauthorized(&self.http, observed).await {
                        Ok(token) => {
                            issued = Some(token);
                            state = state.on(DispatchEvent::Refreshed);
                        }
                        Err(err) => {
                            state = state.on(DispatchEvent::Errored);
                            debug!(connector = %self.connector.name, ?state, "reactive refresh failed");
                            return Err(self.auth_failure(err));
                        }
                    }
                }
                _ if previous == DispatchState::Retrying => {
                    let err = match normalize(raw, request.get_response_type(), request.is_head()) {
                        NormalizedResponse::Failure(err) => err,
                        NormalizedResponse::Success(_) => {
                            crate::error::ApiError::new(401, "Unauthorized")
                        }
                    };
                    warn!(connector = %self.connector.name, "request still unauthorized after token refresh");
                    return Err(ClientError::Auth(AuthError::Unauthorized(err)));
                }
                _ => return self.finish(raw, request),
            }
        }
    }

    /// Send and decode a JSON payload into `T`.
    pub async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
    ) -> Result<T, ClientError> {
        self.send(request)
            .await?
            .decode()
            .map_err(ClientError::Decode)
    }

    /// HEAD probe: `true` when the resource answers 200 or 204.
    pub async fn head(&self, path: &str) -> Result<bool, ClientError> {
        let response = self.send(&RequestDescriptor::head(path)).await?;
        Ok(matches!(response.payload, Payload::Active(true)))
    }

    /// Replace all tokens, e.g. after an out-of-band refresh.
    pub fn set_tokens(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        expires_at_ms: Option<i64>,
    ) -> Result<(), ConfigurationError> {
        let session = self.require_session("set_tokens")?;
        session.set_tokens(access_token, refresh_token, expires_at_ms);
        Ok(())
    }

    pub fn set_access_token(&self, access_token: String) -> Result<(), ConfigurationError> {
        let session = self.require_session("set_access_token")?;
        session.set_access_token(access_token);
        Ok(())
    }

    /// Current tokens, for token-based schemes.
    pub fn token_snapshot(&self) -> Option<TokenSnapshot> {
        self.session().map(TokenSession::snapshot)
    }

    /// Run a refresh exchange now, regardless of expiry.
    pub async fn refresh_now(&self) -> Result<TokenSnapshot, ClientError> {
        let session = self.require_session("refresh")?;
        session
            .force_refresh(&self.http)
            .await
            .map_err(|err| self.auth_failure(err))?;
        Ok(session.snapshot())
    }

    fn session(&self) -> Option<&TokenSession> {
        match &self.auth {
            ClientAuth::Token(session) => Some(session),
            _ => None,
        }
    }

    fn require_session(&self, operation: &str) -> Result<&TokenSession, ConfigurationError> {
        self.session().ok_or_else(|| {
            ConfigurationError::Invalid(format!(
                "`{operation}` needs a token-based scheme, but `{}` uses {}",
                self.connector.name, self.scheme
            ))
        })
    }

    /// Proactive path: token schemes get a valid token before sending.
    async fn ensure_token(&self) -> Result<Option<IssuedToken>, ClientError> {
        match self.session() {
            Some(session) => session
                .ensure_fresh(&self.http)
                .await
                .map(Some)
                .map_err(|err| self.auth_failure(err)),
            None => Ok(None),
        }
    }

    fn auth_failure(&self, err: AuthError) -> ClientError {
        match err {
            AuthError::Timeout => ClientError::Timeout(TimeoutError {
                limit: self.timeout,
            }),
            other => ClientError::Auth(other),
        }
    }

    fn placement(&self, issued: Option<&IssuedToken>) -> Option<AuthPlacement> {
        let material = match &self.auth {
            ClientAuth::KeySecret { key, secret } => AuthMaterial::KeySecret { key, secret },
            ClientAuth::ApiKey(key) => AuthMaterial::ApiKey(key),
            ClientAuth::Token(_) => AuthMaterial::Token(issued?.access_token.as_deref()?),
        };
        self.strategy.apply(material)
    }

    async fn dispatch(
        &self,
        request: &RequestDescriptor,
        issued: Option<&IssuedToken>,
    ) -> Result<Result<RawResponse, reqwest::Error>, ClientError> {
        let placement = self.placement(issued);
        let auth_header = match &placement {
            Some(AuthPlacement::Header { name, value }) => Some((name.as_str(), value.as_str())),
            _ => None,
        };
        let auth_param = match &placement {
            Some(AuthPlacement::Query { name, value }) => Some((name.as_str(), value.as_str())),
            _ => None,
        };

        let url = request.build_url(&self.base_url, self.customer_id.as_deref(), auth_param)?;
        let headers = transport::layered_headers(&self.connector.default_headers, auth_header, request)?;

        let started = Instant::now();
        let outcome = transport::execute(&self.http, request, url, headers, request.get_timeout()).await;
        debug!(
            connector = %self.connector.name,
            method = %request.method(),
            path = request.path(),
            status = outcome.as_ref().ok().map(|raw| raw.status),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "dispatched request"
        );
        Ok(outcome)
    }

    async fn dispatch_with_retries(
        &self,
        request: &RequestDescriptor,
        issued: Option<&IssuedToken>,
    ) -> Result<RawResponse, ClientError> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = self.dispatch(request, issued).await?;
            if !self.retry_policy.should_retry(&outcome, attempt) {
                return outcome.map_err(|err| self.transport_failure(err, request));
            }
            let retry_after = outcome.as_ref().ok().and_then(|raw| retry_after_secs(&raw.headers));
            let delay = self.retry_policy.retry_delay_for(attempt, retry_after);
            warn!(
                connector = %self.connector.name,
                attempt = attempt + 1,
                status = outcome.as_ref().ok().map(|raw| raw.status),
                delay_ms = delay.as_millis() as u64,
                "transient failure, retrying"
            );
            attempt = attempt.saturating_add(1);
            sleep(delay).await;
        }
    }

    fn transport_failure(&self, err: reqwest::Error, request: &RequestDescriptor) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(TimeoutError {
                limit: request.get_timeout().unwrap_or(self.timeout),
            })
        } else {
            ClientError::Transport(err)
        }
    }

    fn finish(&self, raw: RawResponse, request: &RequestDescriptor) -> Result<ApiResponse, ClientError> {
        normalize(raw, request.get_response_type(), request.is_head())
            .into_result()
            .map_err(ClientError::Api)
    }
}

#[async_trait]
impl Dispatch for ApiClient {
    async fn send(&self, request: &RequestDescriptor) -> Result<ApiResponse, ClientError> {
        ApiClient::send(self, request).await
    }
}
