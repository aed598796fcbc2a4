//! Per-client token session: the token state plus a single-flight refresh.
//!
//! Two entry points share one exchange path:
//! - proactive: [`TokenSession::ensure_fresh`] before a request is sent,
//! - reactive: [`TokenSession::refresh_after_unauthorized`] after a 401.
//!
//! Every refresh runs under one async lock. A caller that waited on the lock
//! re-checks the token generation first, so concurrent callers that saw the
//! same stale token share one exchange (and one failure) instead of racing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{info, warn};

use super::refresh::{exchange_refresh_token, TokenEndpoint};
use super::token::{TokenSnapshot, TokenState, DEFAULT_EXPIRY_SKEW};
use crate::error::AuthError;

/// Lifetime assumed when a token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;
/// Refreshed tokens living at most this long are logged as near expiry.
const NEAR_EXPIRY_WARN_SECS: u64 = 600;

/// Hook for persisting renewed tokens. The core never persists on its own.
#[async_trait]
pub trait TokenObserver: Send + Sync {
    async fn tokens_refreshed(&self, connector: &str, snapshot: &TokenSnapshot);
}

/// Which entry point asked for the refresh; only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshTrigger {
    Proactive,
    Reactive,
    Forced,
}

impl RefreshTrigger {
    fn as_str(self) -> &'static str {
        match self {
            Self::Proactive => "proactive",
            Self::Reactive => "reactive",
            Self::Forced => "forced",
        }
    }
}

/// Access token handed out together with the generation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: Option<String>,
    pub generation: u64,
}

#[derive(Default)]
struct RefreshLedger {
    last_failure: Option<AuthError>,
}

pub struct TokenSession {
    connector: String,
    state: Mutex<TokenState>,
    endpoint: Option<TokenEndpoint>,
    skew: Duration,
    /// Bumped on every token change; lets waiters detect a finished refresh.
    generation: AtomicU64,
    /// Bumped when an exchange completes, success or failure.
    exchanges: AtomicU64,
    refresh_lock: tokio::sync::Mutex<RefreshLedger>,
    observer: Option<Arc<dyn TokenObserver>>,
}

impl TokenSession {
    pub fn new(connector: impl Into<String>, state: TokenState, endpoint: Option<TokenEndpoint>) -> Self {
        Self {
            connector: connector.into(),
            state: Mutex::new(state),
            endpoint,
            skew: DEFAULT_EXPIRY_SKEW,
            generation: AtomicU64::new(0),
            exchanges: AtomicU64::new(0),
            refresh_lock: tokio::sync::Mutex::new(RefreshLedger::default()),
            observer: None,
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn TokenObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Whether a 401 can be answered with a refresh exchange.
    pub fn can_refresh(&self) -> bool {
        self.endpoint.is_some() && self.lock_state().has_refresh_token()
    }

    pub fn current(&self) -> IssuedToken {
        let state = self.lock_state();
        IssuedToken {
            access_token: state.access_token().map(str::to_string),
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    /// Proactive path: return a usable token, refreshing first if expired.
    pub async fn ensure_fresh(&self, http: &reqwest::Client) -> Result<IssuedToken, AuthError> {
        let (expired, issued) = {
            let state = self.lock_state();
            let issued = IssuedToken {
                access_token: state.access_token().map(str::to_string),
                generation: self.generation.load(Ordering::SeqCst),
            };
            (state.is_expired_with_skew(self.skew), issued)
        };
        if !expired {
            return Ok(issued);
        }
        if !self.can_refresh() {
            return Err(AuthError::NoRefreshToken);
        }
        self.refresh_from(http, issued.generation, RefreshTrigger::Proactive)
            .await
    }

    /// Reactive path: renew after the token of `observed_generation` got a 401.
    ///
    /// When another caller already replaced that token, the newer token is
    /// returned without a second exchange.
    pub async fn refresh_after_unauthorized(
        &self,
        http: &reqwest::Client,
        observed_generation: u64,
    ) -> Result<IssuedToken, AuthError> {
        if !self.can_refresh() {
            return Err(AuthError::NoRefreshToken);
        }
        self.refresh_from(http, observed_generation, RefreshTrigger::Reactive)
            .await
    }

    /// Run an exchange now regardless of expiry.
    pub async fn force_refresh(&self, http: &reqwest::Client) -> Result<IssuedToken, AuthError> {
        if !self.can_refresh() {
            return Err(AuthError::NoRefreshToken);
        }
        let generation = self.generation.load(Ordering::SeqCst);
        self.refresh_from(http, generation, RefreshTrigger::Forced)
            .await
    }

    async fn refresh_from(
        &self,
        http: &reqwest::Client,
        observed_generation: u64,
        trigger: RefreshTrigger,
    ) -> Result<IssuedToken, AuthError> {
        let exchanges_seen = self.exchanges.load(Ordering::SeqCst);
        let mut ledger = self.refresh_lock.lock().await;

        if self.generation.load(Ordering::SeqCst) != observed_generation {
            return Ok(self.current());
        }
        if self.exchanges.load(Ordering::SeqCst) != exchanges_seen {
            if let Some(err) = ledger.last_failure.clone() {
                return Err(err);
            }
        }

        let outcome = self.exchange(http, trigger).await;
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        match outcome {
            Ok(snapshot) => {
                ledger.last_failure = None;
                if let Some(observer) = &self.observer {
                    observer.tokens_refreshed(&self.connector, &snapshot).await;
                }
                Ok(self.current())
            }
            Err(err) => {
                warn!(connector = %self.connector, trigger = trigger.as_str(), error = %err, "token refresh failed");
                ledger.last_failure = Some(err.clone());
                Err(err)
            }
        }
    }

    async fn exchange(
        &self,
        http: &reqwest::Client,
        trigger: RefreshTrigger,
    ) -> Result<TokenSnapshot, AuthError> {
        let endpoint = self.endpoint.as_ref().ok_or(AuthError::NoRefreshToken)?;
        let refresh_token = self
            .lock_state()
            .refresh_token()
            .map(str::to_string)
            .ok_or(AuthError::NoRefreshToken)?;

        info!(connector = %self.connector, trigger = trigger.as_str(), "refreshing access token");
        let grant = exchange_refresh_token(http, endpoint, &refresh_token).await?;
        let lifetime = grant.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        if lifetime <= NEAR_EXPIRY_WARN_SECS {
            warn!(
                connector = %self.connector,
                expires_in = lifetime,
                "refreshed access token is close to expiry"
            );
        }

        let snapshot = {
            let mut state = self.lock_state();
            state.update(grant.access_token, grant.refresh_token, Some(lifetime));
            if !state.has_refresh_token() {
                return Err(AuthError::NoRefreshTokenIssued);
            }
            self.generation.fetch_add(1, Ordering::SeqCst);
            state.snapshot()
        };
        Ok(snapshot)
    }

    /// Replace all tokens, e.g. after an out-of-band refresh.
    pub fn set_tokens(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        expires_at_ms: Option<i64>,
    ) {
        self.lock_state()
            .set_tokens(access_token, refresh_token, expires_at_ms);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn set_access_token(&self, access_token: String) {
        self.lock_state().set_access_token(access_token);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        self.lock_state().snapshot()
    }

    fn lock_state(&self) -> MutexGuard<'_, TokenState> {
        // Nothing panics while holding this lock, so a poisoned guard still
        // holds consistent state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::unix_now_ms;
    use crate::testsupport::{MockResponse, MockServer};

    fn endpoint(server: &MockServer) -> Option<TokenEndpoint> {
        Some(TokenEndpoint {
            url: server.url("/token"),
            client_id: "cid".into(),
            client_secret: Some("secret".into()),
        })
    }

    fn expired_state() -> TokenState {
        TokenState::new(
            Some("stale".into()),
            Some("r-1".into()),
            Some(unix_now_ms() - 1_000),
        )
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<TokenSnapshot>>,
    }

    #[async_trait]
    impl TokenObserver for Recorder {
        async fn tokens_refreshed(&self, _connector: &str, snapshot: &TokenSnapshot) {
            self.seen.lock().unwrap().push(snapshot.clone());
        }
    }

    #[tokio::test]
    async fn fresh_token_needs_no_exchange() {
        let server = MockServer::start(|_| MockResponse::json(500, "{}")).await;
        let state = TokenState::new(
            Some("live".into()),
            Some("r".into()),
            Some(unix_now_ms() + 3_600_000),
        );
        let session = TokenSession::new("t", state, endpoint(&server));
        let issued = session
            .ensure_fresh(&reqwest::Client::new())
            .await
            .expect("token");
        assert_eq!(issued.access_token.as_deref(), Some("live"));
        assert!(server.requests().is_empty());
    }

    #[tokio::test]
    async fn expired_token_refreshes_and_keeps_refresh_token() {
        let server = MockServer::start(|_| {
            MockResponse::json(200, r#"{"access_token":"fresh","expires_in":3600}"#)
        })
        .await;
        let recorder = Arc::new(Recorder::default());
        let session = TokenSession::new("t", expired_state(), endpoint(&server))
            .with_observer(recorder.clone());

        let issued = session
            .ensure_fresh(&reqwest::Client::new())
            .await
            .expect("token");
        assert_eq!(issued.access_token.as_deref(), Some("fresh"));
        assert_eq!(issued.generation, 1);
        assert_eq!(session.snapshot().refresh_token.as_deref(), Some("r-1"));

        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].access_token.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_exchange() {
        let server = MockServer::start(|_| {
            MockResponse::json(200, r#"{"access_token":"shared","expires_in":3600}"#)
                .with_delay(Duration::from_millis(100))
        })
        .await;
        let session = Arc::new(TokenSession::new("t", expired_state(), endpoint(&server)));
        let http = reqwest::Client::new();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let session = Arc::clone(&session);
            let http = http.clone();
            handles.push(tokio::spawn(async move { session.ensure_fresh(&http).await }));
        }
        for handle in handles {
            let issued = handle.await.expect("join").expect("token");
            assert_eq!(issued.access_token.as_deref(), Some("shared"));
        }
        assert_eq!(server.hits("/token"), 1);
    }

    #[tokio::test]
    async fn waiters_share_a_failed_exchange() {
        let server = MockServer::start(|_| {
            MockResponse::json(400, r#"{"error":"invalid_grant"}"#)
                .with_delay(Duration::from_millis(100))
        })
        .await;
        let session = Arc::new(TokenSession::new("t", expired_state(), endpoint(&server)));
        let http = reqwest::Client::new();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let session = Arc::clone(&session);
            let http = http.clone();
            handles.push(tokio::spawn(async move { session.ensure_fresh(&http).await }));
        }
        for handle in handles {
            let err = handle.await.expect("join").expect_err("must fail");
            assert!(matches!(err, AuthError::Exchange { status: 400, .. }), "got: {err:?}");
        }
        assert_eq!(server.hits("/token"), 1);

        // A later call is not stuck on the old failure.
        let _ = session.ensure_fresh(&http).await;
        assert_eq!(server.hits("/token"), 2);
    }

    #[tokio::test]
    async fn reactive_refresh_skips_exchange_when_token_already_rotated() {
        let server = MockServer::start(|_| {
            MockResponse::json(200, r#"{"access_token":"next","expires_in":3600}"#)
        })
        .await;
        let state = TokenState::new(
            Some("a".into()),
            Some("r".into()),
            Some(unix_now_ms() + 3_600_000),
        );
        let session = TokenSession::new("t", state, endpoint(&server));
        let http = reqwest::Client::new();

        let first = session
            .refresh_after_unauthorized(&http, 0)
            .await
            .expect("token");
        assert_eq!(first.access_token.as_deref(), Some("next"));
        let again = session
            .refresh_after_unauthorized(&http, 0)
            .await
            .expect("token");
        assert_eq!(again, first);
        assert_eq!(server.hits("/token"), 1);
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_fails() {
        let state = TokenState::new(Some("stale".into()), None, Some(unix_now_ms() - 1_000));
        let session = TokenSession::new("t", state, None);
        let err = session
            .ensure_fresh(&reqwest::Client::new())
            .await
            .expect_err("must fail");
        assert_eq!(err, AuthError::NoRefreshToken);
    }

    #[tokio::test]
    async fn missing_lifetime_defaults_to_one_hour() {
        let server = MockServer::start(|_| MockResponse::json(200, r#"{"access_token":"x"}"#)).await;
        let session = TokenSession::new("t", expired_state(), endpoint(&server));
        let before = unix_now_ms();
        session
            .force_refresh(&reqwest::Client::new())
            .await
            .expect("token");
        let expires_at = session.snapshot().expires_at_ms.expect("expiry");
        assert!(expires_at >= before + 3_600_000);
    }

    #[test]
    fn set_tokens_bumps_generation() {
        let session = TokenSession::new("t", TokenState::default(), None);
        session.set_tokens("a".into(), Some("r".into()), None);
        session.set_access_token("b".into());
        let current = session.current();
        assert_eq!(current.access_token.as_deref(), Some("b"));
        assert_eq!(current.generation, 2);
        assert_eq!(session.snapshot().refresh_token.as_deref(), Some("r"));
    }
}
