//! Mutable access/refresh token holder owned by one client instance.

use serde::Serialize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Lookahead applied before the recorded expiry.
pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Current token material for OAuth2 and static bearer schemes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at_ms: Option<i64>,
}

/// Read-only copy of the token state handed to observers and callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSnapshot {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at_ms: Option<i64>,
}

impl TokenState {
    pub fn new(
        access_token: Option<String>,
        refresh_token: Option<String>,
        expires_at_ms: Option<i64>,
    ) -> Self {
        Self {
            access_token: non_empty(access_token),
            refresh_token: non_empty(refresh_token),
            expires_at_ms,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn expires_at_ms(&self) -> Option<i64> {
        self.expires_at_ms
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Expiry check with the default 60 s lookahead.
    pub fn is_expired(&self) -> bool {
        self.is_expired_with_skew(DEFAULT_EXPIRY_SKEW)
    }

    pub fn is_expired_with_skew(&self, skew: Duration) -> bool {
        self.is_expired_at(unix_now_ms(), skew)
    }

    /// Expiry check against an explicit clock reading.
    ///
    /// An unknown lifetime counts as expired only when a refresh token can
    /// renew it; otherwise the token is treated as long-lived.
    pub fn is_expired_at(&self, now_ms: i64, skew: Duration) -> bool {
        if self.access_token.is_none() {
            return self.refresh_token.is_some();
        }
        match self.expires_at_ms {
            None => self.refresh_token.is_some(),
            Some(expires_at) => {
                let skew_ms = i64::try_from(skew.as_millis()).unwrap_or(i64::MAX);
                now_ms >= expires_at.saturating_sub(skew_ms)
            }
        }
    }

    /// Install a renewed access token.
    ///
    /// A missing `refresh_token` keeps the previous one; a missing
    /// `expires_in_secs` clears the recorded expiry.
    pub fn update(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: Option<u64>,
    ) {
        self.update_at(unix_now_ms(), access_token, refresh_token, expires_in_secs);
    }

    pub(crate) fn update_at(
        &mut self,
        now_ms: i64,
        access_token: String,
        refresh_token: Option<String>,
        expires_in_secs: Option<u64>,
    ) {
        self.access_token = non_empty(Some(access_token));
        if let Some(refresh) = non_empty(refresh_token) {
            self.refresh_token = Some(refresh);
        }
        self.expires_at_ms = expires_in_secs.map(|secs| {
            let ms = i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX);
            now_ms.saturating_add(ms)
        });
    }

    /// Replace every token field, e.g. after an out-of-band refresh.
    pub fn set_tokens(
        &mut self,
        access_token: String,
        refresh_token: Option<String>,
        expires_at_ms: Option<i64>,
    ) {
        self.access_token = non_empty(Some(access_token));
        self.refresh_token = non_empty(refresh_token);
        self.expires_at_ms = expires_at_ms;
    }

    /// Replace only the access token, leaving refresh token and expiry alone.
    pub fn set_access_token(&mut self, access_token: String) {
        self.access_token = non_empty(Some(access_token));
    }

    pub fn snapshot(&self) -> TokenSnapshot {
        TokenSnapshot {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            expires_at_ms: self.expires_at_ms,
        }
    }
}

pub(crate) fn unix_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
