//! Unified error types for the request core.

use serde_json::Value;
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigurationError
// ---------------------------------------------------------------------------

/// Caller or environment misconfiguration. Never retried.
#[derive(Debug)]
pub enum ConfigurationError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
    /// No auth scheme of the connector had all of its mandatory fields.
    MissingCredentials { connector: String, hint: String },
    /// A request needs a value (e.g. customer id) the profile does not carry.
    MissingPrerequisite { field: String, hint: String },
    UnknownConnector(String),
    UnknownProfile(String),
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
            Self::MissingCredentials { connector, hint } => {
                write!(f, "missing credentials for `{connector}`: {hint}")
            }
            Self::MissingPrerequisite { field, hint } => {
                write!(f, "missing `{field}`: {hint}")
            }
            Self::UnknownConnector(name) => write!(f, "unknown connector `{name}`"),
            Self::UnknownProfile(name) => write!(f, "profile `{name}` not found in `[profiles.<name>]`"),
        }
    }
}

impl std::error::Error for ConfigurationError {}

impl From<std::io::Error> for ConfigurationError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigurationError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Provider rejected a request. Status and normalized message are preserved
/// so callers can branch on them.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub message: String,
    pub provider_code: Option<String>,
    pub request_id: Option<String>,
    pub retry_after_secs: Option<u64>,
    /// Parsed error payload when the body was JSON.
    pub body: Option<Value>,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            provider_code: None,
            request_id: None,
            retry_after_secs: None,
            body: None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "status {}: {}", self.status, self.message)?;
        if let Some(code) = &self.provider_code {
            write!(f, " [{code}]")?;
        }
        if let Some(id) = &self.request_id {
            write!(f, " (request id {id})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}

// ---------------------------------------------------------------------------
// AuthError
// ---------------------------------------------------------------------------

/// Credential exchange or authentication failure.
///
/// Cloneable so a failed refresh can be handed to every caller that was
/// waiting on the same refresh.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    /// Token endpoint answered with a non-2xx status.
    Exchange {
        status: u16,
        message: String,
        provider_code: Option<String>,
    },
    /// Token endpoint could not be reached.
    Transport(String),
    /// Token endpoint answered 2xx with an unusable payload.
    InvalidResponse(String),
    /// Access token is expired and there is no refresh token to renew it.
    NoRefreshToken,
    /// Authorization server did not issue a refresh token and none was held.
    NoRefreshTokenIssued,
    /// Token endpoint exceeded the deadline.
    Timeout,
    /// Request was still rejected with 401 after a refresh and one retry.
    Unauthorized(ApiError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exchange {
                status,
                message,
                provider_code,
            } => {
                write!(f, "token exchange failed with status {status}: {message}")?;
                if let Some(code) = provider_code {
                    write!(f, " [{code}]")?;
                }
                Ok(())
            }
            Self::Transport(msg) => write!(f, "token endpoint unreachable: {msg}"),
            Self::InvalidResponse(msg) => write!(f, "invalid token response: {msg}"),
            Self::NoRefreshToken => write!(
                f,
                "access token expired and no refresh token is available; re-authorize the profile"
            ),
            Self::NoRefreshTokenIssued => write!(f, "no refresh token issued"),
            Self::Timeout => write!(f, "token endpoint timed out"),
            Self::Unauthorized(err) => write!(f, "still unauthorized after token refresh: {err}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutError
// ---------------------------------------------------------------------------

/// Network operation exceeded the caller's deadline. Safe to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutError {
    pub limit: Duration,
}

impl fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "request timed out after {} ms", self.limit.as_millis())
    }
}

impl std::error::Error for TimeoutError {}

// ---------------------------------------------------------------------------
// ClientError
// ---------------------------------------------------------------------------

/// Closed set of failures a dispatched request can produce.
#[derive(Debug)]
pub enum ClientError {
    Configuration(ConfigurationError),
    Auth(AuthError),
    Api(ApiError),
    Timeout(TimeoutError),
    /// Connection-level failure that is not a timeout.
    Transport(reqwest::Error),
    /// 2xx response whose payload did not match the caller's expected type.
    Decode(String),
}

impl ClientError {
    /// HTTP status carried by the error, if the provider answered at all.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api(err) => Some(err.status),
            Self::Auth(AuthError::Unauthorized(err)) => Some(err.status),
            Self::Auth(AuthError::Exchange { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(e) => write!(f, "config: {e}"),
            Self::Auth(e) => write!(f, "auth: {e}"),
            Self::Api(e) => write!(f, "api: {e}"),
            Self::Timeout(e) => write!(f, "timeout: {e}"),
            Self::Transport(e) => write!(f, "http: {e}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ConfigurationError> for ClientError {
    fn from(e: ConfigurationError) -> Self {
        Self::Configuration(e)
    }
}

impl From<AuthError> for ClientError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<ApiError> for ClientError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

impl From<TimeoutError> for ClientError {
    fn from(e: TimeoutError) -> Self {
        Self::Timeout(e)
    }
}
