//! OAuth token endpoint exchanges: refresh-token renewal and
//! authorization-code bootstrap.

use serde::Deserialize;
use serde_json::Value;

use crate::api::response::extract_error_fields;
use crate::error::AuthError;

/// Token endpoint plus the client registration used to call it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEndpoint {
    pub url: String,
    pub client_id: String,
    pub client_secret: Option<String>,
}

/// Tokens issued by one successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

/// Parameters for the consent URL of the authorization-code flow.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'a> {
    pub auth_url: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scopes: &'a [String],
    pub state: &'a str,
}

/// Token endpoint response shape.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    /// Often omitted on renewal.
    refresh_token: Option<String>,
    #[serde(deserialize_with = "deserialize_u64_option", default)]
    expires_in: Option<u64>,
    token_type: Option<String>,
    scope: Option<String>,
}

/// Exchange a refresh token for a new access token.
///
/// Submits `client_id`, `client_secret`, `refresh_token` and
/// `grant_type=refresh_token` form-encoded. Any non-2xx answer is an
/// [`AuthError::Exchange`].
pub async fn exchange_refresh_token(
    http: &reqwest::Client,
    endpoint: &TokenEndpoint,
    refresh_token: &str,
) -> Result<TokenGrant, AuthError> {
    let mut form = vec![
        ("client_id", endpoint.client_id.as_str()),
        ("refresh_token", refresh_token),
        ("grant_type", "refresh_token"),
    ];
    if let Some(secret) = endpoint.client_secret.as_deref() {
        form.push(("client_secret", secret));
    }
    post_token_form(http, &endpoint.url, &form).await
}

/// Exchange an authorization code for the first token pair.
///
/// Fails with [`AuthError::NoRefreshTokenIssued`] when the server does not
/// issue a refresh token, since there is no earlier one to fall back to.
pub async fn exchange_authorization_code(
    http: &reqwest::Client,
    endpoint: &TokenEndpoint,
    code: &str,
    redirect_uri: &str,
) -> Result<TokenGrant, AuthError> {
    let mut form = vec![
        ("client_id", endpoint.client_id.as_str()),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("grant_type", "authorization_code"),
    ];
    if let Some(secret) = endpoint.client_secret.as_deref() {
        form.push(("client_secret", secret));
    }
    let grant = post_token_form(http, &endpoint.url, &form).await?;
    if grant.refresh_token.is_none() {
        return Err(AuthError::NoRefreshTokenIssued);
    }
    Ok(grant)
}

/// Build the consent URL that starts an offline authorization-code flow.
pub fn authorization_url(request: &AuthorizationRequest<'_>) -> Result<String, AuthError> {
    let mut url = reqwest::Url::parse(request.auth_url)
        .map_err(|e| AuthError::InvalidResponse(format!("invalid auth url: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", request.client_id)
        .append_pair("redirect_uri", request.redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("scope", &request.scopes.join(" "))
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("state", request.state);
    Ok(url.to_string())
}

async fn post_token_form(
    http: &reqwest::Client,
    url: &str,
    form: &[(&str, &str)],
) -> Result<TokenGrant, AuthError> {
    let response = http
        .post(url)
        .header("Accept", "application/json")
        .form(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(exchange_error(status, &text));
    }

    let text = response.text().await?;
    parse_token_response(&text)
}

fn exchange_error(status: reqwest::StatusCode, text: &str) -> AuthError {
    let parsed = serde_json::from_str::<Value>(text).ok();
    let (message, provider_code) = parsed
        .as_ref()
        .map(extract_error_fields)
        .unwrap_or((None, None));
    let message = message
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("token exchange failed").to_string());
    AuthError::Exchange {
        status: status.as_u16(),
        message,
        provider_code,
    }
}

fn parse_token_response(text: &str) -> Result<TokenGrant, AuthError> {
    let payload: TokenResponse = serde_json::from_str(text)
        .map_err(|e| AuthError::InvalidResponse(format!("token response is not valid JSON: {e}")))?;
    let access_token = payload.access_token.unwrap_or_default().trim().to_string();
    if access_token.is_empty() {
        return Err(AuthError::InvalidResponse(
            "token response did not include access_token".to_string(),
        ));
    }
    let refresh_token = payload
        .refresh_token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    Ok(TokenGrant {
        access_token,
        refresh_token,
        expires_in: payload.expires_in,
        token_type: payload.token_type,
        scope: payload.scope,
    })
}

/// Deserialize optional lifetimes encoded as string/number/null.
fn deserialize_u64_option<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(None),
        Value::Number(num) => num
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom("expires_in must be a non-negative integer"))
            .map(Some),
        Value::String(text) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|err| serde::de::Error::custom(format!("invalid expires_in: {err}"))),
        _ => Err(serde::de::Error::custom(
            "expires_in must be string, number, or null",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::{MockResponse, MockServer};

    fn endpoint(url: String) -> TokenEndpoint {
        TokenEndpoint {
            url,
            client_id: "cid".into(),
            client_secret: Some("csecret".into()),
        }
    }

    #[test]
    fn parse_token_response_accepts_string_expiry() {
        let grant =
            parse_token_response(r#"{"access_token":"a","expires_in":"3599","token_type":"Bearer"}"#)
                .expect("grant");
        assert_eq!(grant.access_token, "a");
        assert_eq!(grant.expires_in, Some(3599));
        assert_eq!(grant.refresh_token, None);
        assert_eq!(grant.token_type.as_deref(), Some("Bearer"));
    }

    #[test]
    fn parse_token_response_rejects_missing_access_token() {
        let err = parse_token_response(r#"{"refresh_token":"r"}"#).expect_err("must fail");
        assert!(matches!(err, AuthError::InvalidResponse(_)), "got: {err:?}");
    }

    #[test]
    fn authorization_url_carries_offline_consent_params() {
        let scopes = vec![
            "https://www.googleapis.com/auth/drive.readonly".to_string(),
            "https://www.googleapis.com/auth/drive.file".to_string(),
        ];
        let url = authorization_url(&AuthorizationRequest {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
            client_id: "cid",
            redirect_uri: "http://localhost:8080/callback",
            scopes: &scopes,
            state: "dev",
        })
        .expect("url");
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("state=dev"));
        assert!(url.contains("drive.readonly+https"), "scopes joined by space: {url}");
    }

    #[tokio::test]
    async fn refresh_exchange_posts_form_encoded_grant() {
        let server = MockServer::start(|_| {
            MockResponse::json(200, r#"{"access_token":"fresh","expires_in":3600}"#)
        })
        .await;
        let http = reqwest::Client::new();
        let grant = exchange_refresh_token(&http, &endpoint(server.url("/token")), "r-1")
            .await
            .expect("grant");
        assert_eq!(grant.access_token, "fresh");

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.method, "POST");
        assert_eq!(
            req.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert!(req.body.contains("grant_type=refresh_token"), "body: {}", req.body);
        assert!(req.body.contains("refresh_token=r-1"));
        assert!(req.body.contains("client_id=cid"));
        assert!(req.body.contains("client_secret=csecret"));
    }

    #[tokio::test]
    async fn refresh_exchange_maps_oauth_error_payload() {
        let server = MockServer::start(|_| {
            MockResponse::json(
                400,
                r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
            )
        })
        .await;
        let http = reqwest::Client::new();
        let err = exchange_refresh_token(&http, &endpoint(server.url("/token")), "stale")
            .await
            .expect_err("must fail");
        assert_eq!(
            err,
            AuthError::Exchange {
                status: 400,
                message: "Token has been expired or revoked.".into(),
                provider_code: Some("invalid_grant".into()),
            }
        );
    }

    #[tokio::test]
    async fn code_exchange_without_refresh_token_is_rejected() {
        let server = MockServer::start(|_| {
            MockResponse::json(200, r#"{"access_token":"first","expires_in":3600}"#)
        })
        .await;
        let http = reqwest::Client::new();
        let err = exchange_authorization_code(
            &http,
            &endpoint(server.url("/token")),
            "code-1",
            "http://localhost/cb",
        )
        .await
        .expect_err("must fail");
        assert_eq!(err, AuthError::NoRefreshTokenIssued);
        assert!(server.requests()[0].body.contains("grant_type=authorization_code"));
    }
}
