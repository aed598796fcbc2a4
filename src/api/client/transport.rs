//! HTTP transport helpers: client construction, header layering and one
//! buffered round trip.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use std::time::Duration;

use crate::api::request::{RequestBody, RequestDescriptor};
use crate::api::response::RawResponse;
use crate::error::ConfigurationError;

/// Build an HTTP client with timeout applied.
pub(super) fn build_http_client(timeout: Duration) -> reqwest::Client {
    // Fall back to reqwest defaults if builder creation fails for any reason.
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(crate::build_info::user_agent())
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Layer headers lowest priority first: `Accept`, connector defaults, auth,
/// body content-type, then caller overrides. Later layers replace earlier.
pub(super) fn layered_headers(
    connector_defaults: &[(String, String)],
    auth_header: Option<(&str, &str)>,
    request: &RequestDescriptor,
) -> Result<HeaderMap, ConfigurationError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    for (name, value) in connector_defaults {
        insert(&mut headers, name, value)?;
    }
    if let Some((name, value)) = auth_header {
        insert(&mut headers, name, value)?;
    }
    if let Some(body) = request.body() {
        insert(&mut headers, CONTENT_TYPE.as_str(), body.content_type())?;
    }
    for (name, value) in request.headers() {
        insert(&mut headers, name, value)?;
    }
    Ok(headers)
}

fn insert(headers: &mut HeaderMap, name: &str, value: &str) -> Result<(), ConfigurationError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| ConfigurationError::Invalid(format!("invalid header name `{name}`: {e}")))?;
    let mut value = HeaderValue::from_str(value)
        .map_err(|e| ConfigurationError::Invalid(format!("invalid value for header `{name}`: {e}")))?;
    if is_sensitive(&name) {
        value.set_sensitive(true);
    }
    headers.insert(name, value);
    Ok(())
}

fn is_sensitive(name: &HeaderName) -> bool {
    let name = name.as_str();
    name == "authorization" || name.contains("key") || name.contains("token")
}

/// Send one request and buffer the whole body.
pub(super) async fn execute(
    http: &reqwest::Client,
    request: &RequestDescriptor,
    url: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
) -> Result<RawResponse, reqwest::Error> {
    let mut builder = http.request(request.method().clone(), url);
    builder = match request.body() {
        Some(RequestBody::Json(value)) => builder.body(value.to_string()),
        Some(RequestBody::Text { body, .. }) => builder.body(body.clone()),
        Some(RequestBody::Bytes { data, .. }) => builder.body(data.clone()),
        Some(RequestBody::Form(fields)) => builder.form(fields),
        None => builder,
    };
    builder = builder.headers(headers);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.bytes().await?.to_vec();
    Ok(RawResponse {
        status,
        headers,
        body,
    })
}
