//! Response normalization: status + content-type decide the payload shape,
//! non-2xx statuses become a typed [`ApiError`].

use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::SystemTime;

use super::request::ResponseType;
use crate::error::ApiError;

const REQUEST_ID_HEADERS: &[&str] = &[
    "x-request-id",
    "request-id",
    "x-goog-request-id",
    "x-amzn-requestid",
];

/// Fully buffered HTTP response, before interpretation.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Successful payload shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
    Empty,
    /// HEAD probe result: `true` for 200/204.
    Active(bool),
}

/// A successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub payload: Payload,
    /// Set on 206: the call worked but more data is available.
    pub more_available: bool,
    pub request_id: Option<String>,
    pub content_type: Option<String>,
}

impl ApiResponse {
    pub fn json(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Decode a JSON payload (or `null` for an empty one) into `T`.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, String> {
        let value = match self.payload {
            Payload::Json(value) => value,
            Payload::Empty => Value::Null,
            Payload::Active(active) => Value::Bool(active),
            Payload::Text(text) => {
                return Err(format!(
                    "expected JSON but got text ({} bytes)",
                    text.len()
                ))
            }
            Payload::Binary(bytes) => {
                return Err(format!(
                    "expected JSON but got binary ({} bytes)",
                    bytes.len()
                ))
            }
        };
        serde_json::from_value(value).map_err(|e| e.to_string())
    }
}

/// Success or typed failure.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedResponse {
    Success(ApiResponse),
    Failure(ApiError),
}

impl NormalizedResponse {
    pub fn into_result(self) -> Result<ApiResponse, ApiError> {
        match self {
            Self::Success(response) => Ok(response),
            Self::Failure(err) => Err(err),
        }
    }
}

/// Interpret one buffered response.
///
/// Order of decisions:
/// 1. HEAD probes report [`Payload::Active`] without looking at the body
///    (401 still fails so the caller can refresh).
/// 2. A caller-declared binary response returns the bytes as-is on
///    success; on failure the bytes are buffered before the error is built.
/// 3. 204 is always [`Payload::Empty`]; so is a zero-length body.
/// 4. JSON content types are parsed; a parse failure degrades to text.
/// 5. Everything else is text, or bytes when the body is not UTF-8.
pub fn normalize(raw: RawResponse, response_type: ResponseType, head: bool) -> NormalizedResponse {
    let request_id = request_id(&raw.headers);
    let content_type = content_type(&raw.headers);
    let status = raw.status;
    let success = (200..300).contains(&status);

    if head && status != 401 {
        return NormalizedResponse::Success(ApiResponse {
            status,
            payload: Payload::Active(status == 200 || status == 204),
            more_available: false,
            request_id,
            content_type,
        });
    }

    if !success {
        return NormalizedResponse::Failure(api_error(&raw, request_id));
    }

    let payload = if response_type == ResponseType::Binary {
        Payload::Binary(raw.body)
    } else if status == 204 || raw.body.is_empty() {
        Payload::Empty
    } else if response_type == ResponseType::Text {
        Payload::Text(String::from_utf8_lossy(&raw.body).into_owned())
    } else if content_type.as_deref().is_some_and(is_json_type) {
        match serde_json::from_slice::<Value>(&raw.body) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Text(String::from_utf8_lossy(&raw.body).into_owned()),
        }
    } else {
        match String::from_utf8(raw.body) {
            Ok(text) => Payload::Text(text),
            Err(err) => Payload::Binary(err.into_bytes()),
        }
    };

    NormalizedResponse::Success(ApiResponse {
        status,
        payload,
        more_available: status == 206,
        request_id,
        content_type,
    })
}

fn api_error(raw: &RawResponse, request_id: Option<String>) -> ApiError {
    let text = String::from_utf8_lossy(&raw.body);
    let body = serde_json::from_slice::<Value>(&raw.body).ok();
    let (extracted, provider_code) = body
        .as_ref()
        .map(extract_error_fields)
        .unwrap_or((None, None));

    let message = extracted
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .or_else(|| {
            StatusCode::from_u16(raw.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("HTTP {}", raw.status));

    ApiError {
        status: raw.status,
        message,
        provider_code,
        request_id,
        retry_after_secs: retry_after_secs(&raw.headers),
        body,
    }
}

/// Most specific message and provider code found in a JSON error body.
///
/// Covers the shapes seen across providers: `{"error":{"message","status"}}`,
/// `{"code","message"}`, `{"detail":...}`, OAuth `{"error","error_description"}`
/// and `{"errors":[{"message","code"}]}`.
pub fn extract_error_fields(body: &Value) -> (Option<String>, Option<String>) {
    let error = body.get("error");
    let detail = body.get("detail");
    let first_error = body
        .get("errors")
        .and_then(Value::as_array)
        .and_then(|errors| errors.first());

    let message = error
        .and_then(|e| e.get("message"))
        .and_then(non_empty_str)
        .or_else(|| body.get("message").and_then(non_empty_str))
        .or_else(|| detail.and_then(non_empty_str))
        .or_else(|| detail.and_then(|d| d.get("message")).and_then(non_empty_str))
        .or_else(|| body.get("error_description").and_then(non_empty_str))
        .or_else(|| error.and_then(non_empty_str))
        .or_else(|| first_error.and_then(|e| e.get("message")).and_then(non_empty_str));

    let error_string = error.and_then(non_empty_str);
    let code = body
        .get("code")
        .and_then(scalar_string)
        .or_else(|| error.and_then(|e| e.get("status")).and_then(non_empty_str))
        .or_else(|| error.and_then(|e| e.get("code")).and_then(scalar_string))
        .or_else(|| detail.and_then(|d| d.get("status")).and_then(non_empty_str))
        .or_else(|| first_error.and_then(|e| e.get("code")).and_then(scalar_string))
        .or_else(|| error_string.clone().filter(|code| message.as_ref() != Some(code)));

    (message, code)
}

/// Seconds to wait from a `Retry-After` header (delta-seconds or HTTP-date).
pub fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Some(secs);
    }
    let at = httpdate::parse_http_date(raw).ok()?;
    Some(
        at.duration_since(SystemTime::now())
            .map(|d| d.as_secs())
            .unwrap_or(0),
    )
}

fn request_id(headers: &HeaderMap) -> Option<String> {
    REQUEST_ID_HEADERS.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    })
}

fn content_type(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let mime = raw.split(';').next().unwrap_or_default().trim();
    (!mime.is_empty()).then(|| mime.to_ascii_lowercase())
}

fn is_json_type(mime: &str) -> bool {
    mime == "application/json" || mime.ends_with("+json")
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        other => non_empty_str(other),
    }
}
