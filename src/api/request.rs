//! Immutable per-call request description and URL assembly.

use reqwest::{Method, Url};
use serde_json::Value;
use std::time::Duration;

use crate::error::ConfigurationError;

/// Path placeholder replaced by the resolved customer id.
pub const CUSTOMER_ID_PLACEHOLDER: &str = "{customer_id}";

/// One query parameter value. `Absent` and empty strings are never sent.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Absent,
}

impl QueryValue {
    /// Wire form, or `None` when the parameter must be omitted.
    pub fn render(&self) -> Option<String> {
        match self {
            Self::Str(s) if s.is_empty() => None,
            Self::Str(s) => Some(s.clone()),
            Self::Int(n) => Some(n.to_string()),
            Self::Float(n) => Some(n.to_string()),
            Self::Bool(b) => Some(b.to_string()),
            Self::Absent => None,
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for QueryValue {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for QueryValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for QueryValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl<T: Into<QueryValue>> From<Option<T>> for QueryValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Into::into)
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Object or array, sent as `application/json`.
    Json(Value),
    Text { content_type: String, body: String },
    /// Raw binary or caller-assembled multipart payload.
    Bytes { content_type: String, data: Vec<u8> },
    Form(Vec<(String, String)>),
}

impl RequestBody {
    pub fn content_type(&self) -> &str {
        match self {
            Self::Json(_) => "application/json",
            Self::Text { content_type, .. } | Self::Bytes { content_type, .. } => content_type,
            Self::Form(_) => "application/x-www-form-urlencoded",
        }
    }
}

/// Caller-declared handling of the response body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseType {
    /// Decide from status and content-type.
    #[default]
    Auto,
    /// Always return text.
    Text,
    /// Always return the raw bytes, even on failure.
    Binary,
}

/// Everything needed to issue one call. Built once, never mutated after.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    query: Vec<(String, QueryValue)>,
    headers: Vec<(String, String)>,
    body: Option<RequestBody>,
    response_type: ResponseType,
    timeout: Option<Duration>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            response_type: ResponseType::Auto,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn head(path: impl Into<String>) -> Self {
        Self::new(Method::HEAD, path)
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Header override; applied after every header the client adds itself.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(RequestBody::Json(body));
        self
    }

    pub fn text(mut self, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        self.body = Some(RequestBody::Text {
            content_type: content_type.into(),
            body: body.into(),
        });
        self
    }

    pub fn bytes(mut self, content_type: impl Into<String>, data: Vec<u8>) -> Self {
        self.body = Some(RequestBody::Bytes {
            content_type: content_type.into(),
            data,
        });
        self
    }

    pub fn form(mut self, fields: Vec<(String, String)>) -> Self {
        self.body = Some(RequestBody::Form(fields));
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Per-call deadline, overriding the client default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn body(&self) -> Option<&RequestBody> {
        self.body.as_ref()
    }

    pub fn get_response_type(&self) -> ResponseType {
        self.response_type
    }

    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    /// Query pairs that will actually be sent, in insertion order.
    pub fn encoded_query(&self) -> Vec<(&str, String)> {
        self.query
            .iter()
            .filter_map(|(name, value)| value.render().map(|v| (name.as_str(), v)))
            .collect()
    }

    /// Final URL: base (unless the path is absolute) + path + query, plus an
    /// optional auth query parameter appended last.
    pub fn build_url(
        &self,
        base_url: &str,
        customer_id: Option<&str>,
        auth_param: Option<(&str, &str)>,
    ) -> Result<Url, ConfigurationError> {
        let path = self.expanded_path(customer_id)?;
        let raw = if is_absolute(&path) {
            path
        } else if path.is_empty() {
            base_url.to_string()
        } else {
            format!(
                "{}/{}",
                base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| ConfigurationError::Invalid(format!("invalid request url `{raw}`: {e}")))?;

        let pairs = self.encoded_query();
        if !pairs.is_empty() || auth_param.is_some() {
            let mut query = url.query_pairs_mut();
            for (name, value) in &pairs {
                query.append_pair(name, value);
            }
            if let Some((name, value)) = auth_param {
                query.append_pair(name, value);
            }
        }
        Ok(url)
    }

    fn expanded_path(&self, customer_id: Option<&str>) -> Result<String, ConfigurationError> {
        if !self.path.contains(CUSTOMER_ID_PLACEHOLDER) {
            return Ok(self.path.clone());
        }
        match customer_id {
            Some(id) => Ok(self.path.replace(CUSTOMER_ID_PLACEHOLDER, id)),
            None => Err(ConfigurationError::MissingPrerequisite {
                field: "customer_id".to_string(),
                hint: format!(
                    "`{}` needs a customer id; set customer_id in the profile or <PREFIX>_CUSTOMER_ID",
                    self.path
                ),
            }),
        }
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with("https://") || path.starts_with("http://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_and_empty_params_are_omitted() {
        let req = RequestDescriptor::get("/v2/domains/available")
            .query("domain", "example.com")
            .query("period", 1)
            .query("checkType", None::<&str>)
            .query("forTransfer", "");
        let url = req.build_url("https://api.godaddy.com", None, None).expect("url");
        assert_eq!(
            url.as_str(),
            "https://api.godaddy.com/v2/domains/available?domain=example.com&period=1"
        );
    }

    #[test]
    fn url_without_params_has_no_trailing_question_mark() {
        let req = RequestDescriptor::get("files").query("pageToken", QueryValue::Absent);
        let url = req.build_url("https://www.googleapis.com/drive/v3/", None, None).expect("url");
        assert_eq!(url.as_str(), "https://www.googleapis.com/drive/v3/files");
    }

    #[test]
    fn booleans_and_values_are_percent_encoded() {
        let req = RequestDescriptor::get("/search")
            .query("q", "name contains 'a&b'")
            .query("supportsAllDrives", true);
        let url = req.build_url("https://example.test", None, None).expect("url");
        assert_eq!(
            url.query(),
            Some("q=name+contains+%27a%26b%27&supportsAllDrives=true")
        );
    }

    #[test]
    fn absolute_path_bypasses_base_url() {
        let req = RequestDescriptor::post("https://upload.example.test/upload/files")
            .query("uploadType", "multipart");
        let url = req.build_url("https://api.example.test/v3", None, None).expect("url");
        assert_eq!(
            url.as_str(),
            "https://upload.example.test/upload/files?uploadType=multipart"
        );
    }

    #[test]
    fn customer_id_placeholder_is_substituted_or_required() {
        let req = RequestDescriptor::post("/v2/customers/{customer_id}/domains/purchase");
        let url = req
            .build_url("https://api.godaddy.com", Some("c-42"), None)
            .expect("url");
        assert_eq!(url.path(), "/v2/customers/c-42/domains/purchase");

        let err = req
            .build_url("https://api.godaddy.com", None, None)
            .expect_err("must fail");
        assert!(matches!(
            err,
            ConfigurationError::MissingPrerequisite { ref field, .. } if field == "customer_id"
        ));
    }

    #[test]
    fn auth_param_is_appended_after_caller_params() {
        let req = RequestDescriptor::get("/v4/spreadsheets/abc").query("ranges", "A1:B2");
        let url = req
            .build_url("https://sheets.googleapis.com", None, Some(("key", "k-1")))
            .expect("url");
        assert_eq!(url.query(), Some("ranges=A1%3AB2&key=k-1"));
    }

    #[test]
    fn builder_records_body_and_overrides() {
        let req = RequestDescriptor::patch("/items/1")
            .json(json!({"name": "x"}))
            .header("Accept", "text/plain")
            .response_type(ResponseType::Text)
            .timeout(Duration::from_secs(2));
        assert_eq!(req.method(), &Method::PATCH);
        assert_eq!(req.body().map(RequestBody::content_type), Some("application/json"));
        assert_eq!(req.headers(), &[("Accept".to_string(), "text/plain".to_string())]);
        assert_eq!(req.get_response_type(), ResponseType::Text);
        assert_eq!(req.get_timeout(), Some(Duration::from_secs(2)));
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        fn query_value() -> impl Strategy<Value = QueryValue> {
            prop_oneof![
                Just(QueryValue::Absent),
                Just(QueryValue::Str(String::new())),
                "[a-z0-9 &=?]{1,12}".prop_map(QueryValue::Str),
                any::<i64>().prop_map(QueryValue::Int),
                any::<bool>().prop_map(QueryValue::Bool),
            ]
        }

        proptest! {
            #[test]
            fn omitted_params_never_reach_the_url(
                params in proptest::collection::vec(("[a-z]{1,8}", query_value()), 0..10)
            ) {
                let mut req = RequestDescriptor::get("/p");
                for (name, value) in &params {
                    req = req.query(name.clone(), value.clone());
                }
                let url = req.build_url("https://example.test", None, None).expect("url");
                let sent: Vec<(String, String)> = url
                    .query_pairs()
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                let expected: Vec<(String, String)> = params
                    .iter()
                    .filter_map(|(name, value)| value.render().map(|v| (name.clone(), v)))
                    .collect();
                prop_assert_eq!(&sent, &expected);
                prop_assert!(sent.iter().all(|(_, v)| !v.is_empty()));

                // Building twice yields the same URL.
                let again = req.build_url("https://example.test", None, None).expect("url");
                prop_assert_eq!(url, again);
            }
        }
    }
}
