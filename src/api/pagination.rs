//! Cursor pagination over any [`Dispatch`] implementation.

use serde_json::Value;

use super::request::RequestDescriptor;
use super::response::Payload;
use super::Dispatch;
use crate::error::ClientError;

/// Where the cursor lives on the way out and on the way back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor {
    /// Query parameter carrying the cursor, e.g. `pageToken`.
    pub request_param: String,
    /// Top-level response field holding the next cursor, e.g. `nextPageToken`.
    pub response_field: String,
}

impl Default for PageCursor {
    fn default() -> Self {
        Self {
            request_param: "pageToken".to_string(),
            response_field: "nextPageToken".to_string(),
        }
    }
}

/// Follow the cursor until it runs out, a non-JSON page arrives, or
/// `max_pages` pages have been collected. Returns every JSON page in order.
///
/// A 206 page without a cursor also ends the walk: the provider signalled
/// more data but gave no way to ask for it.
pub async fn collect_pages<D>(
    client: &D,
    request: &RequestDescriptor,
    cursor: &PageCursor,
    max_pages: usize,
) -> Result<Vec<Value>, ClientError>
where
    D: Dispatch + ?Sized,
{
    let mut pages = Vec::new();
    let mut next: Option<String> = None;
    while pages.len() < max_pages {
        let page_request = match &next {
            Some(token) => request
                .clone()
                .query(cursor.request_param.clone(), token.clone()),
            None => request.clone(),
        };
        let response = client.send(&page_request).await?;
        let Payload::Json(value) = response.payload else {
            break;
        };
        next = value
            .get(&cursor.response_field)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        pages.push(value);
        if next.is_none() {
            if response.more_available {
                tracing::debug!("partial page without cursor; stopping pagination");
            }
            break;
        }
    }
    Ok(pages)
}
