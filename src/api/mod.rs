//! Authenticated request core.
//!
//! The API layer is split into cohesive modules:
//! - `request`: immutable call descriptions and URL assembly
//! - `response`: status/content-type normalization and typed errors
//! - `client`: auth, refresh-once and dispatch orchestration
//! - `pagination`: cursor following on top of any [`Dispatch`]

use async_trait::async_trait;

use crate::error::ClientError;

mod client;
pub mod pagination;
pub mod request;
pub mod response;

pub use client::{ApiClient, RetryPolicy};
pub use request::{QueryValue, RequestBody, RequestDescriptor, ResponseType};
pub use response::{ApiResponse, NormalizedResponse, Payload, RawResponse};

/// Minimal dispatch interface used by pagination and embedding code.
///
/// This trait lets tests provide scripted responses without network calls
/// while the production path uses [`ApiClient`].
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn send(&self, request: &RequestDescriptor) -> Result<ApiResponse, ClientError>;
}
