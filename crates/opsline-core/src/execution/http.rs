//! Outbound HTTP port used by API steps.
//!
//! The trait is defined here and implemented in opsline-infra with reqwest.
//! It returns boxed futures so executors can hold it as `Arc<dyn HttpClient>`.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use thiserror::Error;

/// A fully resolved outbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    /// Upper-case HTTP method.
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    /// JSON body, sent with `Content-Type: application/json`.
    pub body: Option<Value>,
}

/// A received response. The body is kept as raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, Clone, Error)]
pub enum HttpError {
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),

    #[error("request to '{url}' failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Object-safe HTTP client.
pub trait HttpClient: Send + Sync {
    fn send<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;
}
