//! HTTP boundary between stores and the back-office API.

pub mod envelope;
pub mod http;
pub mod json;

pub use envelope::{ApiEnvelope, ListPayload};
pub use http::HttpTransport;

use crate::error::StoreError;
use ::http::Method;
use serde_json::Value;

/// One outgoing API call, relative to the transport's base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Sends `If-None-Match`; a `304` comes back as a normal response.
    pub if_none_match: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            if_none_match: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query = pairs;
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn if_none_match(mut self, etag: Option<String>) -> Self {
        self.if_none_match = etag;
        self
    }

    /// `path?k=v&...` with the query in request order. Used for logs and test routing.
    pub fn target(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query: Vec<String> = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect();
        format!("{}?{}", self.path, query.join("&"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub body: String,
}

impl ApiResponse {
    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }
}

/// Issues API calls. Dropping the returned future aborts the call.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Resolves to the response for any 2xx or 304 status; every other
    /// outcome (connection failure, timeout, error status) is an `Err`.
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_encodes_query_in_order() {
        let req = ApiRequest::get("/api/admin/tours").query(vec![
            ("page".to_owned(), "1".to_owned()),
            ("search".to_owned(), "machu picchu".to_owned()),
        ]);
        assert_eq!(req.target(), "/api/admin/tours?page=1&search=machu%20picchu");
        assert_eq!(ApiRequest::get("/x").target(), "/x");
    }
}
