//! reqwest-backed [`Transport`].

use super::{ApiRequest, ApiResponse, Transport};
use crate::error::{StoreError, extract_message};
use crate::utils::{fmt_duration, log_if_slow};
use ::http::Extensions;
use ::http::header::{AUTHORIZATION, ETAG, IF_NONE_MATCH};
use anyhow::Context;
use reqwest::{Request, Response};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};
use url::Url;

const SLOW_REQUEST: Duration = Duration::from_millis(1500);

/// Logs every outgoing request with its status and duration.
struct RequestLogger;

#[async_trait::async_trait]
impl Middleware for RequestLogger {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let path = req.url().path().to_owned();
        let start = Instant::now();

        let result = next.run(req, extensions).await;

        let duration = start.elapsed();
        match &result {
            Ok(response) => {
                let status = response.status().as_u16();
                match status {
                    200..=399 => trace!(%method, path, status, duration = fmt_duration(duration), "API response"),
                    _ => debug!(%method, path, status, duration = fmt_duration(duration), "API error response"),
                }
            }
            Err(e) => {
                warn!(%method, path, error = %e, duration = fmt_duration(duration), "API request failed");
            }
        }
        log_if_slow(start, SLOW_REQUEST, &format!("{method} {path}"));
        result
    }
}

pub struct HttpTransport {
    client: ClientWithMiddleware,
    base_url: Url,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("invalid API base URL {base_url:?}"))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("tourdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        let client = ClientBuilder::new(client).with(RequestLogger).build();
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, StoreError> {
        let mut url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|e| StoreError::network(format!("invalid request path {:?}: {e}", request.path)))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, StoreError> {
        let url = self.url_for(&request)?;
        let mut builder = self.client.request(request.method.clone(), url);
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(etag) = &request.if_none_match {
            builder = builder.header(IF_NONE_MATCH, etag);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.text().await?;

        if status == 304 || (200..300).contains(&status) {
            return Ok(ApiResponse { status, etag, body });
        }
        Err(StoreError::Network {
            status: Some(status),
            message: extract_message(&body, status),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_paths_and_query() {
        let transport =
            HttpTransport::new("https://admin.example.com/", None, Duration::from_secs(5)).unwrap();
        let req = ApiRequest::get("/api/admin/tours")
            .query(vec![("status".to_owned(), "pending,rejected".to_owned())]);
        let url = transport.url_for(&req).unwrap();
        assert_eq!(
            url.as_str(),
            "https://admin.example.com/api/admin/tours?status=pending%2Crejected"
        );
    }

    #[test]
    fn rejects_bad_base_url() {
        assert!(HttpTransport::new("not a url", None, Duration::from_secs(1)).is_err());
    }
}
