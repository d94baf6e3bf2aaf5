//! reqwest-backed outbound HTTP client

use crate::{DispatchError, HttpRequestData, HttpResponseData, RequestDispatcher};
use async_trait::async_trait;
use proxy_common::Headers;
use std::time::Duration;
use tracing::{debug, error};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatcher executing requests with a shared reqwest client
///
/// Certificates are not verified and redirects are not followed: the
/// operator sees exactly what the target returned.
#[derive(Debug, Clone)]
pub struct ReqwestDispatcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestDispatcher {
    pub fn new(timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    fn map_error(&self, err: reqwest::Error) -> DispatchError {
        if err.is_timeout() {
            DispatchError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }
        } else if err.is_builder() {
            DispatchError::invalid_request(err.to_string())
        } else {
            DispatchError::transport(err.to_string())
        }
    }
}

#[async_trait]
impl RequestDispatcher for ReqwestDispatcher {
    async fn dispatch(&self, request: HttpRequestData) -> Result<HttpResponseData, DispatchError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| DispatchError::invalid_request(format!("Invalid method: {}", request.method)))?;

        debug!(method = %method, url = %request.url, "Dispatching request");

        let mut builder = self.client.request(method, &request.url);
        for (key, value) in request.headers.iter() {
            // Recomputed from the actual body; a stale value breaks substituted requests
            if key.eq_ignore_ascii_case("content-length") {
                continue;
            }
            builder = builder.header(key, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(|e| {
            error!("HTTP request to {} failed: {}", request.url, e);
            self.map_error(e)
        })?;

        let status = response.status();
        let headers: Headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        // Raw bytes, not charset-decoded text: the length must match what was sent
        let body = response.bytes().await.map_err(|e| self.map_error(e))?;

        Ok(HttpResponseData::from_bytes(
            status.as_u16(),
            status.canonical_reason().map(str::to_string),
            headers,
            &body,
        ))
    }
}
