//! Repeater - manual single-request replay
//!
//! No scope filtering and no retries: the operator asked for exactly this
//! request, and a transport failure comes back as a typed error.

use crate::{DispatchError, HttpRequestData, HttpResponseData, RequestDispatcher};
use proxy_common::{HttpMessage, ParseError};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

/// Failure of a repeater send
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepeaterError {
    #[error("{0}")]
    Parse(#[from] ParseError),

    #[error("{0}")]
    Dispatch(#[from] DispatchError),
}

/// Sends one structured request through the outbound client
#[derive(Clone)]
pub struct Repeater {
    dispatcher: Arc<dyn RequestDispatcher>,
}

impl Repeater {
    pub fn new(dispatcher: Arc<dyn RequestDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Send a parsed request message
    pub async fn send(&self, message: &HttpMessage) -> Result<HttpResponseData, RepeaterError> {
        let request = HttpRequestData::from_message(message)?;
        Ok(self.send_request(request).await?)
    }

    /// Parse operator-edited raw text and send it
    pub async fn send_raw(&self, raw: &str) -> Result<HttpResponseData, RepeaterError> {
        let message = HttpMessage::parse_request(raw)?;
        self.send(&message).await
    }

    /// Send an already structured request
    pub async fn send_request(&self, request: HttpRequestData) -> Result<HttpResponseData, DispatchError> {
        let method = request.method.clone();
        let url = request.url.clone();
        let start = Instant::now();

        match self.dispatcher.dispatch(request).await {
            Ok(response) => {
                info!(
                    method = %method,
                    url = %url,
                    status = response.status_code,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Repeater request completed"
                );
                Ok(response)
            }
            Err(e) => {
                warn!(method = %method, url = %url, "Repeater request failed: {}", e);
                Err(e)
            }
        }
    }
}
