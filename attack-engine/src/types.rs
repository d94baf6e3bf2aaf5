//! Core data types for the attack engine

use proxy_common::{Headers, HttpMessage, ParseError};
use serde::{Deserialize, Serialize};

/// Structured outbound request handed to the HTTP client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequestData {
    pub method: String,
    pub url: String,
    pub headers: Headers,
    pub body: String,
}

/// Structured response returned by the HTTP client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpResponseData {
    pub status_code: u16,
    #[serde(default)]
    pub reason: Option<String>,
    pub headers: Headers,
    /// Body as text; bytes that are not valid UTF-8 are replaced
    pub body: String,
    /// Size of the body as received, in bytes
    #[serde(default)]
    pub size: usize,
}

/// Execution settings for intruder sweeps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntruderConfig {
    /// Fixed pause between consecutive requests
    pub request_delay_ms: u64,
    /// Maximum requests in flight; 1 keeps the sweep strictly sequential
    pub concurrency: usize,
}

impl Default for IntruderConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 100,
            concurrency: 1,
        }
    }
}

/// Status recorded for one sweep position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackStatus {
    Code(u16),
    /// The request could not be built or dispatched
    Error,
}

/// Response detail kept with each result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttackResponse {
    Response(HttpResponseData),
    Error { message: String },
}

/// Outcome of one dispatched intruder request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackResult {
    /// 1-based sweep position
    pub index: usize,
    pub payload: String,
    pub status: AttackStatus,
    /// Response body size in bytes, 0 on error
    pub length: usize,
    pub elapsed_ms: u64,
    pub response: AttackResponse,
    pub executed_at: chrono::DateTime<chrono::Utc>,
}

/// Intruder lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackState {
    Idle,
    Running,
    Stopped,
}

/// Progress snapshot published after every completed iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackProgress {
    pub state: AttackState,
    pub completed: usize,
    pub total: usize,
}

impl AttackProgress {
    pub fn idle() -> Self {
        Self {
            state: AttackState::Idle,
            completed: 0,
            total: 0,
        }
    }
}

impl HttpRequestData {
    /// Create a new HTTP request
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: Headers::new(),
            body: String::new(),
        }
    }

    /// Build the outbound request from a parsed request message
    pub fn from_message(message: &HttpMessage) -> Result<Self, ParseError> {
        let method = message.method().ok_or(ParseError::NotARequest)?;
        Ok(Self {
            method: method.to_string(),
            url: message.effective_url()?,
            headers: message.headers.clone(),
            body: message.body.clone(),
        })
    }

    /// Parse raw request text straight into an outbound request
    pub fn from_raw(raw: &str) -> Result<Self, ParseError> {
        Self::from_message(&HttpMessage::parse_request(raw)?)
    }
}

impl HttpResponseData {
    /// Build from the raw body bytes, keeping their exact size
    pub fn from_bytes(status_code: u16, reason: Option<String>, headers: Headers, body: &[u8]) -> Self {
        Self {
            status_code,
            reason,
            headers,
            body: String::from_utf8_lossy(body).into_owned(),
            size: body.len(),
        }
    }

    /// Check if response indicates success (2xx status code)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Get response body length in bytes as received
    pub fn body_length(&self) -> usize {
        self.size
    }

    /// Render as a raw-text response message
    pub fn to_message(&self) -> HttpMessage {
        let mut message = HttpMessage::response(
            self.status_code,
            self.reason.clone().unwrap_or_default(),
        );
        message.headers = self.headers.clone();
        message.body = self.body.clone();
        message
    }
}

impl AttackResult {
    /// Record a response received for a payload
    pub fn succeeded(index: usize, payload: String, response: HttpResponseData, elapsed_ms: u64) -> Self {
        Self {
            index,
            payload,
            status: AttackStatus::Code(response.status_code),
            length: response.body_length(),
            elapsed_ms,
            response: AttackResponse::Response(response),
            executed_at: chrono::Utc::now(),
        }
    }

    /// Record a payload whose request failed before a response arrived
    pub fn failed(index: usize, payload: String, message: String, elapsed_ms: u64) -> Self {
        Self {
            index,
            payload,
            status: AttackStatus::Error,
            length: 0,
            elapsed_ms,
            response: AttackResponse::Error { message },
            executed_at: chrono::Utc::now(),
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self.status {
            AttackStatus::Code(code) => Some(code),
            AttackStatus::Error => None,
        }
    }

    /// Check if the result indicates success
    pub fn is_success(&self) -> bool {
        match &self.response {
            AttackResponse::Response(response) => response.is_success(),
            AttackResponse::Error { .. } => false,
        }
    }
}
