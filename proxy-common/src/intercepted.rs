//! Requests captured by the external proxy engine

use crate::headers::Headers;
use crate::message::{HttpMessage, StartLine, DEFAULT_PROTOCOL};
use serde::{Deserialize, Serialize};

/// A request held by the capture engine, awaiting an operator decision
///
/// `id` is assigned by the engine and identifies the entry for forward, drop
/// and remove commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptedRequest {
    pub id: String,
    pub method: String,
    pub url: String,
    pub host: String,
    pub path: String,
    #[serde(default)]
    pub headers: Headers,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub scheme: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    pub timestamp: String,
}

impl InterceptedRequest {
    pub fn is_https(&self) -> bool {
        match &self.scheme {
            Some(scheme) => scheme.eq_ignore_ascii_case("https"),
            None => self.url.starts_with("https://"),
        }
    }

    /// Body text, treating an empty body as absent
    pub fn body_text(&self) -> Option<&str> {
        self.body.as_deref().filter(|body| !body.is_empty())
    }

    /// Render as an editable message
    ///
    /// https requests use the absolute URL as target so that re-parsing the
    /// edited text keeps the scheme.
    pub fn to_message(&self) -> HttpMessage {
        let target = if self.is_https() { self.url.clone() } else { self.path.clone() };

        let mut headers = self.headers.clone();
        if !headers.contains("Host") {
            headers.prepend("Host", self.host.clone());
        }

        HttpMessage {
            start_line: StartLine::Request {
                method: self.method.clone(),
                target,
                protocol: DEFAULT_PROTOCOL.to_string(),
            },
            headers,
            body: self.body_text().unwrap_or_default().to_string(),
        }
    }

    /// Raw text shown to the operator
    pub fn format(&self) -> String {
        self.to_message().format()
    }
}
