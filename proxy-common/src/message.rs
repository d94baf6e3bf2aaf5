//! Raw-text HTTP message parsing and formatting
//!
//! The text form is what the operator edits: a start line, `key: value`
//! header lines, a blank line and the body. `parse` and `format` are inverse
//! operations for any message whose header names contain no `:` or newline.

use crate::headers::Headers;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Protocol used when a request line omits it
pub const DEFAULT_PROTOCOL: &str = "HTTP/1.1";

/// Errors raised while parsing raw HTTP text
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Missing start line")]
    MissingStartLine,

    #[error("Missing or invalid request method in start line: {line}")]
    MissingMethod { line: String },

    #[error("Missing request target in start line: {line}")]
    MissingTarget { line: String },

    #[error("Malformed header line: {line}")]
    MalformedHeader { line: String },

    #[error("Invalid status code: {value}")]
    InvalidStatus { value: String },

    #[error("No Host header and request target is not an absolute URL")]
    MissingHost,

    #[error("Message is not a request")]
    NotARequest,
}

/// First line of an HTTP message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StartLine {
    Request {
        method: String,
        target: String,
        protocol: String,
    },
    Response {
        protocol: String,
        status: u16,
        reason: String,
    },
}

impl fmt::Display for StartLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartLine::Request { method, target, protocol } => {
                write!(f, "{} {} {}", method, target, protocol)
            }
            StartLine::Response { protocol, status, reason } if reason.is_empty() => {
                write!(f, "{} {}", protocol, status)
            }
            StartLine::Response { protocol, status, reason } => {
                write!(f, "{} {} {}", protocol, status, reason)
            }
        }
    }
}

/// Structured HTTP request or response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpMessage {
    pub start_line: StartLine,
    pub headers: Headers,
    pub body: String,
}

impl HttpMessage {
    /// Create a request with no headers and an empty body
    pub fn request(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            start_line: StartLine::Request {
                method: method.into(),
                target: target.into(),
                protocol: DEFAULT_PROTOCOL.to_string(),
            },
            headers: Headers::new(),
            body: String::new(),
        }
    }

    /// Create a response with no headers and an empty body
    pub fn response(status: u16, reason: impl Into<String>) -> Self {
        Self {
            start_line: StartLine::Response {
                protocol: DEFAULT_PROTOCOL.to_string(),
                status,
                reason: reason.into(),
            },
            headers: Headers::new(),
            body: String::new(),
        }
    }

    /// Parse raw text, detecting a response by an `HTTP/` first token
    pub fn parse(raw: &str) -> Result<Self, ParseError> {
        let (start, header_lines, body) = split_message(raw)?;
        let start_line = if start.starts_with("HTTP/") {
            parse_status_line(start)?
        } else {
            parse_request_line(start)?
        };
        Self::assemble(start_line, header_lines, body)
    }

    /// Parse raw text that must be a request
    pub fn parse_request(raw: &str) -> Result<Self, ParseError> {
        let (start, header_lines, body) = split_message(raw)?;
        let start_line = parse_request_line(start)?;
        Self::assemble(start_line, header_lines, body)
    }

    /// Parse raw text that must be a response
    pub fn parse_response(raw: &str) -> Result<Self, ParseError> {
        let (start, header_lines, body) = split_message(raw)?;
        let start_line = parse_status_line(start)?;
        Self::assemble(start_line, header_lines, body)
    }

    fn assemble(start_line: StartLine, header_lines: Vec<&str>, body: &str) -> Result<Self, ParseError> {
        let mut headers = Headers::new();
        for line in header_lines {
            let (key, value) = line.split_once(':').ok_or_else(|| ParseError::MalformedHeader {
                line: line.to_string(),
            })?;
            let key = key.trim();
            if key.is_empty() {
                return Err(ParseError::MalformedHeader { line: line.to_string() });
            }
            headers.append(key, value.trim());
        }

        Ok(Self {
            start_line,
            headers,
            body: body.trim_end_matches(['\r', '\n']).to_string(),
        })
    }

    /// Serialize to canonical raw text
    pub fn format(&self) -> String {
        let mut text = format!("{}\n", self.start_line);
        for (key, value) in self.headers.iter() {
            text.push_str(key);
            text.push_str(": ");
            text.push_str(value);
            text.push('\n');
        }
        text.push('\n');
        if !self.body.is_empty() {
            text.push_str(&self.body);
        }
        text
    }

    pub fn is_request(&self) -> bool {
        matches!(self.start_line, StartLine::Request { .. })
    }

    pub fn method(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { method, .. } => Some(method),
            StartLine::Response { .. } => None,
        }
    }

    pub fn target(&self) -> Option<&str> {
        match &self.start_line {
            StartLine::Request { target, .. } => Some(target),
            StartLine::Response { .. } => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match &self.start_line {
            StartLine::Request { .. } => None,
            StartLine::Response { status, .. } => Some(*status),
        }
    }

    /// Scheme of the effective URL: taken from an absolute target, `http` otherwise
    pub fn scheme(&self) -> Option<&'static str> {
        let target = self.target()?;
        if target.starts_with("https://") {
            Some("https")
        } else {
            Some("http")
        }
    }

    /// URL the request should be sent to
    ///
    /// An absolute `http://` / `https://` target is used as-is. Otherwise the URL is
    /// built from `http`, the `Host` header and the target.
    pub fn effective_url(&self) -> Result<String, ParseError> {
        let target = self.target().ok_or(ParseError::NotARequest)?;
        if target.starts_with("http://") || target.starts_with("https://") {
            return Ok(target.to_string());
        }

        let host = self.headers.get("Host").ok_or(ParseError::MissingHost)?;
        Ok(format!("http://{}{}", host, target))
    }
}

impl fmt::Display for HttpMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

/// Split raw text into start line, header lines and body
fn split_message(raw: &str) -> Result<(&str, Vec<&str>, &str), ParseError> {
    let mut rest = raw.trim_start_matches(['\r', '\n']);
    let mut start = None;
    let mut header_lines = Vec::new();

    while !rest.is_empty() {
        let (line, remainder) = match rest.find('\n') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };
        rest = remainder;
        let line = line.strip_suffix('\r').unwrap_or(line);

        if start.is_none() {
            start = Some(line);
            continue;
        }
        if line.trim().is_empty() {
            return Ok((start.unwrap_or_default(), header_lines, rest));
        }
        header_lines.push(line);
    }

    match start {
        Some(line) if !line.trim().is_empty() => Ok((line, header_lines, "")),
        _ => Err(ParseError::MissingStartLine),
    }
}

fn is_method_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
}

fn parse_request_line(line: &str) -> Result<StartLine, ParseError> {
    if line.trim().is_empty() {
        return Err(ParseError::MissingStartLine);
    }

    let mut parts = line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    if !is_method_token(method) {
        return Err(ParseError::MissingMethod { line: line.to_string() });
    }
    let target = parts
        .next()
        .ok_or_else(|| ParseError::MissingTarget { line: line.to_string() })?;
    let protocol = parts.next().unwrap_or(DEFAULT_PROTOCOL);

    Ok(StartLine::Request {
        method: method.to_string(),
        target: target.to_string(),
        protocol: protocol.to_string(),
    })
}

fn parse_status_line(line: &str) -> Result<StartLine, ParseError> {
    let mut parts = line.trim().splitn(3, ' ');
    let protocol = parts.next().unwrap_or_default();
    if protocol.is_empty() {
        return Err(ParseError::MissingStartLine);
    }
    let status_text = parts.next().unwrap_or_default();
    let status = status_text
        .parse::<u16>()
        .map_err(|_| ParseError::InvalidStatus { value: status_text.to_string() })?;
    let reason = parts.next().unwrap_or_default().trim();

    Ok(StartLine::Response {
        protocol: protocol.to_string(),
        status,
        reason: reason.to_string(),
    })
}
