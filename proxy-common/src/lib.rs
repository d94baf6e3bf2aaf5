//! Common HTTP message model shared by the workbench tools
//!
//! The intercept queue, the repeater and the intruder all exchange requests as
//! raw text that the operator can edit. This crate owns that text form:
//! - `Headers` - ordered, case-insensitive header list
//! - `HttpMessage` - parsed request/response with `parse` / `format`
//! - `InterceptedRequest` - a request captured by the external proxy engine

pub mod headers;
pub mod message;
pub mod intercepted;

pub use headers::Headers;
pub use message::{HttpMessage, ParseError, StartLine, DEFAULT_PROTOCOL};
pub use intercepted::InterceptedRequest;
