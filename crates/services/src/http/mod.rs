//! HTTP client adapter: wire transport, envelope unwrapping and error
//! classification.

mod classify;
mod client;
mod envelope;
mod reqwest_transport;
mod tokens;
mod transport;

use std::fmt;

pub use classify::{AuthEvent, RELOGIN_PROMPT, user_message};
pub use client::{ApiClient, ApiRequest};
pub use envelope::{ApiOutcome, RawEnvelope};
pub use reqwest_transport::ReqwestTransport;
pub use tokens::SessionTokens;
pub use transport::{Method, OfflineTransport, Transport, WireRequest, WireResponse};

/// Path below the API base URL, kept as raw segments so identifiers are
/// encoded only once, when the final URL is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    segments: Vec<String>,
}

impl Endpoint {
    /// Split a static path such as `/api/v1/learning/modules`.
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Append one segment, typically an identifier.
    #[must_use]
    pub fn push(mut self, segment: impl fmt::Display) -> Self {
        self.segments.push(segment.to_string());
        self
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }
}

impl From<&str> for Endpoint {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_display_joins_segments() {
        let endpoint = Endpoint::new("api/v1//learning/").push("intro").push("quiz");
        assert_eq!(endpoint.to_string(), "/api/v1/learning/intro/quiz");
    }
}
