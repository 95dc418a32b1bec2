//! Upstream failure type and its classification

use std::time::Duration;

use thiserror::Error;

/// HTTP statuses treated as transient upstream conditions
const IGNORABLE_STATUSES: [u16; 4] = [404, 500, 502, 503];

/// A failed call to the upstream data API
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// The upstream answered with a non-success status
    #[error("upstream returned status {status}")]
    Status { status: u16, body: Option<String> },

    /// No answer arrived within the request timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The request never produced a response (connection refused, DNS, reset)
    #[error("transport failure: {0}")]
    Transport(String),

    /// A response arrived but its body was not valid JSON
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// How a failure should be handled by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Logged, health-tracked and eligible for fallback or default substitution
    TransientUpstream,
    /// Propagated verbatim; never masked by a fallback
    HardUpstream,
}

impl UpstreamError {
    /// Response status, if the upstream answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Response body, if one was captured
    pub fn body(&self) -> Option<&str> {
        match self {
            UpstreamError::Status { body, .. } => body.as_deref(),
            _ => None,
        }
    }

    pub fn classify(&self) -> ErrorClass {
        if is_ignorable_error(self) {
            ErrorClass::TransientUpstream
        } else {
            ErrorClass::HardUpstream
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            UpstreamError::Status {
                status: status.as_u16(),
                body: None,
            }
        } else if e.is_decode() {
            UpstreamError::Decode(e.to_string())
        } else {
            UpstreamError::Transport(e.to_string())
        }
    }
}

/// Whether a failure is a transient upstream condition that may fall back
///
/// Only failures carrying a 404, 500, 502 or 503 status qualify. Failures
/// without any response, and every other status, do not.
pub fn is_ignorable_error(error: &UpstreamError) -> bool {
    error
        .status()
        .is_some_and(|status| IGNORABLE_STATUSES.contains(&status))
}
