//! Error types for the courier client.
//!
//! # Design
//! Every failure a request can end in is a `RequestError` variant, and every
//! one of them reaches the caller through the completion callback. Nothing in
//! request construction or `start()` returns an error directly.
//!
//! `Server` keeps the raw status code and body bytes so callers can inspect
//! error payloads, binary or not, without a second round-trip.

use thiserror::Error;

/// Errors delivered to a request's completion callback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The URL was empty, could not be parsed, or used an unsupported scheme.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The request was cancelled before it completed.
    #[error("request was cancelled")]
    Cancelled,

    /// No response arrived within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (DNS, TLS, connection reset, ...).
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {}", String::from_utf8_lossy(body))]
    Server { status: u16, body: Vec<u8> },

    /// The response body was longer than the transport accepts.
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: u64 },

    /// Parameters could not be encoded with the chosen serializer.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A response body could not be decoded into the requested type.
    #[error("decoding failed: {0}")]
    Decode(String),
}

impl RequestError {
    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            RequestError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RequestError::Cancelled)
    }
}

impl From<ureq::Error> for RequestError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Timeout(_) => RequestError::Timeout,
            ureq::Error::BadUri(msg) => RequestError::InvalidArgument(msg),
            other => RequestError::Transport(other.to_string()),
        }
    }
}

impl From<url::ParseError> for RequestError {
    fn from(err: url::ParseError) -> Self {
        RequestError::InvalidArgument(format!("malformed url: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_displays_status_and_body() {
        let err = RequestError::Server {
            status: 503,
            body: b"maintenance".to_vec(),
        };
        assert_eq!(err.to_string(), "HTTP 503: maintenance");
        assert_eq!(err.status(), Some(503));
    }

    #[test]
    fn binary_server_body_still_displays() {
        let err = RequestError::Server {
            status: 500,
            body: vec![0xff, b'o', b'k'],
        };
        assert_eq!(err.to_string(), "HTTP 500: \u{fffd}ok");
    }

    #[test]
    fn only_server_errors_carry_a_status() {
        assert_eq!(RequestError::Timeout.status(), None);
        assert_eq!(RequestError::Cancelled.status(), None);
    }

    #[test]
    fn parse_errors_become_invalid_argument() {
        let err: RequestError = url::Url::parse("http://[::1").unwrap_err().into();
        assert!(matches!(err, RequestError::InvalidArgument(_)));
    }

    #[test]
    fn cancelled_is_recognised() {
        assert!(RequestError::Cancelled.is_cancelled());
        assert!(!RequestError::Timeout.is_cancelled());
    }
}
