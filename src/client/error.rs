//! Error types for the session client.
//!
//! Structured errors for every client operation. Variants carry the context
//! (URL, status, reason) needed for debugging; transport and I/O failures are
//! passed through unchanged as sources.

use thiserror::Error;

/// Errors that can occur while talking to the Downloads page.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No CSRF token cookie was present after fetching the page.
    #[error("could not obtain CSRF token from {url}")]
    Token {
        /// The URL that was fetched to obtain the token.
        url: String,
    },

    /// Login was rejected, or an authenticated operation was attempted
    /// without a prior successful login.
    #[error("authentication failed: {reason}")]
    Auth {
        /// What went wrong (login rejection status, or the operation name).
        reason: String,
    },

    /// A read request returned a non-success HTTP status.
    #[error("HTTP {status} fetching {url}")]
    Fetch {
        /// The URL that returned the error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Bad caller input (empty filename, malformed repository identifier).
    #[error("invalid input: {reason}")]
    Validation {
        /// Description of what was wrong with the input.
        reason: String,
    },

    /// Network-level error (DNS, connection refused, TLS, timeout).
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// I/O error draining an upload payload stream.
    #[error("I/O error reading upload payload: {source}")]
    Io {
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    /// Creates a CSRF token error.
    pub fn token(url: impl Into<String>) -> Self {
        Self::Token { url: url.into() }
    }

    /// Creates an authentication error for a rejected login.
    #[must_use]
    pub fn login_rejected(status: u16) -> Self {
        Self::Auth {
            reason: format!("login rejected with HTTP {status} (expected redirect)"),
        }
    }

    /// Creates an authentication error for an operation invoked before login.
    #[must_use]
    pub fn auth_required(operation: &str) -> Self {
        Self::Auth {
            reason: format!("{operation} requires a prior successful login"),
        }
    }

    /// Creates a fetch error for a non-success response status.
    pub fn fetch(url: impl Into<String>, status: u16) -> Self {
        Self::Fetch {
            url: url.into(),
            status,
        }
    }

    /// Creates a validation error.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an I/O error.
    #[must_use]
    pub fn io(source: std::io::Error) -> Self {
        Self::Io { source }
    }
}

// No `From<reqwest::Error>` on purpose: the Network variant requires the URL
// context the source error does not carry. Callers use the helper
// constructors instead.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_token_error_display() {
        let error = ClientError::token("https://bitbucket.org/account/signin/");
        let msg = error.to_string();
        assert!(msg.contains("CSRF token"), "expected CSRF mention in: {msg}");
        assert!(msg.contains("account/signin"), "expected URL in: {msg}");
    }

    #[test]
    fn test_login_rejected_display() {
        let error = ClientError::login_rejected(200);
        let msg = error.to_string();
        assert!(msg.contains("200"), "expected status in: {msg}");
        assert!(msg.contains("redirect"), "expected redirect hint in: {msg}");
    }

    #[test]
    fn test_auth_required_display_names_operation() {
        let error = ClientError::auth_required("upload");
        let msg = error.to_string();
        assert!(msg.contains("upload"), "expected operation name in: {msg}");
        assert!(msg.contains("login"), "expected login hint in: {msg}");
    }

    #[test]
    fn test_fetch_error_display() {
        let error = ClientError::fetch("https://bitbucket.org/team/proj/downloads", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "expected status in: {msg}");
        assert!(msg.contains("team/proj/downloads"), "expected URL in: {msg}");
    }

    #[test]
    fn test_validation_error_display() {
        let error = ClientError::validation("filename must be a non-empty string");
        assert!(error.to_string().contains("non-empty string"));
    }

    #[test]
    fn test_io_error_preserves_source() {
        use std::error::Error as _;

        let io_error = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stream closed");
        let error = ClientError::io(io_error);
        assert!(error.source().is_some(), "I/O source must be preserved");
        assert!(error.to_string().contains("upload payload"));
    }
}
