//! Crate-wide error type for the SneakDex crawler
//!
//! `thiserror` carries the typed variants any component can match on
//! (retriable classification, permanent rejection, ...); `anyhow` is
//! used only at task boundaries that just need to propagate and log.

use thiserror::Error;

/// Result type alias using [`SneakdexError`]
pub type Result<T> = std::result::Result<T, SneakdexError>;

/// Main error type for crawler operations
#[derive(Error, Debug)]
pub enum SneakdexError {
    /// Configuration failed to load or validate at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The shared KV store (Redis) returned an error or timed out
    #[error("KV store error: {0}")]
    Kv(String),

    /// The message bus producer returned an error
    #[error("publisher error: {0}")]
    Publish(String),

    /// An HTTP fetch failed
    #[error("fetch error: {0}")]
    Fetch(String),

    /// URL failed validation (not fatal, discarded by caller)
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// URL parse error straight from the `url` crate
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic message for conditions that don't need a dedicated variant
    #[error("{0}")]
    Custom(String),

    /// Opaque error from a dependency, for interoperability with `anyhow`
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SneakdexError {
    /// Build a [`SneakdexError::Custom`] from anything stringable
    pub fn custom<S: Into<String>>(msg: S) -> Self {
        SneakdexError::Custom(msg.into())
    }

    /// Classify whether this error represents a transport-class condition.
    ///
    /// Mirrors §4.4/§4.5's substring classification: `timeout`,
    /// `connection refused`, and `no such host` are retriable; everything
    /// else is treated as permanent.
    pub fn is_retriable(&self) -> bool {
        classify_retriable(&self.to_string())
    }
}

/// Substring-based retriable classification shared by the fetcher and
/// the publisher's error-stream handler (§4.4, §4.5).
pub fn classify_retriable(message: &str) -> bool {
    let lowered = message.to_lowercase();
    const RETRIABLE_SUBSTRINGS: &[&str] = &["timeout", "connection refused", "no such host"];
    RETRIABLE_SUBSTRINGS
        .iter()
        .any(|needle| lowered.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transport_errors_as_retriable() {
        assert!(classify_retriable("operation timeout after 30s"));
        assert!(classify_retriable("Connection refused (os error 111)"));
        assert!(classify_retriable("dns error: no such host is known"));
    }

    #[test]
    fn classifies_other_errors_as_permanent() {
        assert!(!classify_retriable("payload too large"));
        assert!(!classify_retriable("serialization failed: invalid utf8"));
    }
}
