//! Client fingerprinting.
//!
//! A fingerprint is a SHA-256 digest of stable request attributes. It is a
//! lightweight hijack signal: a session presented by a client whose
//! attributes hash differently is treated as stolen.

use http::HeaderMap;
use http::header::{ACCEPT_ENCODING, ACCEPT_LANGUAGE, USER_AGENT};
use sha2::{Digest, Sha256};

/// Hashed in place of the signals when a client sends none of them.
pub const NO_FINGERPRINT_SENTINEL: &str = "NO FINGERPRINT AVAILABLE";

/// Request attributes that feed the fingerprint, in hashing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientSignals {
    /// `User-Agent` header.
    pub user_agent: Option<String>,

    /// `Accept-Encoding` header.
    pub accept_encoding: Option<String>,

    /// `Accept-Language` header.
    pub accept_language: Option<String>,
}

impl ClientSignals {
    /// Build signals from explicit values.
    #[must_use]
    pub fn new(
        user_agent: Option<&str>,
        accept_encoding: Option<&str>,
        accept_language: Option<&str>,
    ) -> Self {
        Self {
            user_agent: user_agent.map(str::to_string),
            accept_encoding: accept_encoding.map(str::to_string),
            accept_language: accept_language.map(str::to_string),
        }
    }

    /// Extract signals from request headers.
    ///
    /// Headers that are not valid visible ASCII are treated as absent.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        Self {
            user_agent: header(USER_AGENT),
            accept_encoding: header(ACCEPT_ENCODING),
            accept_language: header(ACCEPT_LANGUAGE),
        }
    }

    /// Compute this client's fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        fingerprint(&[
            self.user_agent.as_deref(),
            self.accept_encoding.as_deref(),
            self.accept_language.as_deref(),
        ])
    }
}

/// Hash the present, non-empty signals in order into a hex SHA-256 digest.
///
/// # Examples
///
/// ```
/// use hardened_sessions::fingerprint::fingerprint;
///
/// let a = fingerprint(&[Some("Mozilla/5.0"), None, Some("en-US")]);
/// let b = fingerprint(&[Some("Mozilla/5.0"), Some(""), Some("en-US")]);
/// assert_eq!(a, b);
/// assert_eq!(a.len(), 64);
/// ```
#[must_use]
pub fn fingerprint(signals: &[Option<&str>]) -> String {
    let mut hasher = Sha256::new();
    let mut any = false;
    for signal in signals.iter().flatten().filter(|s| !s.is_empty()) {
        hasher.update(signal.as_bytes());
        any = true;
    }
    if !any {
        hasher.update(NO_FINGERPRINT_SENTINEL.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Constant-time fingerprint comparison.
#[must_use]
pub fn fingerprints_match(stored: &str, presented: &str) -> bool {
    constant_time_eq::constant_time_eq(stored.as_bytes(), presented.as_bytes())
}
