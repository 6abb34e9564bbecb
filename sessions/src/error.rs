//! Error types for session lifecycle operations.

use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Error taxonomy for the session subsystem.
///
/// Variants are grouped by how the caller is expected to react:
///
/// - **Configuration** errors are fatal at construction time.
/// - **Integrity** errors mark a session as untrustworthy. The manager turns
///   them into an invalidated session rather than propagating them.
/// - **Storage** errors are hard failures and are never retried internally.
/// - **Lifecycle** errors indicate the host called operations out of order.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    // ═══════════════════════════════════════════════════════════
    // Configuration Errors
    // ═══════════════════════════════════════════════════════════

    /// A configuration value was rejected.
    #[error("Invalid configuration for `{field}`: {reason}")]
    Configuration {
        /// Name of the offending option
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Identifier Errors
    // ═══════════════════════════════════════════════════════════

    /// Session identifier does not match the expected format.
    #[error("Value did not match session ID format")]
    InvalidSessionId,

    /// Application code attempted to write a reserved session key.
    #[error("Session key `{0}` is reserved")]
    ReservedKey(String),

    // ═══════════════════════════════════════════════════════════
    // Integrity Errors
    // ═══════════════════════════════════════════════════════════

    /// Stored fingerprint does not match the requesting client.
    #[error("Fingerprint mismatch")]
    FingerprintMismatch,

    /// A recognized session record carries no metadata.
    #[error("Session `{session_id}` has data but no metadata")]
    MetadataMissing {
        /// Identifier of the affected session
        session_id: String,
    },

    /// Session metadata could not be decoded.
    #[error("Session `{session_id}` has corrupt metadata: {reason}")]
    MetadataCorrupt {
        /// Identifier of the affected session
        session_id: String,
        /// Decoder message
        reason: String,
    },

    /// Ciphertext was malformed, tampered with, or encrypted under another key.
    #[error("Session payload decryption failed: {reason}")]
    Decryption {
        /// Reason for failure
        reason: String,
    },

    /// Serialized key material could not be loaded.
    #[error("Encryption key has bad format: {reason}")]
    KeyFormat {
        /// Reason for failure
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Crypto / Storage Errors
    // ═══════════════════════════════════════════════════════════

    /// Encrypting a session payload failed.
    #[error("Session payload encryption failed")]
    Encryption,

    /// Underlying session store failed.
    #[error("Session storage error: {0}")]
    Storage(String),

    /// Session data could not be (de)serialized.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    // ═══════════════════════════════════════════════════════════
    // Lifecycle Errors
    // ═══════════════════════════════════════════════════════════

    /// Operation requires a started session.
    #[error("Session has not been started")]
    NotStarted,

    /// `start_session` called twice without commit or destroy.
    #[error("Session has already been started")]
    AlreadyStarted,

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Internal error (should not be exposed to users).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl SessionError {
    /// Returns `true` if the error means the session cannot be trusted.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hardened_sessions::SessionError;
    /// assert!(SessionError::FingerprintMismatch.is_integrity_failure());
    /// assert!(!SessionError::Storage("down".into()).is_integrity_failure());
    /// ```
    #[must_use]
    pub const fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::FingerprintMismatch
                | Self::MetadataMissing { .. }
                | Self::MetadataCorrupt { .. }
                | Self::Decryption { .. }
                | Self::KeyFormat { .. }
        )
    }

    /// Returns `true` if this error was raised while validating configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// # use hardened_sessions::SessionError;
    /// let err = SessionError::Configuration { field: "ttl", reason: "negative".into() };
    /// assert!(err.is_configuration_error());
    /// ```
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Integrity failures the manager absorbs into an invalidated session.
    ///
    /// Metadata problems are excluded: their cause cannot be guessed, so they
    /// are reported to the host instead.
    pub(crate) const fn invalidates_session(&self) -> bool {
        matches!(
            self,
            Self::FingerprintMismatch | Self::Decryption { .. } | Self::KeyFormat { .. }
        )
    }
}
