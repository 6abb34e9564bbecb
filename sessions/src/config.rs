//! Session configuration.
//!
//! This module provides configuration structures for the session manager and
//! the session handler. Values are validated once, at construction, and never
//! reach request handling when invalid.

use crate::error::{Result, SessionError};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default prefix for per-session encryption key cookies.
pub const DEFAULT_KEY_COOKIE_PREFIX: &str = "SESSKEY_";

/// Default session cookie name.
pub const DEFAULT_SESSION_NAME: &str = "SESSIONID";

/// Longest accepted time-based rotation interval (one year).
pub const MAX_REGEN_ID_INTERVAL_MINUTES: i64 = 60 * 24 * 365;

/// Longest accepted post-rotation forwarding window (one day).
pub const MAX_TTL_AFTER_ID_REGEN_SECS: i64 = 60 * 60 * 24;

/// Session lifecycle configuration.
///
/// The defaults suffice for most applications:
///
/// ```
/// # use hardened_sessions::config::SessionManagerConfig;
/// let config = SessionManagerConfig::default();
/// assert_eq!(config.regen_id_interval_minutes, 15);
/// assert_eq!(config.regen_id_count, 10);
/// assert_eq!(config.ttl_after_id_regen_secs, 30);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionManagerConfig {
    /// Name of the session cookie.
    pub session_name: String,

    /// Minutes after which a forced ID rotation occurs.
    ///
    /// `0` disables time-based rotation. Default: 15 minutes
    pub regen_id_interval_minutes: i64,

    /// Number of session starts after which a forced ID rotation occurs.
    ///
    /// `0` disables count-based rotation. Default: 10
    pub regen_id_count: u32,

    /// Seconds the old identifier's data stays readable after rotation.
    ///
    /// Default: 30 seconds
    pub ttl_after_id_regen_secs: i64,
}

impl SessionManagerConfig {
    /// Create configuration with default thresholds and the given cookie name.
    #[must_use]
    pub const fn new(session_name: String) -> Self {
        Self {
            session_name,
            regen_id_interval_minutes: 15,
            regen_id_count: 10,
            ttl_after_id_regen_secs: 30,
        }
    }

    /// Set the time-based rotation interval (minutes, `0` disables).
    #[must_use]
    pub const fn with_regen_id_interval(mut self, minutes: i64) -> Self {
        self.regen_id_interval_minutes = minutes;
        self
    }

    /// Set the count-based rotation threshold (`0` disables).
    #[must_use]
    pub const fn with_regen_id_count(mut self, count: u32) -> Self {
        self.regen_id_count = count;
        self
    }

    /// Set how long old identifiers stay readable after rotation.
    #[must_use]
    pub const fn with_ttl_after_id_regen(mut self, seconds: i64) -> Self {
        self.ttl_after_id_regen_secs = seconds;
        self
    }

    /// Time-based rotation interval, or `None` when disabled.
    #[must_use]
    pub fn regen_interval(&self) -> Option<Duration> {
        if self.regen_id_interval_minutes > 0 {
            Duration::try_minutes(self.regen_id_interval_minutes)
        } else {
            None
        }
    }

    /// Count-based rotation threshold, or `None` when disabled.
    #[must_use]
    pub const fn regen_count(&self) -> Option<u32> {
        if self.regen_id_count > 0 {
            Some(self.regen_id_count)
        } else {
            None
        }
    }

    /// Grace window during which a rotated identifier still forwards.
    #[must_use]
    pub fn ttl_after_id_regen(&self) -> Duration {
        Duration::try_seconds(self.ttl_after_id_regen_secs).unwrap_or_else(Duration::zero)
    }

    /// Validate all values.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if:
    /// - The session name is empty or not a valid cookie name
    /// - The rotation interval or post-rotation TTL is negative or above
    ///   [`MAX_REGEN_ID_INTERVAL_MINUTES`] / [`MAX_TTL_AFTER_ID_REGEN_SECS`]
    pub fn validate(&self) -> Result<()> {
        validate_cookie_name("session_name", &self.session_name)?;
        validate_range(
            "regen_id_interval_minutes",
            self.regen_id_interval_minutes,
            MAX_REGEN_ID_INTERVAL_MINUTES,
        )?;
        validate_range(
            "ttl_after_id_regen_secs",
            self.ttl_after_id_regen_secs,
            MAX_TTL_AFTER_ID_REGEN_SECS,
        )
    }
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_NAME.to_string())
    }
}

/// `SameSite` cookie policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSitePolicy {
    /// Strict (same-site only).
    Strict,

    /// Lax (cross-site GET allowed).
    #[default]
    Lax,

    /// None (cross-site allowed, requires Secure).
    None,
}

impl From<SameSitePolicy> for cookie::SameSite {
    fn from(policy: SameSitePolicy) -> Self {
        match policy {
            SameSitePolicy::Strict => Self::Strict,
            SameSitePolicy::Lax => Self::Lax,
            SameSitePolicy::None => Self::None,
        }
    }
}

/// Transport attributes shared by the session cookie and key cookies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Cookie domain (`None` = host-only).
    pub domain: Option<String>,

    /// Cookie path. Default: `/`
    pub path: String,

    /// Send only over HTTPS.
    pub secure: bool,

    /// Cookie lifetime in seconds. `0` means a browser-session cookie.
    pub lifetime_secs: i64,

    /// `SameSite` policy. Default: `Lax`
    pub same_site: SameSitePolicy,
}

impl CookieConfig {
    /// Validate all values.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the lifetime is negative or
    /// the path is empty.
    pub fn validate(&self) -> Result<()> {
        if self.lifetime_secs < 0 {
            return Err(SessionError::Configuration {
                field: "cookie.lifetime_secs",
                reason: "must be non-negative".to_string(),
            });
        }
        if self.path.is_empty() {
            return Err(SessionError::Configuration {
                field: "cookie.path",
                reason: "must be non-empty".to_string(),
            });
        }
        if self.same_site == SameSitePolicy::None && !self.secure {
            return Err(SessionError::Configuration {
                field: "cookie.same_site",
                reason: "SameSite=None requires secure cookies".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            domain: None,
            path: "/".to_string(),
            secure: false,
            lifetime_secs: 0,
            same_site: SameSitePolicy::Lax,
        }
    }
}

/// Session handler configuration (encryption and key cookies).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionHandlerConfig {
    /// Encrypt session payloads with a per-session key.
    pub use_encryption: bool,

    /// Prefix of key cookie names; the session ID is appended.
    pub key_cookie_prefix: String,

    /// Transport attributes (should match the session cookie).
    pub cookie: CookieConfig,
}

impl SessionHandlerConfig {
    /// Create handler configuration with encryption on or off.
    #[must_use]
    pub fn new(use_encryption: bool) -> Self {
        Self {
            use_encryption,
            ..Self::default()
        }
    }

    /// Set the key cookie prefix.
    #[must_use]
    pub fn with_key_cookie_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_cookie_prefix = prefix.into();
        self
    }

    /// Set cookie transport attributes.
    #[must_use]
    pub fn with_cookie(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    /// Validate all values.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Configuration`] if the key cookie prefix is
    /// empty or contains characters not allowed in cookie names, or if the
    /// cookie attributes are invalid.
    pub fn validate(&self) -> Result<()> {
        validate_cookie_name("key_cookie_prefix", &self.key_cookie_prefix)?;
        self.cookie.validate()
    }
}

impl Default for SessionHandlerConfig {
    fn default() -> Self {
        Self {
            use_encryption: false,
            key_cookie_prefix: DEFAULT_KEY_COOKIE_PREFIX.to_string(),
            cookie: CookieConfig::default(),
        }
    }
}

fn validate_range(field: &'static str, value: i64, max: i64) -> Result<()> {
    if value < 0 {
        return Err(SessionError::Configuration {
            field,
            reason: "must be non-negative".to_string(),
        });
    }
    if value > max {
        return Err(SessionError::Configuration {
            field,
            reason: format!("must be at most {max}"),
        });
    }
    Ok(())
}

/// Cookie names are RFC 6265 tokens: visible ASCII minus separators.
fn validate_cookie_name(field: &'static str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SessionError::Configuration {
            field,
            reason: "must be non-empty".to_string(),
        });
    }
    let is_token_char = |c: char| c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?={}".contains(c);
    if !name.chars().all(is_token_char) {
        return Err(SessionError::Configuration {
            field,
            reason: format!("`{name}` is not a valid cookie name"),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_manager_config_builder() {
        let config = SessionManagerConfig::new("app".to_string())
            .with_regen_id_interval(5)
            .with_regen_id_count(3)
            .with_ttl_after_id_regen(60);

        assert_eq!(config.session_name, "app");
        assert_eq!(config.regen_interval(), Some(Duration::minutes(5)));
        assert_eq!(config.regen_count(), Some(3));
        assert_eq!(config.ttl_after_id_regen(), Duration::seconds(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_thresholds_disable_rotation() {
        let config = SessionManagerConfig::default()
            .with_regen_id_interval(0)
            .with_regen_id_count(0);

        assert_eq!(config.regen_interval(), None);
        assert_eq!(config.regen_count(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_values_rejected() {
        let err = SessionManagerConfig::default()
            .with_ttl_after_id_regen(-1)
            .validate()
            .unwrap_err();
        assert!(err.is_configuration_error());

        let err = SessionManagerConfig::default()
            .with_regen_id_interval(-5)
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::Configuration {
                field: "regen_id_interval_minutes",
                reason: "must be non-negative".to_string(),
            }
        );
    }

    #[test]
    fn test_out_of_range_durations_rejected() {
        let err = SessionManagerConfig::default()
            .with_regen_id_interval(i64::MAX)
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::Configuration {
                field: "regen_id_interval_minutes",
                reason: format!("must be at most {MAX_REGEN_ID_INTERVAL_MINUTES}"),
            }
        );

        let err = SessionManagerConfig::default()
            .with_ttl_after_id_regen(i64::MAX)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Configuration {
                field: "ttl_after_id_regen_secs",
                ..
            }
        ));

        let config = SessionManagerConfig::default()
            .with_regen_id_interval(MAX_REGEN_ID_INTERVAL_MINUTES)
            .with_ttl_after_id_regen(MAX_TTL_AFTER_ID_REGEN_SECS);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.regen_interval(),
            Some(Duration::minutes(MAX_REGEN_ID_INTERVAL_MINUTES))
        );
    }

    #[test]
    fn test_session_name_must_be_cookie_token() {
        assert!(SessionManagerConfig::new(String::new()).validate().is_err());
        assert!(SessionManagerConfig::new("bad name".to_string()).validate().is_err());
        assert!(SessionManagerConfig::new("a=b".to_string()).validate().is_err());
        assert!(SessionManagerConfig::new("__Host-sid".to_string()).validate().is_ok());
    }

    #[test]
    fn test_handler_config_validation() {
        assert!(SessionHandlerConfig::new(true).validate().is_ok());
        assert!(SessionHandlerConfig::new(true)
            .with_key_cookie_prefix("")
            .validate()
            .is_err());

        let cookie = CookieConfig {
            lifetime_secs: -1,
            ..CookieConfig::default()
        };
        assert!(SessionHandlerConfig::default().with_cookie(cookie).validate().is_err());

        let cookie = CookieConfig {
            same_site: SameSitePolicy::None,
            ..CookieConfig::default()
        };
        assert!(SessionHandlerConfig::default().with_cookie(cookie).validate().is_err());
    }

    #[test]
    fn test_default_configs() {
        let handler = SessionHandlerConfig::default();
        assert!(!handler.use_encryption);
        assert_eq!(handler.key_cookie_prefix, DEFAULT_KEY_COOKIE_PREFIX);
        assert_eq!(handler.cookie.path, "/");
        assert_eq!(handler.cookie.lifetime_secs, 0);

        let manager = SessionManagerConfig::default();
        assert_eq!(manager.session_name, DEFAULT_SESSION_NAME);
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: SessionManagerConfig =
            serde_json::from_str(r#"{"regen_id_count": 0}"#).unwrap();
        assert_eq!(config.regen_id_count, 0);
        assert_eq!(config.regen_id_interval_minutes, 15);
        assert_eq!(config.session_name, DEFAULT_SESSION_NAME);
    }
}
