//! Request-scoped cookie jar.
//!
//! [`SharedCookieJar`] holds the cookies a client presented plus every
//! mutation made while handling the request. It is cheap to clone; the
//! session manager and the encryption key manager each hold a handle to the
//! same jar. At the end of the request the host emits
//! [`SharedCookieJar::set_cookie_headers`] on the response.

use crate::config::CookieConfig;
use crate::error::{Result, SessionError};
use cookie::{Cookie, CookieJar};
use http::header::{COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue};
use std::sync::{Arc, Mutex, MutexGuard};

/// Clonable handle to one request's cookies and pending mutations.
#[derive(Debug, Clone, Default)]
pub struct SharedCookieJar {
    inner: Arc<Mutex<CookieJar>>,
}

impl SharedCookieJar {
    /// Create an empty jar (client presented no cookies).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a jar from a `Cookie` request header value.
    ///
    /// Unparseable pairs are skipped.
    #[must_use]
    pub fn from_cookie_header(header: &str) -> Self {
        let mut jar = CookieJar::new();
        for cookie in Cookie::split_parse(header).filter_map(std::result::Result::ok) {
            jar.add_original(cookie.into_owned());
        }
        Self {
            inner: Arc::new(Mutex::new(jar)),
        }
    }

    /// Create a jar from every `Cookie` header in a request.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut jar = CookieJar::new();
        let values = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok());
        for value in values {
            for cookie in Cookie::split_parse(value).filter_map(std::result::Result::ok) {
                jar.add_original(cookie.into_owned());
            }
        }
        Self {
            inner: Arc::new(Mutex::new(jar)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, CookieJar>> {
        self.inner
            .lock()
            .map_err(|_| SessionError::InternalError("Mutex lock failed".to_string()))
    }

    /// Current value of a cookie, reflecting mutations made this request.
    ///
    /// # Errors
    ///
    /// Returns error if the jar's lock is poisoned.
    pub fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(name).map(|cookie| cookie.value().to_string()))
    }

    /// Set an `HttpOnly` cookie with the configured transport attributes.
    ///
    /// # Errors
    ///
    /// Returns error if the jar's lock is poisoned.
    pub fn set(&self, name: &str, value: &str, config: &CookieConfig) -> Result<()> {
        let mut builder = Cookie::build((name.to_string(), value.to_string()))
            .path(config.path.clone())
            .secure(config.secure)
            .http_only(true)
            .same_site(config.same_site.into());
        if let Some(domain) = &config.domain {
            builder = builder.domain(domain.clone());
        }
        if config.lifetime_secs > 0 {
            builder = builder.max_age(cookie::time::Duration::seconds(config.lifetime_secs));
        }
        self.lock()?.add(builder);
        Ok(())
    }

    /// Expire a cookie immediately.
    ///
    /// A cookie the client presented gets a removal `Set-Cookie`; one only
    /// set during this request is simply dropped from the pending mutations.
    ///
    /// # Errors
    ///
    /// Returns error if the jar's lock is poisoned.
    pub fn expire(&self, name: &str, config: &CookieConfig) -> Result<()> {
        let mut builder = Cookie::build((name.to_string(), String::new())).path(config.path.clone());
        if let Some(domain) = &config.domain {
            builder = builder.domain(domain.clone());
        }
        self.lock()?.remove(builder);
        Ok(())
    }

    /// Pending mutations rendered as `Set-Cookie` header values.
    ///
    /// # Errors
    ///
    /// Returns error if the jar's lock is poisoned.
    pub fn set_cookie_headers(&self) -> Result<Vec<String>> {
        Ok(self.lock()?.delta().map(ToString::to_string).collect())
    }

    /// Append pending mutations to a response's headers.
    ///
    /// # Errors
    ///
    /// Returns error if the jar's lock is poisoned or a rendered cookie is not
    /// a valid header value.
    pub fn apply_to(&self, headers: &mut HeaderMap) -> Result<()> {
        for value in self.set_cookie_headers()? {
            let value = HeaderValue::from_str(&value)
                .map_err(|e| SessionError::InternalError(format!("Invalid Set-Cookie value: {e}")))?;
            headers.append(SET_COOKIE, value);
        }
        Ok(())
    }
}
