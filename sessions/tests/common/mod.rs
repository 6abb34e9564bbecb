//! Shared helpers for session integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use chrono::{DateTime, Utc};
use hardened_sessions::mocks::{ManualClock, RecordingCallbacks};
use hardened_sessions::stores::{EncryptingSessionHandler, MemorySessionHandler};
use hardened_sessions::{
    ClientSignals, Clock, SessionHandlerConfig, SessionLoader, SessionManager, SessionManagerConfig,
    SessionMetadata, SessionId, SharedCookieJar,
};
use std::collections::BTreeMap;

pub const FIREFOX: &str = "Mozilla/5.0 (X11; Linux x86_64; rv:118.0) Gecko/20100101 Firefox/118.0";
pub const CURL: &str = "curl/8.4.0";

pub type TestSession = SessionManager<EncryptingSessionHandler<MemorySessionHandler>, ManualClock>;

/// Install a log subscriber writing to the test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("hardened_sessions=debug")
        .with_test_writer()
        .try_init();
}

/// 2025-01-01 00:00:00 UTC
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_735_689_600, 0).unwrap()
}

/// A client that keeps cookies between requests.
#[derive(Debug, Clone)]
pub struct Browser {
    cookies: BTreeMap<String, String>,
    pub signals: ClientSignals,
}

impl Browser {
    pub fn new(user_agent: &str) -> Self {
        Self {
            cookies: BTreeMap::new(),
            signals: ClientSignals::new(Some(user_agent), Some("gzip, deflate, br"), Some("en-US")),
        }
    }

    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn jar(&self) -> SharedCookieJar {
        SharedCookieJar::from_cookie_header(&self.cookie_header())
    }

    /// Apply a response's `Set-Cookie` headers.
    pub fn absorb(&mut self, jar: &SharedCookieJar) {
        for header in jar.set_cookie_headers().unwrap() {
            let cookie = cookie::Cookie::parse(header).unwrap();
            let expired = cookie.max_age() == Some(cookie::time::Duration::ZERO);
            if expired {
                self.cookies.remove(cookie.name());
            } else {
                self.cookies
                    .insert(cookie.name().to_string(), cookie.value().to_string());
            }
        }
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn set_cookie(&mut self, name: &str, value: &str) {
        self.cookies.insert(name.to_string(), value.to_string());
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.cookie("SESSIONID").map(|id| SessionId::parse(id).unwrap())
    }
}

/// One server: shared backend, controllable clock, recorded callbacks.
pub struct Server {
    pub backend: MemorySessionHandler,
    pub clock: ManualClock,
    pub config: SessionManagerConfig,
    pub handler_config: SessionHandlerConfig,
    pub callbacks: RecordingCallbacks,
}

impl Server {
    pub fn new(config: SessionManagerConfig, use_encryption: bool) -> Self {
        init_tracing();
        let clock = ManualClock::new(t0());
        Self {
            backend: MemorySessionHandler::with_clock(clock.clone()),
            clock,
            config,
            handler_config: SessionHandlerConfig::new(use_encryption),
            callbacks: RecordingCallbacks::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Begin handling one request from `browser`.
    pub fn request(&self, browser: &Browser) -> (TestSession, SharedCookieJar) {
        let jar = browser.jar();
        let session = SessionLoader::initialize_with(
            self.handler_config.clone(),
            self.config.clone(),
            self.backend.clone(),
            jar.clone(),
            browser.signals.clone(),
            self.callbacks.callbacks(),
        )
        .unwrap()
        .with_clock(self.clock.clone());
        (session, jar)
    }

    /// Metadata stored under `session_id`, read with the browser's keys.
    pub async fn stored_metadata(
        &self,
        browser: &Browser,
        session_id: &SessionId,
    ) -> Option<SessionMetadata> {
        use hardened_sessions::SessionHandler;
        use hardened_sessions::state::SessionRecord;

        let (session, _) = self.request(browser);
        let payload = session.handler().read(session_id).await.unwrap();
        SessionRecord::decode(session_id, &payload).unwrap().metadata
    }
}
