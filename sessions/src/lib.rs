//! # Hardened Sessions
//!
//! Cookie-based session lifecycle hardening: hijack detection through client
//! fingerprints, scheduled identifier rotation with a bounded forwarding
//! window, and optional per-session payload encryption whose key follows the
//! identifier through every rotation.
//!
//! ## Architecture
//!
//! ```text
//! request headers
//!       │
//!       ▼
//! ┌──────────────┐  cookies  ┌─────────────────────┐
//! │ SessionLoader│─────────► │ SharedCookieJar     │◄──────────┐
//! └──────┬───────┘           └─────────────────────┘           │
//!        ▼                                                     │
//! ┌──────────────────┐  read/write  ┌─────────────────────────┐ │
//! │ SessionManager   │────────────► │ EncryptingSessionHandler│ │
//! │ - fingerprint    │              │  └─► Memory / Redis     │ │
//! │ - rotate/forward │              └──────────┬──────────────┘ │
//! └──────┬───────────┘                         ▼                │
//!        │ ID change callback     ┌─────────────────────────┐   │
//!        └──────────────────────► │ EncryptionKeyManager    │───┘
//!                                 └─────────────────────────┘
//! ```
//!
//! ## Session states
//!
//! - **Fresh**: no metadata; a new session is initialized
//! - **Active**: live identifier with a matching fingerprint
//! - **Forwarding**: rotated identifier, readable until `expire_data_at`
//! - **Invalid**: fingerprint mismatch or expired forwarding; destroyed
//!
//! ## Example
//!
//! ```
//! use hardened_sessions::{SessionHandlerConfig, SessionLoader, SessionManagerConfig, SessionStart};
//! use hardened_sessions::stores::MemorySessionHandler;
//! use http::HeaderMap;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> hardened_sessions::Result<()> {
//! let backend = MemorySessionHandler::new();
//! let mut session = SessionLoader::initialize(
//!     SessionHandlerConfig::new(true),
//!     SessionManagerConfig::default(),
//!     backend,
//!     &HeaderMap::new(),
//! )?;
//!
//! let outcome = session.start_session().await?;
//! if outcome == SessionStart::Invalidated {
//!     // Treat the requester as anonymous and begin a new session.
//!     session.start_session().await?;
//! }
//! session.insert("visits", 1)?;
//! session.commit_session().await?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

// Public modules
pub mod config;
pub mod cookies;
pub mod error;
pub mod fingerprint;
pub mod keys;
pub mod loader;
pub mod manager;
pub mod providers;
pub mod state;
pub mod stores;

// Mock implementations for testing
#[cfg(feature = "test-utils")]
pub mod mocks;

// Re-export main types for convenience
pub use config::{CookieConfig, SameSitePolicy, SessionHandlerConfig, SessionManagerConfig};
pub use cookies::SharedCookieJar;
pub use error::{Result, SessionError};
pub use fingerprint::{ClientSignals, fingerprint};
pub use keys::{EncryptionKeyManager, SessionKey};
pub use loader::{LoadedSession, SessionLoader};
pub use manager::{SessionManager, SessionStart};
pub use providers::{
    Clock, GcNotifyCallback, IdChangeCallback, SessionCallbacks, SessionHandler, SystemClock,
};
pub use state::{SessionData, SessionId, SessionMetadata};
