//! Test doubles for session collaborators.
//!
//! Available with the `test-utils` feature (enabled by default). These are
//! deterministic, in-memory stand-ins for the clock, the host callbacks and
//! a failing storage backend.

pub mod callbacks;
pub mod clock;
pub mod handler;

pub use callbacks::RecordingCallbacks;
pub use clock::{FixedClock, ManualClock, test_clock};
pub use handler::FlakySessionHandler;
