//! Internal helpers re-exported for doctests and integration tests.
//!
//! The fakes stand in for a database driver so cache behaviour can be
//! asserted without a running server. Log capture is only compiled for unit
//! tests or with the `test-support` feature.

mod fake;
#[cfg(any(test, feature = "test-support"))]
mod logging;

pub use fake::{FakeConnection, FakeFactory, FakeState};
#[cfg(any(test, feature = "test-support"))]
pub use logging::{capture_logs, capture_warn_logs};
