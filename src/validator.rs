//! Bounded liveness checks for cached connection handles.

use std::time::Duration;

use crate::connection::ManagedConnection;
use crate::observability::LOG_TARGET;

/// Probe timeout applied when no override is configured.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Decides whether a cached handle can be handed out again.
///
/// Validation is a best-effort gate: probe failures are logged and reported
/// as "invalid" so the caller reconnects instead of failing.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use pg_context_conn::ConnectionValidator;
/// use pg_context_conn::test_support::FakeConnection;
///
/// let validator = ConnectionValidator::new(Duration::from_secs(1));
/// let mut conn = FakeConnection::new();
/// assert!(validator.is_valid(Some(&mut conn)));
/// assert!(!validator.is_valid::<FakeConnection>(None));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionValidator {
    timeout: Duration,
}

impl ConnectionValidator {
    /// Creates a validator that bounds each probe by `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Returns the probe timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns `true` when `handle` is present and answers the probe.
    pub fn is_valid<C: ManagedConnection>(&self, handle: Option<&mut C>) -> bool {
        let Some(conn) = handle else {
            return false;
        };
        match conn.probe(self.timeout) {
            Ok(alive) => alive,
            Err(err) => {
                tracing::error!(
                    target: LOG_TARGET,
                    error = %err,
                    timeout = ?self.timeout,
                    "connection probe failed; treating handle as invalid"
                );
                false
            }
        }
    }
}

impl Default for ConnectionValidator {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}
