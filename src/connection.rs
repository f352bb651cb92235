//! Collaborator contracts consumed by the connection cache.
//!
//! The cache never talks to a driver directly. A [`ConnectionFactory`] opens
//! raw connections for a named target and each handle implements
//! [`ManagedConnection`] so the cache can probe, commit and close it.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::error::{AcquireResult, CloseResult, CommitResult, ProbeError};
use crate::name::ConfigName;

/// Operations the cache performs on a connection handle.
pub trait ManagedConnection {
    /// Checks that the connection still answers within `timeout`.
    ///
    /// Returns `Ok(false)` when the handle is known to be unusable without
    /// touching the network, for example after the peer hung up.
    ///
    /// # Errors
    /// Returns a [`ProbeError`] when the probe itself fails. Callers treat
    /// this as "invalid".
    fn probe(&mut self, timeout: Duration) -> Result<bool, ProbeError>;

    /// Commits the pending transaction while keeping the connection open.
    ///
    /// # Errors
    /// Returns a [`crate::CommitError`] when the commit is rejected or the
    /// connection dropped.
    fn commit(&mut self) -> CommitResult<()>;

    /// Reports whether the connection has already been closed.
    fn is_closed(&self) -> bool;

    /// Physically closes the connection.
    ///
    /// # Errors
    /// Returns a [`crate::CloseError`] when the driver reports a failure while
    /// tearing down the session.
    fn close(self) -> CloseResult<()>;
}

/// Produces fresh connections for named targets.
///
/// Implementations may open a socket directly or draw from a pool; the cache
/// only relies on receiving an owned handle.
pub trait ConnectionFactory {
    /// Handle type produced by the factory.
    type Connection: ManagedConnection;

    /// Opens a new connection for `name`.
    ///
    /// # Errors
    /// Returns a [`crate::AcquireError`] when the target is unknown or the
    /// connect attempt fails.
    fn create(&self, name: &ConfigName) -> AcquireResult<Self::Connection>;

    /// Reports whether `name` maps to a known target.
    ///
    /// Factories that cannot tell ahead of time keep the default.
    fn recognises(&self, name: &ConfigName) -> bool {
        let _ = name;
        true
    }
}

/// Process-unique identity assigned to every handle the cache stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

impl HandleId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}
