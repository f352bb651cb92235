//! In-memory connection doubles for exercising the cache without a server.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use color_eyre::eyre::eyre;

use crate::connection::{ConnectionFactory, ManagedConnection};
use crate::error::{
    AcquireError, AcquireErrorKind, AcquireResult, CloseError, CloseResult, CommitError,
    CommitResult, ProbeError,
};
use crate::name::ConfigName;

static NEXT_SERIAL: AtomicUsize = AtomicUsize::new(1);

/// Observable state shared between a [`FakeConnection`] and the test that
/// created it. Knobs can be flipped while the connection sits in a cache.
#[derive(Debug)]
pub struct FakeState {
    serial: usize,
    config: Option<ConfigName>,
    alive: AtomicBool,
    probe_fails: AtomicBool,
    commit_fails: AtomicBool,
    close_fails: AtomicBool,
    closed: AtomicBool,
    probes: AtomicUsize,
    commits: AtomicUsize,
    close_calls: AtomicUsize,
    last_probe_timeout: Mutex<Option<Duration>>,
}

impl FakeState {
    fn new(config: Option<ConfigName>) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            config,
            alive: AtomicBool::new(true),
            probe_fails: AtomicBool::new(false),
            commit_fails: AtomicBool::new(false),
            close_fails: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            probes: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            last_probe_timeout: Mutex::new(None),
        }
    }

    /// Process-unique serial number of the connection.
    #[must_use]
    pub const fn serial(&self) -> usize {
        self.serial
    }

    /// Configuration the connection was opened for, when created by a
    /// [`FakeFactory`].
    #[must_use]
    pub const fn config(&self) -> Option<&ConfigName> {
        self.config.as_ref()
    }

    /// Sets what the liveness probe reports.
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Makes the probe return an error instead of a verdict.
    pub fn fail_probe(&self, fail: bool) {
        self.probe_fails.store(fail, Ordering::SeqCst);
    }

    /// Makes commits fail.
    pub fn fail_commit(&self, fail: bool) {
        self.commit_fails.store(fail, Ordering::SeqCst);
    }

    /// Makes physical close fail.
    pub fn fail_close(&self, fail: bool) {
        self.close_fails.store(fail, Ordering::SeqCst);
    }

    /// Marks the connection as closed by the peer.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once the connection has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of probes run.
    #[must_use]
    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Number of successful commits.
    #[must_use]
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of times [`ManagedConnection::close`] was called.
    #[must_use]
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Timeout passed to the most recent probe.
    #[must_use]
    pub fn last_probe_timeout(&self) -> Option<Duration> {
        *self
            .last_probe_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Connection double whose behaviour is driven by a shared [`FakeState`].
#[derive(Debug)]
pub struct FakeConnection {
    state: Arc<FakeState>,
}

impl FakeConnection {
    /// Creates a live connection not tied to any configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState::new(None)),
        }
    }

    fn for_config(name: &ConfigName) -> Self {
        Self {
            state: Arc::new(FakeState::new(Some(name.clone()))),
        }
    }

    /// Returns the shared state handle.
    #[must_use]
    pub const fn state(&self) -> &Arc<FakeState> {
        &self.state
    }

    /// Returns the serial number of the underlying state.
    #[must_use]
    pub fn serial(&self) -> usize {
        self.state.serial()
    }
}

impl Default for FakeConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl ManagedConnection for FakeConnection {
    fn probe(&mut self, timeout: Duration) -> Result<bool, ProbeError> {
        self.state.probes.fetch_add(1, Ordering::SeqCst);
        *self
            .state
            .last_probe_timeout
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(timeout);
        if self.state.probe_fails.load(Ordering::SeqCst) {
            return Err(ProbeError::from(eyre!("fake probe failure")));
        }
        let alive = self.state.alive.load(Ordering::SeqCst);
        Ok(alive && !self.state.is_closed())
    }

    fn commit(&mut self) -> CommitResult<()> {
        if self.state.commit_fails.load(Ordering::SeqCst) {
            return Err(CommitError::from(eyre!("fake commit failure")));
        }
        if self.state.is_closed() {
            return Err(CommitError::from(eyre!("connection is closed")));
        }
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    fn close(self) -> CloseResult<()> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.close_fails.load(Ordering::SeqCst) {
            return Err(CloseError::from(eyre!("fake close failure")));
        }
        self.state.mark_closed();
        Ok(())
    }
}

/// Factory producing [`FakeConnection`]s and remembering each one.
///
/// The factory is `Sync`, so one instance can serve contexts on several
/// threads.
#[derive(Debug, Default)]
pub struct FakeFactory {
    known: Option<Vec<ConfigName>>,
    created: Mutex<Vec<Arc<FakeState>>>,
    fail_next: AtomicBool,
}

impl FakeFactory {
    /// Creates a factory that accepts every configuration name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory that only recognises `names`.
    #[must_use]
    pub fn with_known(names: Vec<ConfigName>) -> Self {
        Self {
            known: Some(names),
            ..Self::default()
        }
    }

    /// Makes the next [`ConnectionFactory::create`] call fail.
    pub fn fail_next_create(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// States of every connection created so far, oldest first.
    #[must_use]
    pub fn created(&self) -> Vec<Arc<FakeState>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// State of the connection created at position `index`.
    ///
    /// # Errors
    /// Returns an error when fewer than `index + 1` connections exist.
    pub fn created_at(&self, index: usize) -> color_eyre::Result<Arc<FakeState>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
            .ok_or_else(|| eyre!("no connection was created at position {index}"))
    }

    /// Number of connections created so far.
    #[must_use]
    pub fn create_count(&self) -> usize {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ConnectionFactory for FakeFactory {
    type Connection = FakeConnection;

    fn create(&self, name: &ConfigName) -> AcquireResult<FakeConnection> {
        if !self.recognises(name) {
            return Err(AcquireError::new(
                AcquireErrorKind::UnknownConfiguration,
                eyre!("unknown configuration '{name}'"),
            ));
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AcquireError::from(eyre!("fake connect failure for '{name}'")));
        }
        let conn = FakeConnection::for_config(name);
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(conn.state()));
        Ok(conn)
    }

    fn recognises(&self, name: &ConfigName) -> bool {
        self.known
            .as_ref()
            .is_none_or(|known| known.contains(name))
    }
}
