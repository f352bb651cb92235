//! Execution contexts that own cached connections.
//!
//! A [`ConnectionContext`] is the unit of isolation for the cache: it owns one
//! [`ContextRegistry`] and is `!Send`, so every handle it caches stays on the
//! thread that created it. Two contexts never observe each other's entries.
//!
//! Contexts should end through [`ConnectionContext::release_all`] or by
//! scoping work with [`with_connection_context`]. Dropping a context that
//! still holds connections closes them without committing and logs a warning,
//! so work abandoned by an early return or a panic is rolled back.
//!
//! ```compile_fail
//! use pg_context_conn::ConnectionContext;
//! use pg_context_conn::test_support::FakeConnection;
//!
//! fn assert_send<T: Send>(_: T) {}
//! assert_send(ConnectionContext::<FakeConnection>::new());
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use tracing::info_span;

use crate::connection::ManagedConnection;
use crate::error::{ConnectionError, Result};
use crate::name::ConfigName;
use crate::observability::LOG_TARGET;

mod registry;

pub use registry::{CachedHandle, ContextRegistry};

/// Process-unique identity of a [`ConnectionContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

impl ContextId {
    fn next() -> Self {
        Self(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// Owns the cached connections of one execution context.
///
/// Pending work is only committed through [`ConnectionContext::release_all`]
/// or the manager's release operations. A context dropped while it still
/// caches connections closes them without committing, discarding any open
/// transaction.
#[derive(Debug)]
pub struct ConnectionContext<C: ManagedConnection> {
    id: ContextId,
    registry: ContextRegistry<C>,
    _not_send: PhantomData<Rc<()>>,
}

impl<C: ManagedConnection> ConnectionContext<C> {
    /// Creates an empty context bound to the calling thread.
    #[must_use]
    pub fn new() -> Self {
        let id = ContextId::next();
        tracing::trace!(
            target: LOG_TARGET,
            context = %id,
            thread = ?thread::current().id(),
            "created connection context"
        );
        Self {
            id,
            registry: ContextRegistry::new(),
            _not_send: PhantomData,
        }
    }

    /// Returns the identity of this context.
    #[must_use]
    pub const fn id(&self) -> ContextId {
        self.id
    }

    /// Read-only view of the cached handles.
    #[must_use]
    pub const fn registry(&self) -> &ContextRegistry<C> {
        &self.registry
    }

    pub(crate) const fn registry_mut(&mut self) -> &mut ContextRegistry<C> {
        &mut self.registry
    }

    /// Commits and closes every cached connection, leaving the context empty.
    ///
    /// Each entry is evicted before it is torn down, so the registry is empty
    /// on return even when some teardowns fail.
    ///
    /// # Errors
    /// Returns the first commit or close failure encountered. Later failures
    /// are logged and skipped.
    pub fn release_all(&mut self) -> Result<()> {
        let span = info_span!(
            target: LOG_TARGET,
            "release_all",
            context = %self.id,
            cached = self.registry.len()
        );
        let _entered = span.enter();

        let mut first_error = None;
        for (name, handle) in self.registry.drain() {
            if let Err(err) = teardown(&name, handle, Teardown::CommitThenClose) {
                tracing::warn!(
                    target: LOG_TARGET,
                    config = %name,
                    error = %err,
                    "failed to release cached connection"
                );
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Closes every cached connection without committing, leaving the
    /// context empty. Failures are logged and skipped.
    pub fn discard_all(&mut self) {
        for (name, handle) in self.registry.drain() {
            if let Err(err) = teardown(&name, handle, Teardown::CloseOnly) {
                tracing::warn!(
                    target: LOG_TARGET,
                    context = %self.id,
                    config = %name,
                    error = %err,
                    "failed to close discarded connection"
                );
            }
        }
    }
}

impl<C: ManagedConnection> Default for ConnectionContext<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ManagedConnection> Drop for ConnectionContext<C> {
    fn drop(&mut self) {
        if self.registry.is_empty() {
            return;
        }
        tracing::warn!(
            target: LOG_TARGET,
            context = %self.id,
            cached = self.registry.len(),
            panicking = thread::panicking(),
            "connection context dropped with cached connections; closing them without commit"
        );
        self.discard_all();
    }
}

#[derive(Debug, Clone, Copy)]
enum Teardown {
    CommitThenClose,
    CloseOnly,
}

/// Closes an evicted handle, committing first when requested. The close is
/// attempted even if the commit fails; the commit error wins.
fn teardown<C: ManagedConnection>(
    name: &ConfigName,
    handle: CachedHandle<C>,
    mode: Teardown,
) -> Result<()> {
    let id = handle.id();
    let mut conn = handle.into_inner();
    let committed = match mode {
        Teardown::CommitThenClose => conn.commit().map_err(ConnectionError::from),
        Teardown::CloseOnly => Ok(()),
    };
    let closed = if conn.is_closed() {
        Ok(())
    } else {
        conn.close().map_err(ConnectionError::from)
    };
    tracing::debug!(
        target: LOG_TARGET,
        config = %name,
        handle = %id,
        "tore down cached connection"
    );
    committed.and(closed)
}

/// Runs `work` inside a fresh context and ends the context when it returns.
///
/// When `work` succeeds every connection it cached is committed and closed.
/// When it fails the connections are closed without committing and the error
/// is returned unchanged.
///
/// # Errors
/// Returns the error produced by `work`, or the first commit or close
/// failure raised while releasing. The value produced by `work` is discarded
/// in the latter case.
///
/// # Examples
/// ```
/// use std::sync::Arc;
/// use pg_context_conn::{ConfigName, ConnectionManager, with_connection_context};
/// use pg_context_conn::test_support::FakeFactory;
///
/// # fn main() -> pg_context_conn::Result<()> {
/// let factory = Arc::new(FakeFactory::new());
/// let mut manager = ConnectionManager::new(ConfigName::new("db1")?, Arc::clone(&factory))?;
///
/// with_connection_context(|ctx| -> pg_context_conn::Result<()> {
///     manager.acquire(ctx)?;
///     manager.release(ctx)?;
///     Ok(())
/// })?;
///
/// assert!(factory.created()[0].is_closed());
/// # Ok(())
/// # }
/// ```
pub fn with_connection_context<C, F, R, E>(work: F) -> std::result::Result<R, E>
where
    C: ManagedConnection,
    F: FnOnce(&mut ConnectionContext<C>) -> std::result::Result<R, E>,
    E: From<ConnectionError>,
{
    let mut ctx = ConnectionContext::new();
    match work(&mut ctx) {
        Ok(value) => {
            ctx.release_all()?;
            Ok(value)
        }
        Err(err) => {
            tracing::debug!(
                target: LOG_TARGET,
                context = %ctx.id(),
                cached = ctx.registry().len(),
                "scoped work failed; discarding cached connections"
            );
            ctx.discard_all();
            Err(err)
        }
    }
}
