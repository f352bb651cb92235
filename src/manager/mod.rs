//! Hands out one live connection per context and configuration name.
//!
//! [`ConnectionManager`] layers caching, validity gating and lifecycle
//! sequencing over a [`ConnectionFactory`]:
//!
//! - [`ConnectionManager::acquire`] reuses the cached handle while it passes
//!   the liveness probe and otherwise asks the factory for a fresh one.
//! - [`ConnectionManager::release`] is a logical close: it commits the
//!   pending transaction and keeps the connection cached for the next unit of
//!   work.
//! - [`ConnectionManager::final_release`] commits, evicts the entry and
//!   physically closes the connection. Call it once per context and
//!   configuration when the context ends.

use std::fmt;
use std::sync::Arc;

use color_eyre::eyre::eyre;
use tracing::info_span;

use crate::config::ManagerSettings;
use crate::connection::{ConnectionFactory, HandleId, ManagedConnection};
use crate::context::{CachedHandle, ConnectionContext};
use crate::error::{AcquireError, AcquireErrorKind, AcquireResult, Result};
use crate::name::ConfigName;
use crate::observability::LOG_TARGET;
use crate::validator::ConnectionValidator;


/// What happens to a cached handle that failed validation when its
/// replacement is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StaleHandlePolicy {
    /// Drop the stale handle without calling [`ManagedConnection::close`].
    #[default]
    Abandon,
    /// Close the stale handle, logging and ignoring any failure.
    CloseBestEffort,
}

/// Connection manager bound to a single configuration name.
pub struct ConnectionManager<F: ConnectionFactory> {
    name: ConfigName,
    factory: Arc<F>,
    validator: ConnectionValidator,
    stale_policy: StaleHandlePolicy,
    last_handle: Option<HandleId>,
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("name", &self.name)
            .field("validator", &self.validator)
            .field("stale_policy", &self.stale_policy)
            .field("last_handle", &self.last_handle)
            .finish_non_exhaustive()
    }
}

impl<F: ConnectionFactory> ConnectionManager<F> {
    /// Creates a manager for `name` using default probe and stale-handle
    /// settings.
    ///
    /// # Errors
    /// Returns an [`AcquireError`] of kind
    /// [`AcquireErrorKind::UnknownConfiguration`] when `factory` does not
    /// recognise `name`.
    pub fn new(name: ConfigName, factory: Arc<F>) -> AcquireResult<Self> {
        if !factory.recognises(&name) {
            return Err(AcquireError::new(
                AcquireErrorKind::UnknownConfiguration,
                eyre!("no database target is configured under '{name}'"),
            ));
        }
        Ok(Self {
            name,
            factory,
            validator: ConnectionValidator::default(),
            stale_policy: StaleHandlePolicy::default(),
            last_handle: None,
        })
    }

    /// Creates a manager whose probe timeout and stale-handle policy come
    /// from `settings`.
    ///
    /// # Errors
    /// Returns an error when the settings are out of range or `factory` does
    /// not recognise `name`.
    pub fn from_settings(
        name: ConfigName,
        factory: Arc<F>,
        settings: &ManagerSettings,
    ) -> Result<Self> {
        let validator = ConnectionValidator::new(settings.probe_timeout()?);
        Ok(Self::new(name, factory)?
            .with_validator(validator)
            .with_stale_policy(settings.stale_policy()))
    }

    /// Replaces the validator used on every acquisition.
    #[must_use]
    pub const fn with_validator(mut self, validator: ConnectionValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Replaces the stale-handle policy.
    #[must_use]
    pub const fn with_stale_policy(mut self, policy: StaleHandlePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    /// Returns the configuration name this manager serves.
    #[must_use]
    pub const fn config_name(&self) -> &ConfigName {
        &self.name
    }

    /// Returns the handle most recently returned by this manager.
    #[must_use]
    pub const fn last_handle(&self) -> Option<HandleId> {
        self.last_handle
    }

    /// Returns the handle currently cached in `ctx` for this configuration.
    #[must_use]
    pub fn current_handle(&self, ctx: &ConnectionContext<F::Connection>) -> Option<HandleId> {
        ctx.registry().get(&self.name).map(CachedHandle::id)
    }

    /// Returns a live connection for this configuration in `ctx`.
    ///
    /// The cached handle is returned as long as it passes validation.
    /// Otherwise the factory opens a new connection which replaces the cached
    /// entry. The registry is untouched when the factory fails.
    ///
    /// # Errors
    /// Propagates the factory's [`AcquireError`] unchanged.
    pub fn acquire<'ctx>(
        &mut self,
        ctx: &'ctx mut ConnectionContext<F::Connection>,
    ) -> AcquireResult<&'ctx mut F::Connection> {
        let context = ctx.id();
        let validator = self.validator;
        let reusable = ctx
            .registry_mut()
            .lookup(&self.name)
            .is_some_and(|handle| validator.is_valid(Some(handle.connection_mut())));

        if !reusable {
            self.replace_cached(ctx)?;
        }

        let handle = ctx.registry_mut().lookup(&self.name).ok_or_else(|| {
            AcquireError::from(eyre!(
                "connection for '{}' vanished from {context} after being stored",
                self.name
            ))
        })?;
        self.last_handle = Some(handle.id());
        tracing::debug!(
            target: LOG_TARGET,
            config = %self.name,
            context = %context,
            handle = %handle.id(),
            reused = reusable,
            "acquired connection"
        );
        Ok(handle.connection_mut())
    }

    fn replace_cached(&self, ctx: &mut ConnectionContext<F::Connection>) -> AcquireResult<()> {
        tracing::trace!(
            target: LOG_TARGET,
            config = %self.name,
            context = %ctx.id(),
            "no valid cached connection; opening a new one"
        );
        let fresh = CachedHandle::new(self.factory.create(&self.name)?);
        let fresh_id = fresh.id();
        if let Some(stale) = ctx.registry_mut().store(self.name.clone(), fresh) {
            self.dispose_stale(stale);
        }
        tracing::debug!(
            target: LOG_TARGET,
            config = %self.name,
            context = %ctx.id(),
            handle = %fresh_id,
            "cached new connection"
        );
        Ok(())
    }

    fn dispose_stale(&self, stale: CachedHandle<F::Connection>) {
        let id = stale.id();
        match self.stale_policy {
            StaleHandlePolicy::Abandon => {
                tracing::debug!(
                    target: LOG_TARGET,
                    config = %self.name,
                    handle = %id,
                    "abandoning invalid connection without closing it"
                );
            }
            StaleHandlePolicy::CloseBestEffort => {
                let conn = stale.into_inner();
                if conn.is_closed() {
                    return;
                }
                if let Err(err) = conn.close() {
                    tracing::warn!(
                        target: LOG_TARGET,
                        config = %self.name,
                        handle = %id,
                        error = %err,
                        "failed to close invalid connection"
                    );
                }
            }
        }
    }

    /// Commits the pending transaction and keeps the connection cached.
    ///
    /// A connection is acquired first, so releasing on a context with no
    /// cached entry opens one.
    ///
    /// # Errors
    /// Returns [`crate::ConnectionError::Acquire`] or
    /// [`crate::ConnectionError::Commit`].
    pub fn release(&mut self, ctx: &mut ConnectionContext<F::Connection>) -> Result<()> {
        self.acquire(ctx)?.commit()?;
        tracing::trace!(
            target: LOG_TARGET,
            config = %self.name,
            context = %ctx.id(),
            "committed; connection retained for reuse"
        );
        Ok(())
    }

    /// Commits, evicts and physically closes the connection for this
    /// configuration in `ctx`.
    ///
    /// On success no entry remains for this configuration in `ctx`; the next
    /// [`ConnectionManager::acquire`] opens a new connection. A failed commit
    /// leaves the entry cached. A failed close is reported after the entry
    /// has been evicted.
    ///
    /// # Errors
    /// Returns [`crate::ConnectionError::Acquire`],
    /// [`crate::ConnectionError::Commit`] or
    /// [`crate::ConnectionError::Close`].
    pub fn final_release(&mut self, ctx: &mut ConnectionContext<F::Connection>) -> Result<()> {
        let span = info_span!(
            target: LOG_TARGET,
            "final_release",
            config = %self.name,
            context = %ctx.id()
        );
        let _entered = span.enter();

        self.acquire(ctx)?.commit()?;
        self.last_handle = None;
        let Some(handle) = ctx.registry_mut().evict(&self.name) else {
            return Ok(());
        };
        let id = handle.id();
        let conn = handle.into_inner();
        if conn.is_closed() {
            tracing::debug!(
                target: LOG_TARGET,
                handle = %id,
                "connection already closed"
            );
            return Ok(());
        }
        conn.close()?;
        tracing::debug!(target: LOG_TARGET, handle = %id, "closed connection");
        Ok(())
    }
}
