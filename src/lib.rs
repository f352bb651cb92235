//! Caches one database connection per execution context and configuration
//! name.
//!
//! A [`ConnectionManager`] hands out the connection cached in a
//! [`ConnectionContext`] while it passes a bounded liveness probe, reopening
//! it through a [`ConnectionFactory`] otherwise. Releasing a connection only
//! commits the pending transaction so the socket can serve the next unit of
//! work; the final release commits, evicts and closes it.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//! use pg_context_conn::{ConfigName, ConnectionContext, ConnectionManager};
//! use pg_context_conn::test_support::FakeFactory;
//!
//! # fn main() -> pg_context_conn::Result<()> {
//! let factory = Arc::new(FakeFactory::new());
//! let mut manager = ConnectionManager::new(ConfigName::new("db1")?, Arc::clone(&factory))?;
//! let mut ctx = ConnectionContext::new();
//!
//! manager.acquire(&mut ctx)?;
//! manager.release(&mut ctx)?;
//! manager.acquire(&mut ctx)?;
//! assert_eq!(factory.create_count(), 1);
//!
//! manager.final_release(&mut ctx)?;
//! assert!(ctx.registry().is_empty());
//! # Ok(())
//! # }
//! ```

mod config;
mod connection;
mod context;
mod error;
mod manager;
mod name;
mod observability;
mod pg;
#[doc(hidden)]
pub mod test_support;
mod validator;

pub use config::{DatabaseTargets, ManagerSettings, TARGET_ENV_PREFIX};
pub use connection::{ConnectionFactory, HandleId, ManagedConnection};
pub use context::{
    CachedHandle, ConnectionContext, ContextId, ContextRegistry, with_connection_context,
};
pub use error::{
    AcquireError, AcquireErrorKind, AcquireResult, CloseError, CloseResult, CommitError,
    CommitResult, ConfigError, ConfigResult, ConnectionError, ProbeError, Result,
};
pub use manager::{ConnectionManager, StaleHandlePolicy};
pub use name::ConfigName;
pub use pg::{PgConnection, PgConnectionFactory};
pub use validator::{ConnectionValidator, DEFAULT_PROBE_TIMEOUT};

use std::sync::Arc;

/// Builds a `PostgreSQL` connection manager for `name` from environment
/// settings and the configured target table.
///
/// # Errors
/// Returns an error when the settings or targets cannot be loaded, or when
/// `name` is not a configured target.
///
/// # Examples
/// ```no_run
/// use pg_context_conn::{ConfigName, ConnectionContext, postgres_manager};
///
/// # fn main() -> pg_context_conn::Result<()> {
/// let mut manager = postgres_manager(ConfigName::new("primary")?)?;
/// let mut ctx = ConnectionContext::new();
/// let client = manager.acquire(&mut ctx)?.client().expect("BEGIN should succeed");
/// client
///     .batch_execute("INSERT INTO audit (event) VALUES ('login')")
///     .expect("insert should succeed");
/// manager.release(&mut ctx)?; // commits, keeps the socket
/// manager.final_release(&mut ctx)?; // commits again, closes the socket
/// # Ok(())
/// # }
/// ```
pub fn postgres_manager(name: ConfigName) -> Result<ConnectionManager<PgConnectionFactory>> {
    let settings = ManagerSettings::load()?;
    let targets = DatabaseTargets::load(settings.targets_file.as_deref())?;
    let factory = Arc::new(PgConnectionFactory::new(targets));
    ConnectionManager::from_settings(name, factory, &settings)
}
