//! `PostgreSQL` collaborators built on the synchronous `postgres` client.
//!
//! [`PgConnection`] keeps a transaction open between commits, so work done
//! through [`PgConnection::client`] only becomes visible once the owning
//! manager releases the connection.

use std::fmt;
use std::time::Duration;

use color_eyre::Report;
use color_eyre::eyre::{WrapErr, eyre};
use postgres::error::SqlState;
use postgres::{Client, NoTls};
use secrecy::ExposeSecret;

use crate::config::DatabaseTargets;
use crate::connection::{ConnectionFactory, ManagedConnection};
use crate::error::{
    AcquireError, AcquireErrorKind, AcquireResult, CloseError, CloseResult, CommitError,
    CommitResult, ProbeError,
};
use crate::name::ConfigName;
use crate::observability::LOG_TARGET;

/// A `postgres` client with explicit transaction boundaries.
pub struct PgConnection {
    client: Client,
    in_transaction: bool,
}

impl fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnection")
            .field("closed", &self.client.is_closed())
            .field("in_transaction", &self.in_transaction)
            .finish_non_exhaustive()
    }
}

impl PgConnection {
    /// Wraps an established client. No transaction is open yet.
    #[must_use]
    pub const fn new(client: Client) -> Self {
        Self {
            client,
            in_transaction: false,
        }
    }

    /// Borrows the client inside the current transaction, opening one when
    /// none is pending.
    ///
    /// # Errors
    /// Returns the driver error when `BEGIN` is rejected.
    pub fn client(&mut self) -> Result<&mut Client, postgres::Error> {
        if !self.in_transaction {
            self.client.batch_execute("BEGIN")?;
            self.in_transaction = true;
        }
        Ok(&mut self.client)
    }

    /// Returns `true` while a transaction opened by [`Self::client`] is
    /// awaiting commit.
    #[must_use]
    pub const fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Fails when an earlier statement aborted the open transaction.
    ///
    /// The server answers `COMMIT` on an aborted transaction with a rollback
    /// that the driver reports as success, so the state is checked first. An
    /// aborted transaction is rolled back here, leaving the session reusable.
    fn ensure_committable(&mut self) -> CommitResult<()> {
        let Err(err) = self.client.batch_execute("SELECT 1") else {
            return Ok(());
        };
        if err.code() != Some(&SqlState::IN_FAILED_SQL_TRANSACTION) {
            return Err(CommitError::from(
                Report::new(err).wrap_err("failed to check transaction state before commit"),
            ));
        }
        if let Err(rollback_err) = self.client.batch_execute("ROLLBACK") {
            tracing::warn!(
                target: LOG_TARGET,
                error = %rollback_err,
                "failed to roll back aborted transaction"
            );
        }
        self.in_transaction = false;
        Err(CommitError::from(Report::new(err).wrap_err(
            "transaction was aborted by an earlier statement and has been rolled back",
        )))
    }
}

impl ManagedConnection for PgConnection {
    fn probe(&mut self, timeout: Duration) -> Result<bool, ProbeError> {
        if self.client.is_closed() {
            return Ok(false);
        }
        self.client
            .is_valid(timeout)
            .wrap_err("postgres liveness probe failed")
            .map_err(ProbeError::from)?;
        Ok(true)
    }

    fn commit(&mut self) -> CommitResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        self.ensure_committable()?;
        self.client
            .batch_execute("COMMIT")
            .wrap_err("failed to commit transaction")
            .map_err(CommitError::from)?;
        self.in_transaction = false;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    fn close(self) -> CloseResult<()> {
        self.client
            .close()
            .wrap_err("failed to close postgres connection")
            .map_err(CloseError::from)
    }
}

/// Opens [`PgConnection`]s for targets listed in a [`DatabaseTargets`] table.
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    targets: DatabaseTargets,
}

impl PgConnectionFactory {
    /// Creates a factory over `targets`.
    #[must_use]
    pub const fn new(targets: DatabaseTargets) -> Self {
        Self { targets }
    }

    /// Returns the target table.
    #[must_use]
    pub const fn targets(&self) -> &DatabaseTargets {
        &self.targets
    }
}

impl ConnectionFactory for PgConnectionFactory {
    type Connection = PgConnection;

    fn create(&self, name: &ConfigName) -> AcquireResult<PgConnection> {
        let Some(url) = self.targets.url(name) else {
            return Err(AcquireError::new(
                AcquireErrorKind::UnknownConfiguration,
                eyre!("no database target is configured under '{name}'"),
            ));
        };
        tracing::trace!(target: LOG_TARGET, config = %name, "connecting to postgres");
        let client = Client::connect(url.expose_secret(), NoTls)
            .wrap_err(format!("failed to connect to database target '{name}'"))
            .map_err(AcquireError::from)?;
        Ok(PgConnection::new(client))
    }

    fn recognises(&self, name: &ConfigName) -> bool {
        self.targets.contains(name)
    }
}
