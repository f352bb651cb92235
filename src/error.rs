//! Domain error types for the per-context connection cache.
//!
//! Probe failures never escape the validator; every other failure kind
//! propagates unchanged to the immediate caller.

use color_eyre::Report;
use thiserror::Error;

/// Result alias for operations that may return a [`ConnectionError`].
pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Result alias for connection acquisition.
pub type AcquireResult<T> = std::result::Result<T, AcquireError>;

/// Result alias for transaction commits.
pub type CommitResult<T> = std::result::Result<T, CommitError>;

/// Result alias for physical connection teardown.
pub type CloseResult<T> = std::result::Result<T, CloseError>;

/// Result alias for configuration fallible operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Top-level error exposed by the crate.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Indicates a connection could not be obtained.
    #[error("connection acquisition failed")]
    Acquire(#[from] AcquireError),
    /// Indicates the pending transaction could not be committed.
    #[error("transaction commit failed")]
    Commit(#[from] CommitError),
    /// Indicates the connection could not be physically closed.
    #[error("connection close failed")]
    Close(#[from] CloseError),
    /// Indicates configuration parsing failed.
    #[error("configuration parsing failed")]
    Config(#[from] ConfigError),
}

/// Categorises acquisition failures so callers can branch on structured errors.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum AcquireErrorKind {
    /// The connect attempt itself failed.
    #[default]
    Connect,
    /// The factory has no target registered under the configuration name.
    UnknownConfiguration,
}

/// Captures acquisition failures raised by a connection factory.
#[derive(Debug, Error)]
#[error("{report}")]
pub struct AcquireError {
    kind: AcquireErrorKind,
    #[source]
    report: Report,
}

impl AcquireError {
    /// Constructs a new acquisition error with the provided kind and
    /// diagnostic report.
    #[must_use]
    pub const fn new(kind: AcquireErrorKind, report: Report) -> Self {
        Self { kind, report }
    }

    /// Returns the semantic category for this acquisition failure.
    #[must_use]
    pub const fn kind(&self) -> AcquireErrorKind {
        self.kind
    }

    /// Extracts the underlying diagnostic report.
    pub fn into_report(self) -> Report {
        self.report
    }
}

impl From<Report> for AcquireError {
    fn from(report: Report) -> Self {
        Self::new(AcquireErrorKind::Connect, report)
    }
}

/// Captures commit failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct CommitError(#[from] Report);

/// Captures physical close failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct CloseError(#[from] Report);

/// Captures liveness probe failures. The validator absorbs these.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ProbeError(#[from] Report);

/// Captures configuration failures.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ConfigError(#[from] Report);
