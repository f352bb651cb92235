//! Scalar manager settings loaded from the environment.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8PathBuf;
use color_eyre::eyre::eyre;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::manager::StaleHandlePolicy;
use crate::validator::DEFAULT_PROBE_TIMEOUT;

const MAX_PROBE_TIMEOUT_SECS: u64 = 60;

/// Captures connection manager settings supplied via environment variables.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use pg_context_conn::{ManagerSettings, StaleHandlePolicy};
///
/// let settings = ManagerSettings::default();
/// assert_eq!(settings.probe_timeout()?, Duration::from_secs(3));
/// assert_eq!(settings.stale_policy(), StaleHandlePolicy::Abandon);
/// # Ok::<(), pg_context_conn::ConfigError>(())
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, OrthoConfig, Default)]
#[ortho_config(prefix = "PG_CONN")]
pub struct ManagerSettings {
    /// Seconds allowed for each liveness probe.
    pub probe_timeout_secs: Option<u64>,
    /// Close handles that fail validation instead of abandoning them.
    pub close_stale_handles: Option<bool>,
    /// JSON5 file mapping configuration names to connection URLs.
    pub targets_file: Option<Utf8PathBuf>,
}

impl ManagerSettings {
    /// Loads settings from environment variables without parsing CLI arguments.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when a variable cannot be parsed.
    pub fn load() -> ConfigResult<Self> {
        let args = [OsString::from("pg-context-conn")];
        Self::load_from_iter(args)
            .map_err(|err| ConfigError::from(eyre!(err)))
    }

    /// Returns the probe timeout, defaulting to three seconds.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the configured value is zero or above
    /// sixty seconds.
    pub fn probe_timeout(&self) -> ConfigResult<Duration> {
        let Some(secs) = self.probe_timeout_secs else {
            return Ok(DEFAULT_PROBE_TIMEOUT);
        };
        if secs == 0 {
            return Err(ConfigError::from(eyre!(
                "probe timeout must be at least 1 second (received {secs})"
            )));
        }
        if secs > MAX_PROBE_TIMEOUT_SECS {
            return Err(ConfigError::from(eyre!(
                "probe timeout must be {MAX_PROBE_TIMEOUT_SECS} seconds or less (received {secs})"
            )));
        }
        Ok(Duration::from_secs(secs))
    }

    /// Returns how invalid handles are disposed of when replaced.
    #[must_use]
    pub fn stale_policy(&self) -> StaleHandlePolicy {
        if self.close_stale_handles.unwrap_or(false) {
            StaleHandlePolicy::CloseBestEffort
        } else {
            StaleHandlePolicy::Abandon
        }
    }
}
