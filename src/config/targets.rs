//! Named database targets resolved from a JSON5 file and the environment.

use std::collections::BTreeMap;
use std::fmt;

use camino::Utf8Path;
use color_eyre::eyre::{WrapErr, eyre};
use figment::Figment;
use figment::providers::{Env, Format};
use figment_json5::Json5;
use secrecy::SecretString;

use crate::error::{ConfigError, ConfigResult};
use crate::name::ConfigName;

/// Environment prefix for per-target connection URLs.
///
/// `PG_CONN_TARGET_REPORTING=postgresql://...` registers the `reporting`
/// target. Names are lower-cased.
pub const TARGET_ENV_PREFIX: &str = "PG_CONN_TARGET_";

/// Maps configuration names to connection URLs.
///
/// URLs usually embed credentials, so they are held as secrets and omitted
/// from `Debug` output.
///
/// # Examples
/// ```
/// use pg_context_conn::{ConfigName, DatabaseTargets};
///
/// let name = ConfigName::new("db1")?;
/// let targets = DatabaseTargets::new()
///     .with_target(name.clone(), "postgresql://app@localhost/app");
/// assert!(targets.contains(&name));
/// assert!(!format!("{targets:?}").contains("localhost"));
/// # Ok::<(), pg_context_conn::ConfigError>(())
/// ```
#[derive(Clone, Default)]
pub struct DatabaseTargets {
    urls: BTreeMap<ConfigName, SecretString>,
}

impl DatabaseTargets {
    /// Creates an empty target table.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            urls: BTreeMap::new(),
        }
    }

    /// Registers `url` under `name`, replacing any previous entry.
    #[must_use]
    pub fn with_target(mut self, name: ConfigName, url: impl Into<String>) -> Self {
        self.urls.insert(name, SecretString::from(url.into()));
        self
    }

    /// Loads targets from `file` (when given) and `PG_CONN_TARGET_*`
    /// environment variables. Environment entries override file entries with
    /// the same name.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the file is missing or malformed, or a
    /// target name fails validation.
    pub fn load(file: Option<&Utf8Path>) -> ConfigResult<Self> {
        let mut figment = Figment::new();
        if let Some(path) = file {
            if !path.is_file() {
                return Err(ConfigError::from(eyre!(
                    "database targets file '{path}' does not exist"
                )));
            }
            figment = figment.merge(Json5::file(path.as_std_path()));
        }
        Self::from_figment(&figment.merge(Env::prefixed(TARGET_ENV_PREFIX)))
    }

    /// Extracts targets from a prepared figment whose top level is a table of
    /// name to URL.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when extraction fails or a name is invalid.
    pub fn from_figment(figment: &Figment) -> ConfigResult<Self> {
        let raw: BTreeMap<String, String> = figment
            .extract()
            .wrap_err("failed to read database targets")
            .map_err(ConfigError::from)?;
        raw.into_iter()
            .try_fold(Self::new(), |targets, (name, url)| {
                Ok(targets.with_target(ConfigName::new(&name)?, url))
            })
    }

    /// Returns the URL registered under `name`.
    #[must_use]
    pub fn url(&self, name: &ConfigName) -> Option<&SecretString> {
        self.urls.get(name)
    }

    /// Returns `true` when `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &ConfigName) -> bool {
        self.urls.contains_key(name)
    }

    /// Returns the registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &ConfigName> {
        self.urls.keys()
    }

    /// Number of registered targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Returns `true` when no target is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl fmt::Debug for DatabaseTargets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseTargets")
            .field("names", &self.urls.keys().collect::<Vec<_>>())
            .finish()
    }
}
