//! Validated identifiers for named database targets.

use std::fmt;
use std::str::FromStr;

use color_eyre::eyre::eyre;

use crate::error::{ConfigError, ConfigResult};

/// Identifies which database target a cached connection belongs to.
///
/// Names are trimmed and restricted to ASCII alphanumerics plus `_`, `-` and
/// `.` so typos surface when the name is parsed rather than on first use.
///
/// # Examples
/// ```
/// use pg_context_conn::ConfigName;
///
/// let name: ConfigName = " reporting ".parse()?;
/// assert_eq!(name.as_str(), "reporting");
/// assert!(ConfigName::new("bad name").is_err());
/// # Ok::<(), pg_context_conn::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigName(String);

impl ConfigName {
    /// Parses and validates a configuration name.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the trimmed name is empty or contains a
    /// character outside the permitted set.
    pub fn new(raw: &str) -> ConfigResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::from(eyre!(
                "configuration name must not be empty"
            )));
        }
        if let Some(bad) = trimmed.chars().find(|c| !is_permitted(*c)) {
            return Err(ConfigError::from(eyre!(
                "configuration name '{trimmed}' contains unsupported character {bad:?}"
            )));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

const fn is_permitted(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

impl FromStr for ConfigName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ConfigName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ConfigName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
