//! Skip handling for suites that need an external `PostgreSQL` server.

/// Prefix used by log lines that record a skipped test.
pub const SKIP_LIVE_POSTGRES_PREFIX: &str = "SKIP-LIVE-POSTGRES";

/// Prefixes `reason` with the shared skip marker.
#[must_use]
pub fn format_skip_reason(reason: impl AsRef<str>) -> String {
    format!("{SKIP_LIVE_POSTGRES_PREFIX}: {}", reason.as_ref())
}

/// Returns the connection string held in `var`, or logs a skip notice and
/// returns `None` when it is unset or blank.
#[must_use]
pub fn live_url_or_skip(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(url) if !url.trim().is_empty() => Some(url),
        _ => {
            tracing::warn!("{}", format_skip_reason(format!("{var} is not set")));
            None
        }
    }
}
