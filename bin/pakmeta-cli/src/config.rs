//! Process-level settings for the `pakmeta` binary.

/// Logging settings read from the environment.
///
/// Enrichment settings live in [`pakmeta_core::EnrichConfig`].
#[derive(Debug, Clone)]
pub struct Config {
    /// `tracing` filter string, e.g. `"info"` or `"pakmeta_core=debug"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            log_level: std::env::var("PAKMETA_LOG").unwrap_or_else(|_| "info".to_owned()),
            log_json: std::env::var("PAKMETA_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }
}
