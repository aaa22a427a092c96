//! Logging Configuration
//!
//! Settings are loaded from environment variables for 12-factor compliance.

/// Log line encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable single-line output
    Text,
    /// One JSON object per event
    Json,
}

/// Logging configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directives (default: info)
    pub filter: String,
    /// Output encoding (`LOG_FORMAT=json` selects JSON)
    pub format: LogFormat,
    /// Include the event target (module path) in each line
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: "info".to_string(),
            format: LogFormat::Text,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("RUST_LOG").ok(),
            std::env::var("LOG_FORMAT").ok(),
        )
    }

    fn from_vars(rust_log: Option<String>, log_format: Option<String>) -> Self {
        let defaults = LogConfig::default();
        LogConfig {
            filter: rust_log
                .filter(|s| !s.trim().is_empty())
                .unwrap_or(defaults.filter),
            format: match log_format.as_deref().map(str::to_ascii_lowercase).as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            with_target: defaults.with_target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = LogConfig::from_vars(None, None);
        assert_eq!(config, LogConfig::default());
    }

    #[test]
    fn test_json_format_and_filter() {
        let config = LogConfig::from_vars(
            Some("blob_sink=debug".to_string()),
            Some("JSON".to_string()),
        );
        assert_eq!(config.filter, "blob_sink=debug");
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_blank_filter_falls_back() {
        let config = LogConfig::from_vars(Some("  ".to_string()), Some("text".to_string()));
        assert_eq!(config.filter, "info");
        assert_eq!(config.format, LogFormat::Text);
    }
}
