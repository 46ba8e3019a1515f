//! Logging setup shared by the Syndicate binaries
//!
//! Format and level come from `SYNDICATE_LOG_FORMAT` (text, json,
//! pretty) and `SYNDICATE_LOG_LEVEL`; a CLI verbose flag overrides the
//! level to debug. Everything goes to stderr so command output stays
//! pipeable.

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain text, one line per event
    Text,
    /// One JSON object per line, for log shippers
    Json,
    /// Multi-line with colors, for development
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            _ => Err(format!(
                "unknown log format '{}' (expected text, json, or pretty)",
                s
            )),
        }
    }
}

/// Install the global subscriber from the `SYNDICATE_LOG_*` env vars.
/// `verbose` wins over the configured level. The queue CLI defaults to
/// error-only so normal output stays clean.
pub fn init_from_env(verbose: bool) {
    let format = std::env::var("SYNDICATE_LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(LogFormat::Text);

    let level = if verbose {
        "debug".to_string()
    } else {
        std::env::var("SYNDICATE_LOG_LEVEL").unwrap_or_else(|_| "error".to_string())
    };

    init(format, &level);
}

/// Install the global subscriber with an explicit format and level.
/// Call once at startup; `RUST_LOG` still takes precedence when set.
pub fn init(format: LogFormat, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .flatten_event(true)
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parses_case_insensitively() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("Pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_rejects_unknown() {
        let err = "syslog".parse::<LogFormat>().unwrap_err();
        assert!(err.contains("syslog"));
    }
}
