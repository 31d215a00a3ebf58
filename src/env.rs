//! Environment variable names used by [`SinkConfig::from_env`].
//!
//! These are purely helpers; the scheduler and stores never read the
//! environment themselves.
//!
//! [`SinkConfig::from_env`]: crate::config::SinkConfig::from_env

use crate::config::ConfigError;
use std::str::FromStr;

/// Full store DSN, e.g. `docstore://127.0.0.1:9200,127.0.0.2:9200/logs`.
pub const LOG_SINK_DSN_ENV: &str = "LOG_SINK_DSN";

/// Comma-separated server addresses; overrides the DSN hosts.
pub const LOG_SINK_SERVERS_ENV: &str = "LOG_SINK_SERVERS";

/// Target collection name; overrides the DSN collection.
pub const LOG_SINK_COLLECTION_ENV: &str = "LOG_SINK_COLLECTION";

/// Maximum number of events drained per tick.
pub const LOG_SINK_BATCH_LIMIT_ENV: &str = "LOG_SINK_BATCH_LIMIT";

/// Flush period in milliseconds.
pub const LOG_SINK_PERIOD_MS_ENV: &str = "LOG_SINK_PERIOD_MS";

/// Optional cap on buffered events.
pub const LOG_SINK_MAX_BUFFER_ENV: &str = "LOG_SINK_MAX_BUFFER";

/// Graceful shutdown timeout in milliseconds.
pub const LOG_SINK_SHUTDOWN_TIMEOUT_MS_ENV: &str = "LOG_SINK_SHUTDOWN_TIMEOUT_MS";

/// Parse an optional raw value, keeping `default` when it is absent.
pub(crate) fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        }),
    }
}

/// Split a comma-separated server list, dropping surrounding whitespace.
pub(crate) fn split_servers(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_keeps_default_when_missing() {
        assert_eq!(parse_or::<usize>("K", None, 7).unwrap(), 7);
        assert_eq!(parse_or::<usize>("K", Some(" 12 ".into()), 7).unwrap(), 12);
        assert!(matches!(
            parse_or::<usize>("K", Some("many".into()), 7),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn split_servers_trims_entries() {
        assert_eq!(split_servers("a:1, b:2"), vec!["a:1".to_string(), "b:2".to_string()]);
    }
}
