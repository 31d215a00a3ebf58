use crate::dsn::{parse_dsn, DsnError};
use crate::env::{
    parse_or, split_servers, LOG_SINK_BATCH_LIMIT_ENV, LOG_SINK_COLLECTION_ENV, LOG_SINK_DSN_ENV,
    LOG_SINK_MAX_BUFFER_ENV, LOG_SINK_PERIOD_MS_ENV, LOG_SINK_SERVERS_ENV,
    LOG_SINK_SHUTDOWN_TIMEOUT_MS_ENV,
};
use crate::render::MessageFormatter;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_BATCH_POSTING_LIMIT: usize = 50;
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(2);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Shortest flush period the scheduler will run with.
pub const MIN_PERIOD: Duration = Duration::from_millis(10);

/// What to do with an incoming event when the buffer is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest buffered event to make room.
    #[default]
    DropOldest,
    /// Discard the incoming event.
    DropNewest,
}

/// Construction parameters for the batching pipeline.
///
/// **Fields**
/// - `servers`: ordered store addresses (`host:port` or URI); the first one
///   is the address writes go to.
/// - `collection`: target collection name.
/// - `batch_posting_limit`: maximum events drained per tick.
/// - `period`: interval between ticks.
/// - `max_buffered_events`: optional cap on the buffer; unbounded when `None`.
/// - `overflow_policy`: eviction rule applied once the cap is reached.
/// - `shutdown_timeout`: bound on the final drain performed by the init guard.
/// - `request_timeout`: per-request timeout of the HTTP store client.
/// - `formatter`: message formatting rule; [`TemplateFormatter`] when `None`.
///
/// [`TemplateFormatter`]: crate::render::TemplateFormatter
#[derive(Clone)]
pub struct SinkConfig {
    pub servers: Vec<String>,
    pub collection: String,
    pub batch_posting_limit: usize,
    pub period: Duration,
    pub max_buffered_events: Option<usize>,
    pub overflow_policy: OverflowPolicy,
    pub shutdown_timeout: Duration,
    pub request_timeout: Duration,
    pub formatter: Option<Arc<dyn MessageFormatter>>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            servers: vec!["localhost:9200".to_string()],
            collection: "logs".to_string(),
            batch_posting_limit: DEFAULT_BATCH_POSTING_LIMIT,
            period: DEFAULT_PERIOD,
            max_buffered_events: None,
            overflow_policy: OverflowPolicy::default(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            formatter: None,
        }
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("servers", &self.servers)
            .field("collection", &self.collection)
            .field("batch_posting_limit", &self.batch_posting_limit)
            .field("period", &self.period)
            .field("max_buffered_events", &self.max_buffered_events)
            .field("overflow_policy", &self.overflow_policy)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("formatter", &self.formatter.as_ref().map(|_| "custom"))
            .finish()
    }
}

impl SinkConfig {
    pub fn new(servers: Vec<String>, collection: impl Into<String>) -> Self {
        Self {
            servers,
            collection: collection.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_batch_posting_limit(mut self, limit: usize) -> Self {
        self.batch_posting_limit = limit;
        self
    }

    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    #[must_use]
    pub fn with_max_buffered_events(mut self, max: usize, policy: OverflowPolicy) -> Self {
        self.max_buffered_events = Some(max);
        self.overflow_policy = policy;
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_formatter(mut self, formatter: Arc<dyn MessageFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Check every parameter; returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_target(&self.servers, &self.collection)?;
        if self.batch_posting_limit == 0 {
            return Err(ConfigError::ZeroBatchLimit);
        }
        if self.period.is_zero() {
            return Err(ConfigError::ZeroPeriod);
        }
        if self.max_buffered_events == Some(0) {
            return Err(ConfigError::ZeroBufferLimit);
        }
        Ok(())
    }

    /// Build a config from `LOG_SINK_*` environment variables.
    ///
    /// `LOG_SINK_DSN` seeds servers and collection; `LOG_SINK_SERVERS` and
    /// `LOG_SINK_COLLECTION` override them. Missing variables keep the
    /// defaults. The result is validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SinkConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dsn) = lookup(LOG_SINK_DSN_ENV) {
            let target = parse_dsn(&dsn)?;
            config.servers = target.servers;
            config.collection = target.collection;
        }
        if let Some(servers) = lookup(LOG_SINK_SERVERS_ENV) {
            config.servers = split_servers(&servers);
        }
        if let Some(collection) = lookup(LOG_SINK_COLLECTION_ENV) {
            config.collection = collection;
        }

        config.batch_posting_limit = parse_or(
            LOG_SINK_BATCH_LIMIT_ENV,
            lookup(LOG_SINK_BATCH_LIMIT_ENV),
            config.batch_posting_limit,
        )?;

        let period_ms = parse_or(
            LOG_SINK_PERIOD_MS_ENV,
            lookup(LOG_SINK_PERIOD_MS_ENV),
            config.period.as_millis() as u64,
        )?;
        config.period = Duration::from_millis(period_ms);

        if let Some(raw) = lookup(LOG_SINK_MAX_BUFFER_ENV) {
            config.max_buffered_events = Some(parse_or(LOG_SINK_MAX_BUFFER_ENV, Some(raw), 0)?);
        }

        let shutdown_ms = parse_or(
            LOG_SINK_SHUTDOWN_TIMEOUT_MS_ENV,
            lookup(LOG_SINK_SHUTDOWN_TIMEOUT_MS_ENV),
            config.shutdown_timeout.as_millis() as u64,
        )?;
        config.shutdown_timeout = Duration::from_millis(shutdown_ms);

        config.validate()?;
        Ok(config)
    }
}

/// Validate the store location and return the address writes go to.
///
/// Fails when the list is empty, its first entry is blank, or the
/// collection name is blank.
pub fn validate_target<'a, S: AsRef<str>>(servers: &'a [S], collection: &str) -> Result<&'a str, ConfigError> {
    let first = servers.first().ok_or(ConfigError::NoServers)?.as_ref();
    if first.trim().is_empty() {
        return Err(ConfigError::BlankServerAddress);
    }
    if collection.trim().is_empty() {
        return Err(ConfigError::MissingCollection);
    }
    Ok(first.trim())
}

/// Invalid construction parameters. Raised synchronously, never retried.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one server address is required")]
    NoServers,

    #[error("first server address must not be blank")]
    BlankServerAddress,

    #[error("collection name must not be blank")]
    MissingCollection,

    #[error("batch posting limit must be positive")]
    ZeroBatchLimit,

    #[error("flush period must be positive")]
    ZeroPeriod,

    #[error("maximum buffered events must be positive")]
    ZeroBufferLimit,

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error(transparent)]
    Dsn(#[from] DsnError),

    #[error("failed to build store client: {0}")]
    Client(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = SinkConfig::default();
        assert_eq!(config.batch_posting_limit, 50);
        assert_eq!(config.period, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn target_validation() {
        assert_eq!(validate_target::<String>(&[], "logs"), Err(ConfigError::NoServers));
        assert_eq!(validate_target(&["", "b:1"], "logs"), Err(ConfigError::BlankServerAddress));
        assert_eq!(validate_target(&["a:1"], "  "), Err(ConfigError::MissingCollection));
        assert_eq!(validate_target(&[" a:1 ", ""], "logs"), Ok("a:1"));
    }

    #[test]
    fn rejects_zero_limits() {
        let base = SinkConfig::default();
        assert_eq!(base.clone().with_batch_posting_limit(0).validate(), Err(ConfigError::ZeroBatchLimit));
        assert_eq!(base.clone().with_period(Duration::ZERO).validate(), Err(ConfigError::ZeroPeriod));
        assert_eq!(
            base.with_max_buffered_events(0, OverflowPolicy::DropNewest).validate(),
            Err(ConfigError::ZeroBufferLimit)
        );
    }

    #[test]
    fn from_env_without_variables_keeps_defaults() {
        if std::env::vars().any(|(key, _)| key.starts_with("LOG_SINK_")) {
            return;
        }
        let config = SinkConfig::from_env().unwrap();
        assert_eq!(config.servers, SinkConfig::default().servers);
        assert_eq!(config.collection, "logs");
        assert_eq!(config.batch_posting_limit, DEFAULT_BATCH_POSTING_LIMIT);
        assert_eq!(config.period, DEFAULT_PERIOD);
    }

    #[test]
    fn lookup_reads_dsn_and_overrides() {
        let config = SinkConfig::from_lookup(lookup(&[
            (LOG_SINK_DSN_ENV, "docstore://a:9200,b:9200/events"),
            (LOG_SINK_COLLECTION_ENV, "audit"),
            (LOG_SINK_BATCH_LIMIT_ENV, "10"),
            (LOG_SINK_PERIOD_MS_ENV, "250"),
            (LOG_SINK_MAX_BUFFER_ENV, "1000"),
        ]))
        .unwrap();

        assert_eq!(config.servers, vec!["a:9200", "b:9200"]);
        assert_eq!(config.collection, "audit");
        assert_eq!(config.batch_posting_limit, 10);
        assert_eq!(config.period, Duration::from_millis(250));
        assert_eq!(config.max_buffered_events, Some(1000));
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn lookup_reports_bad_values() {
        let err = SinkConfig::from_lookup(lookup(&[(LOG_SINK_BATCH_LIMIT_ENV, "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = SinkConfig::from_lookup(lookup(&[(LOG_SINK_SERVERS_ENV, "")])).unwrap_err();
        assert_eq!(err, ConfigError::BlankServerAddress);

        let err = SinkConfig::from_lookup(lookup(&[(LOG_SINK_DSN_ENV, "ftp://x/y")])).unwrap_err();
        assert_eq!(err, ConfigError::Dsn(DsnError::UnknownScheme));
    }
}
