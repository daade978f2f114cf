//! Publisher configuration.
//!
//! Configuration is read once when the publisher is created. A missing
//! project id or topic disables auditing for the lifetime of the process.

use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding the sink project id.
pub const PROJECT_ID_VAR: &str = "REQUEST_AUDIT_PUBSUB_PROJECT_ID";
/// Environment variable holding the destination topic.
pub const TOPIC_VAR: &str = "REQUEST_AUDIT_PUBSUB_TOPIC";
/// Environment variable holding the maximum batch size in bytes.
pub const MAX_BATCH_BYTES_VAR: &str = "REQUEST_AUDIT_PUBSUB_MAX_BATCH_BYTES";
/// Environment variable holding the maximum number of events per batch.
pub const MAX_BATCH_EVENTS_VAR: &str = "REQUEST_AUDIT_PUBSUB_MAX_BATCH_EVENTS";
/// Environment variable holding the maximum batch wait in milliseconds.
pub const FLUSH_INTERVAL_MS_VAR: &str = "REQUEST_AUDIT_PUBSUB_FLUSH_INTERVAL_MS";
/// Environment variable bounding the number of queued, unsent events.
pub const QUEUE_CAPACITY_VAR: &str = "REQUEST_AUDIT_QUEUE_CAPACITY";
/// Environment variable holding the shutdown deadline in milliseconds.
pub const SHUTDOWN_TIMEOUT_MS_VAR: &str = "REQUEST_AUDIT_SHUTDOWN_TIMEOUT_MS";
/// Environment variable holding a static bearer token for the Pub/Sub REST
/// API, overriding application-default credentials.
pub const ACCESS_TOKEN_VAR: &str = "REQUEST_AUDIT_PUBSUB_ACCESS_TOKEN";
/// Environment variable pointing the transport at a Pub/Sub emulator.
pub const EMULATOR_HOST_VAR: &str = "PUBSUB_EMULATOR_HOST";

/// Default bound on queued events.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
/// Largest queue the publisher will allocate; larger settings are capped.
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;
/// Default deadline for [`AuditPublisher::close`](super::AuditPublisher::close).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Where audit events go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkTarget {
    /// Project that owns the topic.
    pub project_id: String,
    /// Topic the events are published to.
    pub topic: String,
    /// Emulator `host:port`, if events should go to a local emulator.
    pub emulator_host: Option<String>,
    /// Static bearer token. When unset, application-default credentials are
    /// used unless an emulator is configured.
    pub access_token: Option<String>,
}

/// Optional batching overrides. Unset values fall back to the transport's
/// own defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Flush once this many bytes are buffered.
    pub max_bytes: Option<usize>,
    /// Flush once this many events are buffered.
    pub max_events: Option<usize>,
    /// Flush once the oldest buffered event has waited this long.
    pub flush_interval: Option<Duration>,
}

impl BatchOptions {
    /// Returns `true` if no override is set.
    pub fn is_empty(&self) -> bool {
        self.max_bytes.is_none() && self.max_events.is_none() && self.flush_interval.is_none()
    }

    /// Fills unset values from `defaults`.
    pub fn resolve(&self, defaults: BatchSettings) -> BatchSettings {
        BatchSettings {
            max_bytes: self.max_bytes.unwrap_or(defaults.max_bytes).max(1),
            max_events: self.max_events.unwrap_or(defaults.max_events).max(1),
            flush_interval: self.flush_interval.unwrap_or(defaults.flush_interval),
        }
    }
}

/// Fully resolved batching thresholds; whichever is reached first triggers a
/// flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    /// Maximum accumulated bytes.
    pub max_bytes: usize,
    /// Maximum accumulated events.
    pub max_events: usize,
    /// Maximum time a batch may wait.
    pub flush_interval: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            max_bytes: 1024 * 1024,
            max_events: 100,
            flush_interval: Duration::from_millis(10),
        }
    }
}

/// Everything the publisher factory reads from process configuration.
///
/// # Examples
///
/// ```
/// use request_audit::audit::PublisherConfig;
///
/// let config = PublisherConfig::from_lookup(|key| match key {
///     "REQUEST_AUDIT_PUBSUB_PROJECT_ID" => Some("analytics".to_string()),
///     "REQUEST_AUDIT_PUBSUB_MAX_BATCH_EVENTS" => Some("50".to_string()),
///     _ => None,
/// });
///
/// // No topic configured: auditing stays off.
/// assert!(config.target().is_none());
/// assert_eq!(config.batch.max_events, Some(50));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Sink project id.
    pub project_id: Option<String>,
    /// Destination topic.
    pub topic: Option<String>,
    /// Batching overrides.
    pub batch: BatchOptions,
    /// Bound on queued, unsent events. Newest events are dropped past it.
    pub queue_capacity: usize,
    /// Deadline for flushing during shutdown.
    pub shutdown_timeout: Duration,
    /// Emulator `host:port`.
    pub emulator_host: Option<String>,
    /// Static bearer token. When unset, application-default credentials are
    /// used unless an emulator is configured.
    pub access_token: Option<String>,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            topic: None,
            batch: BatchOptions::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            emulator_host: None,
            access_token: None,
        }
    }
}

impl PublisherConfig {
    /// Creates a configuration targeting `project_id`/`topic` with default
    /// batching.
    pub fn new(project_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            topic: Some(topic.into()),
            ..Self::default()
        }
    }

    /// Sets the batching overrides.
    pub fn with_batch(mut self, batch: BatchOptions) -> Self {
        self.batch = batch;
        self
    }

    /// Sets the queue bound.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the shutdown deadline.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value. Empty values count as absent; numeric values that fail
    /// to parse are logged and ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            project_id: get(PROJECT_ID_VAR),
            topic: get(TOPIC_VAR),
            batch: BatchOptions {
                max_bytes: parse_var(MAX_BATCH_BYTES_VAR, get(MAX_BATCH_BYTES_VAR)),
                max_events: parse_var(MAX_BATCH_EVENTS_VAR, get(MAX_BATCH_EVENTS_VAR)),
                flush_interval: parse_var::<u64>(FLUSH_INTERVAL_MS_VAR, get(FLUSH_INTERVAL_MS_VAR))
                    .map(Duration::from_millis),
            },
            queue_capacity: parse_var(QUEUE_CAPACITY_VAR, get(QUEUE_CAPACITY_VAR))
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            shutdown_timeout: parse_var::<u64>(SHUTDOWN_TIMEOUT_MS_VAR, get(SHUTDOWN_TIMEOUT_MS_VAR))
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
            emulator_host: get(EMULATOR_HOST_VAR),
            access_token: get(ACCESS_TOKEN_VAR),
        }
    }

    /// Returns the queue bound actually used, clamped to
    /// `1..=`[`MAX_QUEUE_CAPACITY`].
    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.clamp(1, MAX_QUEUE_CAPACITY)
    }

    /// Returns the sink target, or `None` when either the project id or the
    /// topic is missing.
    pub fn target(&self) -> Option<SinkTarget> {
        match (&self.project_id, &self.topic) {
            (Some(project_id), Some(topic)) => Some(SinkTarget {
                project_id: project_id.clone(),
                topic: topic.clone(),
                emulator_host: self.emulator_host.clone(),
                access_token: self.access_token.clone(),
            }),
            _ => None,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: Option<String>) -> Option<T> {
    let value = value?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!(
                target: "request_audit",
                variable = key,
                value = %value,
                "ignoring unparseable request audit setting"
            );
            None
        }
    }
}
