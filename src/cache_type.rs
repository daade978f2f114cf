//! Cache-tier classification for served query results.
//!
//! Every query answered by the API layer was produced by exactly one of five
//! paths: the in-process cache, the persistent cache, a pre-aggregation served
//! from the external store, a pre-aggregation served from the data source, or
//! the cold path against raw data. [`classify`] reduces the orchestrator's
//! execution facts to one [`CacheType`] label.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// How a query result was produced.
///
/// Closed set; exactly one value per classification. The serialized form is
/// the snake_case label, which is also what [`CacheType::as_str`] returns and
/// what metrics and audit events carry.
///
/// # Examples
///
/// ```
/// use request_audit::CacheType;
///
/// assert_eq!(CacheType::InMemoryCache.as_str(), "in_memory_cache");
/// assert_eq!(CacheType::NoCache.to_string(), "no_cache");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    /// Served from a pre-aggregation held in the external accelerated store.
    PreAggregationsExternalStore,
    /// Served from a pre-aggregation materialized in the upstream data source.
    PreAggregationsDataSource,
    /// Served from the process-local in-memory result cache.
    InMemoryCache,
    /// Served from the persistent cache layer after an in-memory miss.
    PersistentCache,
    /// Computed against the data source without any acceleration.
    NoCache,
}

impl CacheType {
    /// All labels, in classification priority order.
    pub const ALL: [CacheType; 5] = [
        CacheType::InMemoryCache,
        CacheType::PersistentCache,
        CacheType::PreAggregationsExternalStore,
        CacheType::PreAggregationsDataSource,
        CacheType::NoCache,
    ];

    /// Returns the wire label for this cache type.
    pub fn as_str(self) -> &'static str {
        match self {
            CacheType::PreAggregationsExternalStore => "pre_aggregations_external_store",
            CacheType::PreAggregationsDataSource => "pre_aggregations_data_source",
            CacheType::InMemoryCache => "in_memory_cache",
            CacheType::PersistentCache => "persistent_cache",
            CacheType::NoCache => "no_cache",
        }
    }

    /// Returns `true` if the result was served from either cache layer.
    pub fn is_cache_hit(self) -> bool {
        matches!(self, CacheType::InMemoryCache | CacheType::PersistentCache)
    }
}

impl fmt::Display for CacheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution facts needed to classify one query result.
///
/// Built by the caller from whatever the orchestrator reports for a completed
/// query. Every field defaults to false/empty, and the struct deserializes
/// from the orchestrator's camelCase fact object with any subset of fields.
/// Explicit `null`s read as false/empty.
///
/// # Examples
///
/// ```
/// use request_audit::{classify, CacheType, ClassificationInput};
///
/// let input: ClassificationInput = serde_json::from_str(
///     r#"{"usedPreAggregations": {"orders_rollup": {}}, "external": true}"#,
/// )
/// .unwrap();
///
/// assert_eq!(classify(&input), CacheType::PreAggregationsExternalStore);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClassificationInput {
    /// Pre-aggregations that took part in answering the query.
    ///
    /// Only non-emptiness matters for classification.
    #[serde(deserialize_with = "null_as_default")]
    pub used_pre_aggregations: HashMap<String, Value>,
    /// Whether execution ran against the external accelerated store.
    #[serde(deserialize_with = "null_as_default")]
    pub external: bool,
    /// Whether the result came from any cache layer.
    #[serde(deserialize_with = "null_as_default")]
    pub from_cache: bool,
    /// Whether the result came from the in-memory cache specifically.
    #[serde(deserialize_with = "null_as_default")]
    pub from_in_memory_cache: bool,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl ClassificationInput {
    /// Creates an input with every fact unset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one pre-aggregation as used.
    pub fn with_pre_aggregation(mut self, name: impl Into<String>, details: Value) -> Self {
        self.used_pre_aggregations.insert(name.into(), details);
        self
    }

    /// Sets whether execution ran against the external store.
    pub fn with_external(mut self, external: bool) -> Self {
        self.external = external;
        self
    }

    /// Sets whether the result came from any cache layer.
    pub fn with_from_cache(mut self, from_cache: bool) -> Self {
        self.from_cache = from_cache;
        self
    }

    /// Sets whether the result came from the in-memory cache.
    pub fn with_from_in_memory_cache(mut self, from_in_memory_cache: bool) -> Self {
        self.from_in_memory_cache = from_in_memory_cache;
        self
    }

    /// Returns `true` if at least one pre-aggregation was used.
    pub fn used_any_pre_aggregation(&self) -> bool {
        !self.used_pre_aggregations.is_empty()
    }

    /// Classifies these facts. Shorthand for [`classify`].
    pub fn classify(&self) -> CacheType {
        classify(self)
    }
}

/// Determines which tier produced a query result.
///
/// First match wins:
///
/// 1. in-memory cache hit → [`CacheType::InMemoryCache`]
/// 2. any other cache hit → [`CacheType::PersistentCache`]
/// 3. pre-aggregation used on the external store → [`CacheType::PreAggregationsExternalStore`]
/// 4. pre-aggregation used → [`CacheType::PreAggregationsDataSource`]
/// 5. otherwise → [`CacheType::NoCache`]
///
/// Cache hits win over pre-aggregation usage since a pre-aggregated result
/// can itself be cached.
///
/// # Examples
///
/// ```
/// use request_audit::{classify, CacheType, ClassificationInput};
/// use serde_json::json;
///
/// let input = ClassificationInput::new()
///     .with_from_in_memory_cache(true)
///     .with_external(true)
///     .with_pre_aggregation("a", json!(1));
///
/// assert_eq!(classify(&input), CacheType::InMemoryCache);
/// ```
pub fn classify(input: &ClassificationInput) -> CacheType {
    if input.from_in_memory_cache {
        return CacheType::InMemoryCache;
    }

    if input.from_cache {
        return CacheType::PersistentCache;
    }

    match (input.used_any_pre_aggregation(), input.external) {
        (true, true) => CacheType::PreAggregationsExternalStore,
        (true, false) => CacheType::PreAggregationsDataSource,
        (false, _) => CacheType::NoCache,
    }
}
