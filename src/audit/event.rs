//! Audit event schema and types.
//!
//! The serialized form of [`AuditEvent`] is a flat JSON object whose field
//! names are a fixed contract with downstream consumers. Optional fields that
//! are unset are omitted rather than written as `null`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::CacheType;

/// Lifecycle status of a request, also used as the event type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// The request was received and accepted for processing.
    Acknowledged,
    /// The request completed and returned data.
    Success,
    /// The query is still running; the client was told to poll again.
    ContinueWait,
    /// The request failed.
    Error,
}

impl RequestStatus {
    /// Returns the wire tag for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Acknowledged => "acknowledged",
            RequestStatus::Success => "success",
            RequestStatus::ContinueWait => "continue_wait",
            RequestStatus::Error => "error",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// When the request started and how long it took.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    /// Wall-clock start of the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    /// Elapsed time in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl Timing {
    /// Creates timing facts from a start time and a duration in milliseconds.
    pub fn new(start_time: DateTime<Utc>, duration_ms: u64) -> Self {
        Self {
            start_time: Some(start_time),
            duration: Some(duration_ms),
        }
    }
}

/// Facts recorded only for successfully served requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuccessDetails {
    /// Shape of the query (regular, blending, compare-date-range, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<String>,
    /// Number of queries executed for the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_count: Option<u32>,
    /// Number of those queries that used a pre-aggregation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_with_pre_aggregations: Option<u32>,
    /// Tier that produced the result.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_type: Option<CacheType>,
    /// Data source the query ran against.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    /// Type of the underlying database.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_type: Option<String>,
    /// Type of the external store, when one is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ext_db_type: Option<String>,
    /// Whether execution ran against the external store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external: Option<bool>,
    /// When the backing data was last refreshed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_refresh_time: Option<DateTime<Utc>>,
    /// Whether the query was flagged as slow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_query: Option<bool>,
}

/// Caller-supplied description of one request lifecycle transition.
///
/// The request handler fills this in; the publisher wraps it in an
/// [`AuditEvent`] and never modifies it. Unset optional groups contribute no
/// fields to the serialized event.
///
/// # Example
///
/// ```
/// use request_audit::audit::{AuditData, RequestStatus, SuccessDetails};
/// use request_audit::CacheType;
/// use serde_json::json;
///
/// let data = AuditData::new("req-1", "rest", RequestStatus::Success)
///     .with_query(json!({ "measures": ["orders.count"] }))
///     .with_success(SuccessDetails {
///         cache_type: Some(CacheType::InMemoryCache),
///         query_count: Some(1),
///         ..Default::default()
///     });
///
/// assert_eq!(data.request_id, "req-1");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditData {
    /// Correlates every event emitted for the same request.
    pub request_id: String,
    /// API surface that served the request (`rest`, `sql`, `graphql`, ...).
    pub api_type: String,
    /// The query as received; opaque to this crate.
    #[serde(default)]
    pub query: Value,
    /// Whether the request originated from the playground.
    #[serde(default)]
    pub is_playground: bool,
    /// Security/tenant context; opaque to this crate.
    #[serde(default)]
    pub security_context: Value,
    /// Lifecycle status being reported.
    pub status: RequestStatus,
    /// Timing facts.
    #[serde(flatten)]
    pub timing: Option<Timing>,
    /// Success facts.
    #[serde(flatten)]
    pub success: Option<SuccessDetails>,
    /// Error description, for failed requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditData {
    /// Creates audit data with the required fields.
    pub fn new(
        request_id: impl Into<String>,
        api_type: impl Into<String>,
        status: RequestStatus,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            api_type: api_type.into(),
            query: Value::Null,
            is_playground: false,
            security_context: Value::Null,
            status,
            timing: None,
            success: None,
            error: None,
        }
    }

    /// Sets the query payload.
    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    /// Marks the request as originating from the playground.
    pub fn with_playground(mut self, is_playground: bool) -> Self {
        self.is_playground = is_playground;
        self
    }

    /// Sets the security context.
    pub fn with_security_context(mut self, security_context: Value) -> Self {
        self.security_context = security_context;
        self
    }

    /// Sets the timing facts.
    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Sets the success facts.
    pub fn with_success(mut self, success: SuccessDetails) -> Self {
        self.success = Some(success);
        self
    }

    /// Sets the error description.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// One immutable audit record, ready to be serialized and published.
///
/// Identifier and creation timestamp are assigned when the event is built,
/// which happens at publish time. Downstream consumers correlate events with
/// `request_id` plus `event_type`, not with `event_created_at`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    event_id: Uuid,
    event_type: RequestStatus,
    #[serde(serialize_with = "serialize_iso_millis")]
    event_created_at: DateTime<Utc>,
    #[serde(flatten)]
    data: AuditData,
}

impl AuditEvent {
    /// Wraps `data` in a new event with a fresh id and the current time.
    pub fn new(data: AuditData, event_type: RequestStatus) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            event_created_at: Utc::now(),
            data,
        }
    }

    /// Returns the unique event identifier.
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// Returns the event type tag.
    pub fn event_type(&self) -> RequestStatus {
        self.event_type
    }

    /// Returns when the event was created.
    pub fn event_created_at(&self) -> DateTime<Utc> {
        self.event_created_at
    }

    /// Returns the request identifier.
    pub fn request_id(&self) -> &str {
        &self.data.request_id
    }

    /// Returns the caller-supplied data.
    pub fn data(&self) -> &AuditData {
        &self.data
    }

    /// Serializes the event to its JSON wire form.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AuditEvent[event_id={}, event_type={}, request_id={}, api_type={}]",
            self.event_id, self.event_type, self.data.request_id, self.data.api_type
        )
    }
}

// Matches JavaScript's `Date.prototype.toISOString`, e.g. `2024-05-01T12:00:00.123Z`.
fn serialize_iso_millis<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn success_data() -> AuditData {
        AuditData::new("req-123", "rest", RequestStatus::Success)
            .with_query(json!({ "measures": ["orders.count"] }))
            .with_security_context(json!({ "tenant": "acme" }))
            .with_timing(Timing::new(
                Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
                250,
            ))
            .with_success(SuccessDetails {
                query_type: Some("regular_query".to_string()),
                query_count: Some(1),
                query_with_pre_aggregations: Some(1),
                cache_type: Some(CacheType::PreAggregationsExternalStore),
                data_source: Some("default".to_string()),
                db_type: Some("postgres".to_string()),
                ext_db_type: Some("cubestore".to_string()),
                external: Some(true),
                last_refresh_time: None,
                slow_query: Some(false),
            })
    }

    #[test]
    fn request_status_display() {
        assert_eq!(RequestStatus::Acknowledged.to_string(), "acknowledged");
        assert_eq!(RequestStatus::ContinueWait.to_string(), "continue_wait");
        assert_eq!(
            serde_json::to_value(RequestStatus::ContinueWait).unwrap(),
            json!("continue_wait")
        );
    }

    #[test]
    fn event_serializes_flat() {
        let event = AuditEvent::new(success_data(), RequestStatus::Success);
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["event_type"], "success");
        assert_eq!(value["request_id"], "req-123");
        assert_eq!(value["api_type"], "rest");
        assert_eq!(value["status"], "success");
        assert_eq!(value["duration"], 250);
        assert_eq!(value["start_time"], "2024-05-01T12:00:00Z");
        assert_eq!(value["cache_type"], "pre_aggregations_external_store");
        assert_eq!(value["external"], true);
        assert_eq!(value["security_context"]["tenant"], "acme");
        assert_eq!(value["is_playground"], false);
        assert!(value.get("timing").is_none());
        assert!(value.get("success").is_none());
        assert!(value.get("data").is_none());
    }

    #[test]
    fn unset_optionals_are_omitted() {
        let data = AuditData::new("req-1", "sql", RequestStatus::Acknowledged);
        let value = serde_json::to_value(AuditEvent::new(data, RequestStatus::Acknowledged)).unwrap();
        let object = value.as_object().unwrap();

        for absent in ["start_time", "duration", "cache_type", "slow_query", "error"] {
            assert!(!object.contains_key(absent), "{} should be omitted", absent);
        }
        assert!(object.contains_key("query"));
        assert!(object.contains_key("security_context"));
    }

    #[test]
    fn error_field_serialized() {
        let data = AuditData::new("req-9", "rest", RequestStatus::Error).with_error("boom");
        let value = serde_json::to_value(AuditEvent::new(data, RequestStatus::Error)).unwrap();
        assert_eq!(value["error"], "boom");
        assert_eq!(value["event_type"], "error");
    }

    #[test]
    fn created_at_has_millisecond_precision() {
        let event = AuditEvent::new(success_data(), RequestStatus::Success);
        let value = serde_json::to_value(&event).unwrap();
        let created_at = value["event_created_at"].as_str().unwrap();

        // YYYY-MM-DDTHH:MM:SS.mmmZ
        assert_eq!(created_at.len(), 24);
        assert!(created_at.ends_with('Z'));
        assert_eq!(&created_at[19..20], ".");
    }

    #[test]
    fn each_event_gets_a_fresh_id() {
        let first = AuditEvent::new(success_data(), RequestStatus::Success);
        let second = AuditEvent::new(success_data(), RequestStatus::Success);
        assert_ne!(first.event_id(), second.event_id());
        assert_eq!(first.request_id(), second.request_id());
    }

    #[test]
    fn data_deserializes_from_flat_bag() {
        let data: AuditData = serde_json::from_value(json!({
            "request_id": "req-7",
            "api_type": "graphql",
            "status": "continue_wait",
            "duration": 12,
            "cache_type": "no_cache",
        }))
        .unwrap();

        assert_eq!(data.status, RequestStatus::ContinueWait);
        assert_eq!(data.timing.as_ref().and_then(|t| t.duration), Some(12));
        assert_eq!(
            data.success.as_ref().and_then(|s| s.cache_type),
            Some(CacheType::NoCache)
        );
        assert_eq!(data.query, Value::Null);
    }

    #[test]
    fn data_requires_request_id() {
        let result = serde_json::from_value::<AuditData>(json!({
            "api_type": "rest",
            "status": "success",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn display_contains_correlation_fields() {
        let event = AuditEvent::new(success_data(), RequestStatus::Success);
        let display = event.to_string();
        assert!(display.contains("req-123"));
        assert!(display.contains("event_type=success"));
    }
}
