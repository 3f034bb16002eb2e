//! Lifecycle events decoded from log entries
//!
//! A log entry carries `event_type`, `trace_id`, `observation_id`,
//! `project_id` and a JSON `data` field. The payload stays a
//! `serde_json::Value`; the typed views below give named access to it.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::error::IngestError;
use super::tokens::{TokenUsage, extract_token_usage};
use crate::data::topics::LogEntry;
use crate::data::types::{ObservationLevel, ObservationType};
use crate::utils::time::timestamp_or_now;

/// Kind of lifecycle event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    TraceStart,
    ObservationStart,
    ObservationEnd,
    ObservationError,
    Unknown(String),
}

impl EventKind {
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "trace_start" => Self::TraceStart,
            "observation_start" => Self::ObservationStart,
            "observation_end" => Self::ObservationEnd,
            "observation_error" => Self::ObservationError,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::TraceStart => "trace_start",
            Self::ObservationStart => "observation_start",
            Self::ObservationEnd => "observation_end",
            Self::ObservationError => "observation_error",
            Self::Unknown(other) => other,
        }
    }

    /// Processing order within a batch: parents before children, creates
    /// before updates
    pub fn priority(&self) -> u8 {
        match self {
            Self::TraceStart => 0,
            Self::ObservationStart => 1,
            Self::ObservationEnd | Self::ObservationError => 2,
            Self::Unknown(_) => 99,
        }
    }
}

/// One decoded log entry
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    /// Log entry ID, used for acknowledgment
    pub entry_id: String,
    pub kind: EventKind,
    pub trace_id: Option<String>,
    pub observation_id: Option<String>,
    pub project_id: Option<String>,
    raw_data: Option<String>,
}

impl LifecycleEvent {
    pub fn from_entry(entry: &LogEntry) -> Self {
        let non_empty = |name: &str| {
            entry
                .field(name)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        Self {
            entry_id: entry.id.clone(),
            kind: EventKind::parse(entry.field("event_type").unwrap_or_default()),
            trace_id: non_empty("trace_id"),
            observation_id: non_empty("observation_id"),
            project_id: non_empty("project_id"),
            raw_data: entry.field("data").map(str::to_string),
        }
    }

    /// Parse the `data` field. A missing field is an empty object.
    pub fn payload(&self) -> Result<Value, IngestError> {
        match &self.raw_data {
            Some(raw) => Ok(serde_json::from_str(raw)?),
            None => Ok(Value::Object(Map::new())),
        }
    }

    pub fn require_trace_id(&self) -> Result<&str, IngestError> {
        self.trace_id
            .as_deref()
            .ok_or(IngestError::MissingField("trace_id"))
    }

    pub fn require_observation_id(&self) -> Result<&str, IngestError> {
        self.observation_id
            .as_deref()
            .ok_or(IngestError::MissingField("observation_id"))
    }
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Present and not JSON null
fn value_field(payload: &Value, key: &str) -> Option<Value> {
    payload.get(key).filter(|v| !v.is_null()).cloned()
}

fn time_field(payload: &Value, key: &str) -> DateTime<Utc> {
    timestamp_or_now(str_field(payload, key))
}

// ============================================================================
// Typed payload views
// ============================================================================

/// `trace_start` payload
pub struct TraceStartPayload<'a>(pub &'a Value);

impl TraceStartPayload<'_> {
    pub fn name(&self) -> &str {
        str_field(self.0, "name").unwrap_or("unnamed_trace")
    }

    pub fn user_id(&self) -> Option<String> {
        str_field(self.0, "user_id").map(str::to_string)
    }

    pub fn session_id(&self) -> Option<String> {
        str_field(self.0, "session_id").map(str::to_string)
    }

    pub fn meta(&self) -> Value {
        match self.0.get("meta") {
            Some(meta @ Value::Object(_)) => meta.clone(),
            _ => Value::Object(Map::new()),
        }
    }

    /// String tags; non-string elements are dropped
    pub fn tags(&self) -> Vec<String> {
        self.0
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn input(&self) -> Option<Value> {
        value_field(self.0, "input")
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        time_field(self.0, "timestamp")
    }
}

/// `observation_start` payload
pub struct ObservationStartPayload<'a>(pub &'a Value);

impl ObservationStartPayload<'_> {
    pub fn parent_observation_id(&self) -> Option<String> {
        str_field(self.0, "parent_observation_id")
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// Declared type, SPAN when absent or unrecognized
    pub fn observation_type(&self) -> ObservationType {
        match str_field(self.0, "type") {
            Some(raw) => ObservationType::parse(raw).unwrap_or_else(|| {
                tracing::warn!(observation_type = raw, "Unknown observation type, using SPAN");
                ObservationType::Span
            }),
            None => ObservationType::Span,
        }
    }

    pub fn name(&self) -> &str {
        str_field(self.0, "name").unwrap_or("unnamed_observation")
    }

    pub fn input(&self) -> Option<Value> {
        value_field(self.0, "input")
    }

    pub fn metadata(&self) -> Option<Value> {
        value_field(self.0, "metadata")
    }

    pub fn model(&self) -> Option<String> {
        str_field(self.0, "model").map(str::to_string)
    }

    pub fn model_parameters(&self) -> Option<Value> {
        value_field(self.0, "model_parameters")
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        time_field(self.0, "start_time")
    }
}

/// `observation_end` payload
pub struct ObservationEndPayload<'a>(pub &'a Value);

impl ObservationEndPayload<'_> {
    pub fn output(&self) -> Option<Value> {
        value_field(self.0, "output")
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        time_field(self.0, "end_time")
    }

    /// Final level, DEFAULT when absent or unrecognized
    pub fn level(&self) -> ObservationLevel {
        str_field(self.0, "level")
            .and_then(ObservationLevel::parse)
            .unwrap_or_default()
    }

    /// Type override, only when present and valid
    pub fn observation_type(&self) -> Option<ObservationType> {
        str_field(self.0, "type").and_then(ObservationType::parse)
    }

    pub fn model(&self) -> Option<String> {
        str_field(self.0, "model").map(str::to_string)
    }

    pub fn completion_start_time(&self) -> Option<DateTime<Utc>> {
        str_field(self.0, "completion_start_time").map(|ts| timestamp_or_now(Some(ts)))
    }

    /// Token usage reported in (or estimated from) the output
    pub fn token_usage(&self) -> Option<TokenUsage> {
        self.0.get("output").and_then(extract_token_usage)
    }
}

/// `observation_error` payload
pub struct ObservationErrorPayload<'a>(pub &'a Value);

impl ObservationErrorPayload<'_> {
    /// `error`, falling back to `status_message`
    pub fn status_message(&self) -> Option<String> {
        str_field(self.0, "error")
            .or_else(|| str_field(self.0, "status_message"))
            .map(str::to_string)
    }

    pub fn end_time(&self) -> DateTime<Utc> {
        time_field(self.0, "end_time")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn entry(fields: &[(&str, &str)]) -> LogEntry {
        LogEntry {
            id: "1-0".to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_event_kind_priority() {
        assert_eq!(EventKind::parse("trace_start").priority(), 0);
        assert_eq!(EventKind::parse("observation_start").priority(), 1);
        assert_eq!(EventKind::parse("observation_end").priority(), 2);
        assert_eq!(EventKind::parse("observation_error").priority(), 2);
        assert_eq!(EventKind::parse("span_update").priority(), 99);
        assert_eq!(EventKind::parse("span_update").as_str(), "span_update");
    }

    #[test]
    fn test_from_entry_reads_top_level_fields() {
        let event = LifecycleEvent::from_entry(&entry(&[
            ("event_type", "trace_start"),
            ("trace_id", "t1"),
            ("project_id", "acme"),
            ("data", r#"{"name":"checkout"}"#),
        ]));
        assert_eq!(event.kind, EventKind::TraceStart);
        assert_eq!(event.trace_id.as_deref(), Some("t1"));
        assert_eq!(event.project_id.as_deref(), Some("acme"));
        assert!(event.observation_id.is_none());
        assert_eq!(event.payload().unwrap()["name"], "checkout");
        assert!(matches!(
            event.require_observation_id(),
            Err(IngestError::MissingField("observation_id"))
        ));
    }

    #[test]
    fn test_missing_data_is_empty_object() {
        let event = LifecycleEvent::from_entry(&entry(&[("event_type", "trace_start")]));
        assert_eq!(event.payload().unwrap(), json!({}));
    }

    #[test]
    fn test_invalid_data_is_decode_error() {
        let event = LifecycleEvent::from_entry(&entry(&[
            ("event_type", "trace_start"),
            ("data", "{not json"),
        ]));
        assert!(matches!(event.payload(), Err(IngestError::Decode(_))));
    }

    #[test]
    fn test_missing_event_type_is_unknown() {
        let event = LifecycleEvent::from_entry(&entry(&[("trace_id", "t1")]));
        assert_eq!(event.kind, EventKind::Unknown(String::new()));
    }

    #[test]
    fn test_trace_start_defaults() {
        let payload = json!({"meta": "not an object", "tags": ["a", 1, "b"]});
        let view = TraceStartPayload(&payload);
        assert_eq!(view.name(), "unnamed_trace");
        assert_eq!(view.meta(), json!({}));
        assert_eq!(view.tags(), vec!["a".to_string(), "b".to_string()]);
        assert!(view.input().is_none());
    }

    #[test]
    fn test_observation_start_type_fallback() {
        let payload = json!({"type": "generation"});
        assert_eq!(
            ObservationStartPayload(&payload).observation_type(),
            ObservationType::Generation
        );
        let payload = json!({"type": "WIDGET"});
        assert_eq!(
            ObservationStartPayload(&payload).observation_type(),
            ObservationType::Span
        );
        let payload = json!({});
        assert_eq!(ObservationStartPayload(&payload).name(), "unnamed_observation");
    }

    #[test]
    fn test_observation_end_overrides() {
        let payload = json!({"level": "WARNING", "type": "TOOL", "output": null});
        let view = ObservationEndPayload(&payload);
        assert_eq!(view.level(), ObservationLevel::Warning);
        assert_eq!(view.observation_type(), Some(ObservationType::Tool));
        assert!(view.output().is_none());

        let payload = json!({"level": "LOUD", "type": "WIDGET"});
        let view = ObservationEndPayload(&payload);
        assert_eq!(view.level(), ObservationLevel::Default);
        assert_eq!(view.observation_type(), None);
    }

    #[test]
    fn test_error_message_precedence() {
        let payload = json!({"error": "boom", "status_message": "ignored"});
        assert_eq!(
            ObservationErrorPayload(&payload).status_message().as_deref(),
            Some("boom")
        );
        let payload = json!({"status_message": "timeout"});
        assert_eq!(
            ObservationErrorPayload(&payload).status_message().as_deref(),
            Some("timeout")
        );
    }
}
