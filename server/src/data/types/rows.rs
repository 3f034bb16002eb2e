//! Persisted entity rows (traces, observations, pricing)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::{ObservationLevel, ObservationType};
use crate::utils::time::duration_ms;

/// One workflow invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub meta: Value,
    pub tags: Vec<String>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A single step within a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: String,
    pub trace_id: String,
    pub parent_observation_id: Option<String>,
    #[serde(rename = "type")]
    pub observation_type: ObservationType,
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub completion_start_time: Option<DateTime<Utc>>,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub metadata: Option<Value>,
    pub model: Option<String>,
    pub model_parameters: Option<Value>,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
    /// Token counts came from the word-count estimator
    pub tokens_estimated: bool,
    pub calculated_input_cost: Option<Decimal>,
    pub calculated_output_cost: Option<Decimal>,
    pub calculated_total_cost: Option<Decimal>,
    pub level: ObservationLevel,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Observation {
    /// Create an unterminated observation with default level and no usage data
    pub fn new(
        id: impl Into<String>,
        trace_id: impl Into<String>,
        observation_type: ObservationType,
        name: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            trace_id: trace_id.into(),
            parent_observation_id: None,
            observation_type,
            name: name.into(),
            start_time,
            end_time: None,
            completion_start_time: None,
            input: None,
            output: None,
            metadata: None,
            model: None,
            model_parameters: None,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            tokens_estimated: false,
            calculated_input_cost: None,
            calculated_output_cost: None,
            calculated_total_cost: None,
            level: ObservationLevel::Default,
            status_message: None,
            created_at: Utc::now(),
        }
    }

    /// Own latency in fractional milliseconds, `None` while unterminated
    pub fn latency_ms(&self) -> Option<f64> {
        self.end_time.map(|end| duration_ms(self.start_time, end))
    }
}

/// Price of one model on one hosting provider, scoped to a project or global
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub id: String,
    /// `None` for the global default row
    pub project_id: Option<String>,
    pub hosting_provider: String,
    pub model_name: String,
    pub input_price_per_million: Decimal,
    pub output_price_per_million: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_latency_ms() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut obs = Observation::new("o1", "t1", ObservationType::Span, "step", start);
        assert_eq!(obs.latency_ms(), None);

        obs.end_time = Some(start + chrono::Duration::milliseconds(1250));
        assert_eq!(obs.latency_ms(), Some(1250.0));

        obs.end_time = Some(start + chrono::Duration::microseconds(400));
        assert_eq!(obs.latency_ms(), Some(0.4));
    }

    #[test]
    fn test_observation_serializes_type_field() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let obs = Observation::new("o1", "t1", ObservationType::Generation, "llm", start);
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["type"], "GENERATION");
        assert_eq!(json["level"], "DEFAULT");
    }
}
