//! Store writes for each lifecycle event kind

use std::sync::Arc;

use chrono::Utc;

use super::error::IngestError;
use super::event::{
    EventKind, LifecycleEvent, ObservationEndPayload, ObservationErrorPayload,
    ObservationStartPayload, TraceStartPayload,
};
use crate::data::traits::{IngestStore, IngestTx};
use crate::data::types::{Observation, ObservationLevel, Trace};
use crate::domain::pricing::CostCalculator;

/// Applies decoded events to an open transaction
#[derive(Clone)]
pub struct EventHandlers {
    store: Arc<dyn IngestStore>,
    calculator: CostCalculator,
    default_project_id: String,
}

impl EventHandlers {
    pub fn new(
        store: Arc<dyn IngestStore>,
        calculator: CostCalculator,
        default_project_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            calculator,
            default_project_id: default_project_id.into(),
        }
    }

    /// Apply one event. Unknown kinds are a no-op.
    pub async fn handle(
        &self,
        tx: &mut dyn IngestTx,
        event: &LifecycleEvent,
    ) -> Result<(), IngestError> {
        match &event.kind {
            EventKind::TraceStart => self.trace_start(tx, event).await,
            EventKind::ObservationStart => self.observation_start(tx, event).await,
            EventKind::ObservationEnd => self.observation_end(tx, event).await,
            EventKind::ObservationError => self.observation_error(tx, event).await,
            EventKind::Unknown(_) => Ok(()),
        }
    }

    async fn trace_start(
        &self,
        tx: &mut dyn IngestTx,
        event: &LifecycleEvent,
    ) -> Result<(), IngestError> {
        let trace_id = event.require_trace_id()?;
        let data = event.payload()?;
        let payload = TraceStartPayload(&data);

        let trace = Trace {
            id: trace_id.to_string(),
            project_id: event
                .project_id
                .clone()
                .unwrap_or_else(|| self.default_project_id.clone()),
            name: payload.name().to_string(),
            user_id: payload.user_id(),
            session_id: payload.session_id(),
            meta: payload.meta(),
            tags: payload.tags(),
            input: payload.input(),
            output: None,
            timestamp: payload.timestamp(),
            created_at: Utc::now(),
        };

        let inserted = tx.insert_trace(&trace).await?;
        tracing::debug!(
            trace_id,
            project_id = %trace.project_id,
            inserted,
            "Handled trace_start"
        );
        Ok(())
    }

    async fn observation_start(
        &self,
        tx: &mut dyn IngestTx,
        event: &LifecycleEvent,
    ) -> Result<(), IngestError> {
        let trace_id = event.require_trace_id()?;
        let observation_id = event.require_observation_id()?;
        let data = event.payload()?;
        let payload = ObservationStartPayload(&data);

        let mut observation = Observation::new(
            observation_id,
            trace_id,
            payload.observation_type(),
            payload.name(),
            payload.start_time(),
        );
        observation.parent_observation_id = payload.parent_observation_id();
        observation.input = payload.input();
        observation.metadata = payload.metadata();
        observation.model = payload.model();
        observation.model_parameters = payload.model_parameters();

        let inserted = tx.insert_observation(&observation).await?;
        tracing::debug!(
            trace_id,
            observation_id,
            observation_type = %observation.observation_type,
            inserted,
            "Handled observation_start"
        );
        Ok(())
    }

    async fn observation_end(
        &self,
        tx: &mut dyn IngestTx,
        event: &LifecycleEvent,
    ) -> Result<(), IngestError> {
        let observation_id = event.require_observation_id()?;
        let data = event.payload()?;
        let payload = ObservationEndPayload(&data);

        let mut observation = tx
            .get_observation(observation_id)
            .await?
            .ok_or_else(|| IngestError::ObservationNotFound(observation_id.to_string()))?;

        observation.output = payload.output();
        observation.end_time = Some(payload.end_time());
        observation.level = payload.level();
        if let Some(observation_type) = payload.observation_type() {
            observation.observation_type = observation_type;
        }
        if let Some(completion_start) = payload.completion_start_time() {
            observation.completion_start_time = Some(completion_start);
        }
        if let Some(model) = payload.model() {
            observation.model = Some(model);
        }

        if let Some(usage) = payload.token_usage() {
            observation.prompt_tokens = Some(usage.prompt);
            observation.completion_tokens = Some(usage.completion);
            observation.total_tokens = Some(usage.total);
            observation.tokens_estimated = usage.estimated;
        }
        self.enrich_cost(&mut observation).await;

        tx.update_observation(&observation).await?;
        tracing::debug!(
            trace_id = %observation.trace_id,
            observation_id,
            total_tokens = ?observation.total_tokens,
            total_cost = ?observation.calculated_total_cost,
            "Handled observation_end"
        );
        Ok(())
    }

    async fn observation_error(
        &self,
        tx: &mut dyn IngestTx,
        event: &LifecycleEvent,
    ) -> Result<(), IngestError> {
        let observation_id = event.require_observation_id()?;
        let data = event.payload()?;
        let payload = ObservationErrorPayload(&data);

        let mut observation = tx
            .get_observation(observation_id)
            .await?
            .ok_or_else(|| IngestError::ObservationNotFound(observation_id.to_string()))?;

        observation.level = ObservationLevel::Error;
        observation.status_message = payload.status_message();
        observation.end_time = Some(payload.end_time());

        tx.update_observation(&observation).await?;
        tracing::debug!(
            trace_id = %observation.trace_id,
            observation_id,
            "Handled observation_error"
        );
        Ok(())
    }

    /// Fill in calculated costs. Never fails the event.
    async fn enrich_cost(&self, observation: &mut Observation) {
        let (Some(model), Some(prompt), Some(completion)) = (
            observation.model.as_deref(),
            observation.prompt_tokens,
            observation.completion_tokens,
        ) else {
            return;
        };

        let project_id = match self.store.trace_project_id(&observation.trace_id).await {
            Ok(Some(project_id)) => project_id,
            Ok(None) => {
                tracing::warn!(
                    trace_id = %observation.trace_id,
                    observation_id = %observation.id,
                    "Trace not found for cost calculation"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    observation_id = %observation.id,
                    "Failed to resolve project for cost calculation"
                );
                return;
            }
        };

        match self
            .calculator
            .calculate(&project_id, model, prompt, completion)
            .await
        {
            Ok(Some(cost)) => {
                observation.calculated_input_cost = Some(cost.input_cost);
                observation.calculated_output_cost = Some(cost.output_cost);
                observation.calculated_total_cost = Some(cost.total_cost);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    observation_id = %observation.id,
                    model,
                    "Cost calculation failed"
                );
            }
        }
    }
}
