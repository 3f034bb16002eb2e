//! `IngestStore` implementation for PostgreSQL

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Postgres, Row, Transaction};

use super::PostgresService;
use crate::data::error::DataError;
use crate::data::traits::{IngestStore, IngestTx};
use crate::data::types::{ModelPricing, Observation, ObservationLevel, ObservationType, Trace};

const TRACE_COLUMNS: &str = "id, project_id, name, user_id, session_id, meta, tags, input, output, timestamp, created_at";

const OBSERVATION_COLUMNS: &str = "id, trace_id, parent_observation_id, type, name, start_time, end_time, \
     completion_start_time, input, output, metadata, model, model_parameters, prompt_tokens, \
     completion_tokens, total_tokens, tokens_estimated, calculated_input_cost, \
     calculated_output_cost, calculated_total_cost, level, status_message, created_at";

const PRICING_COLUMNS: &str = "id, project_id, hosting_provider, model_name, input_price_per_million, \
     output_price_per_million, created_at, updated_at";

fn trace_from_row(row: &PgRow) -> Result<Trace, DataError> {
    Ok(Trace {
        id: row.try_get("id").map_err(DataError::from_postgres)?,
        project_id: row.try_get("project_id").map_err(DataError::from_postgres)?,
        name: row.try_get("name").map_err(DataError::from_postgres)?,
        user_id: row.try_get("user_id").map_err(DataError::from_postgres)?,
        session_id: row.try_get("session_id").map_err(DataError::from_postgres)?,
        meta: row.try_get("meta").map_err(DataError::from_postgres)?,
        tags: row
            .try_get::<Json<Vec<String>>, _>("tags")
            .map_err(DataError::from_postgres)?
            .0,
        input: row.try_get("input").map_err(DataError::from_postgres)?,
        output: row.try_get("output").map_err(DataError::from_postgres)?,
        timestamp: row.try_get("timestamp").map_err(DataError::from_postgres)?,
        created_at: row.try_get("created_at").map_err(DataError::from_postgres)?,
    })
}

fn observation_from_row(row: &PgRow) -> Result<Observation, DataError> {
    let type_str: String = row.try_get("type").map_err(DataError::from_postgres)?;
    let level_str: String = row.try_get("level").map_err(DataError::from_postgres)?;

    Ok(Observation {
        id: row.try_get("id").map_err(DataError::from_postgres)?,
        trace_id: row.try_get("trace_id").map_err(DataError::from_postgres)?,
        parent_observation_id: row
            .try_get("parent_observation_id")
            .map_err(DataError::from_postgres)?,
        observation_type: ObservationType::parse(&type_str)
            .ok_or_else(|| DataError::Decode(format!("unknown observation type '{}'", type_str)))?,
        name: row.try_get("name").map_err(DataError::from_postgres)?,
        start_time: row.try_get("start_time").map_err(DataError::from_postgres)?,
        end_time: row.try_get("end_time").map_err(DataError::from_postgres)?,
        completion_start_time: row
            .try_get("completion_start_time")
            .map_err(DataError::from_postgres)?,
        input: row.try_get("input").map_err(DataError::from_postgres)?,
        output: row.try_get("output").map_err(DataError::from_postgres)?,
        metadata: row.try_get("metadata").map_err(DataError::from_postgres)?,
        model: row.try_get("model").map_err(DataError::from_postgres)?,
        model_parameters: row
            .try_get("model_parameters")
            .map_err(DataError::from_postgres)?,
        prompt_tokens: row.try_get("prompt_tokens").map_err(DataError::from_postgres)?,
        completion_tokens: row
            .try_get("completion_tokens")
            .map_err(DataError::from_postgres)?,
        total_tokens: row.try_get("total_tokens").map_err(DataError::from_postgres)?,
        tokens_estimated: row
            .try_get("tokens_estimated")
            .map_err(DataError::from_postgres)?,
        calculated_input_cost: row
            .try_get("calculated_input_cost")
            .map_err(DataError::from_postgres)?,
        calculated_output_cost: row
            .try_get("calculated_output_cost")
            .map_err(DataError::from_postgres)?,
        calculated_total_cost: row
            .try_get("calculated_total_cost")
            .map_err(DataError::from_postgres)?,
        level: ObservationLevel::parse(&level_str)
            .ok_or_else(|| DataError::Decode(format!("unknown observation level '{}'", level_str)))?,
        status_message: row
            .try_get("status_message")
            .map_err(DataError::from_postgres)?,
        created_at: row.try_get("created_at").map_err(DataError::from_postgres)?,
    })
}

fn pricing_from_row(row: &PgRow) -> Result<ModelPricing, DataError> {
    Ok(ModelPricing {
        id: row.try_get("id").map_err(DataError::from_postgres)?,
        project_id: row.try_get("project_id").map_err(DataError::from_postgres)?,
        hosting_provider: row
            .try_get("hosting_provider")
            .map_err(DataError::from_postgres)?,
        model_name: row.try_get("model_name").map_err(DataError::from_postgres)?,
        input_price_per_million: row
            .try_get("input_price_per_million")
            .map_err(DataError::from_postgres)?,
        output_price_per_million: row
            .try_get("output_price_per_million")
            .map_err(DataError::from_postgres)?,
        created_at: row.try_get("created_at").map_err(DataError::from_postgres)?,
        updated_at: row.try_get("updated_at").map_err(DataError::from_postgres)?,
    })
}

/// Savepoint names are interpolated into SQL, so only identifiers are allowed
fn validate_savepoint_name(name: &str) -> Result<(), DataError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(DataError::Transaction(format!(
            "invalid savepoint name '{}'",
            name
        )))
    }
}

#[async_trait]
impl IngestStore for PostgresService {
    async fn begin(&self) -> Result<Box<dyn IngestTx>, DataError> {
        let tx = self.pool.begin().await.map_err(DataError::from_postgres)?;
        Ok(Box::new(PgIngestTx { tx }))
    }

    async fn trace_project_id(&self, trace_id: &str) -> Result<Option<String>, DataError> {
        sqlx::query_scalar("SELECT project_id FROM traces WHERE id = $1")
            .bind(trace_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DataError::from_postgres)
    }

    async fn find_pricing(
        &self,
        project_id: Option<&str>,
        hosting_provider: &str,
        model_name: &str,
    ) -> Result<Option<ModelPricing>, DataError> {
        let sql = format!(
            "SELECT {} FROM model_pricing \
             WHERE project_id IS NOT DISTINCT FROM $1 AND hosting_provider = $2 AND model_name = $3",
            PRICING_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(project_id)
            .bind(hosting_provider)
            .bind(model_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(DataError::from_postgres)?;
        row.as_ref().map(pricing_from_row).transpose()
    }

    async fn project_tracing_enabled(&self, project_id: &str) -> Result<Option<bool>, DataError> {
        sqlx::query_scalar("SELECT tracing_enabled FROM projects WHERE id = $1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DataError::from_postgres)
    }

    async fn set_project_tracing_enabled(
        &self,
        project_id: &str,
        enabled: bool,
    ) -> Result<bool, DataError> {
        let result = sqlx::query(
            "UPDATE projects SET tracing_enabled = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(project_id)
        .bind(enabled)
        .execute(&self.pool)
        .await
        .map_err(DataError::from_postgres)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_trace(&self, trace_id: &str) -> Result<Option<Trace>, DataError> {
        let sql = format!("SELECT {} FROM traces WHERE id = $1", TRACE_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(trace_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DataError::from_postgres)?;
        row.as_ref().map(trace_from_row).transpose()
    }

    async fn list_observations(&self, trace_id: &str) -> Result<Vec<Observation>, DataError> {
        let sql = format!(
            "SELECT {} FROM observations WHERE trace_id = $1 ORDER BY start_time, created_at",
            OBSERVATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(trace_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DataError::from_postgres)?;
        rows.iter().map(observation_from_row).collect()
    }

    async fn health_check(&self) -> Result<(), DataError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(DataError::from_postgres)?;
        Ok(())
    }
}

/// Open PostgreSQL transaction
pub struct PgIngestTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl IngestTx for PgIngestTx {
    async fn insert_trace(&mut self, trace: &Trace) -> Result<bool, DataError> {
        let result = sqlx::query(
            "INSERT INTO traces (id, project_id, name, user_id, session_id, meta, tags, input, output, timestamp, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&trace.id)
        .bind(&trace.project_id)
        .bind(&trace.name)
        .bind(&trace.user_id)
        .bind(&trace.session_id)
        .bind(&trace.meta)
        .bind(Json(&trace.tags))
        .bind(&trace.input)
        .bind(&trace.output)
        .bind(trace.timestamp)
        .bind(trace.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(DataError::from_postgres)?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_observation(&mut self, obs: &Observation) -> Result<bool, DataError> {
        let result = sqlx::query(
            "INSERT INTO observations (id, trace_id, parent_observation_id, type, name, start_time, end_time,
                 completion_start_time, input, output, metadata, model, model_parameters, prompt_tokens,
                 completion_tokens, total_tokens, tokens_estimated, calculated_input_cost,
                 calculated_output_cost, calculated_total_cost, level, status_message, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&obs.id)
        .bind(&obs.trace_id)
        .bind(&obs.parent_observation_id)
        .bind(obs.observation_type.as_str())
        .bind(&obs.name)
        .bind(obs.start_time)
        .bind(obs.end_time)
        .bind(obs.completion_start_time)
        .bind(&obs.input)
        .bind(&obs.output)
        .bind(&obs.metadata)
        .bind(&obs.model)
        .bind(&obs.model_parameters)
        .bind(obs.prompt_tokens)
        .bind(obs.completion_tokens)
        .bind(obs.total_tokens)
        .bind(obs.tokens_estimated)
        .bind(obs.calculated_input_cost)
        .bind(obs.calculated_output_cost)
        .bind(obs.calculated_total_cost)
        .bind(obs.level.as_str())
        .bind(&obs.status_message)
        .bind(obs.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(DataError::from_postgres)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_observation(&mut self, id: &str) -> Result<Option<Observation>, DataError> {
        let sql = format!(
            "SELECT {} FROM observations WHERE id = $1 FOR UPDATE",
            OBSERVATION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(DataError::from_postgres)?;
        row.as_ref().map(observation_from_row).transpose()
    }

    async fn update_observation(&mut self, obs: &Observation) -> Result<(), DataError> {
        let result = sqlx::query(
            "UPDATE observations SET
                 type = $2, name = $3, end_time = $4, completion_start_time = $5, output = $6,
                 model = $7, prompt_tokens = $8, completion_tokens = $9, total_tokens = $10,
                 tokens_estimated = $11, calculated_input_cost = $12, calculated_output_cost = $13,
                 calculated_total_cost = $14, level = $15, status_message = $16
             WHERE id = $1",
        )
        .bind(&obs.id)
        .bind(obs.observation_type.as_str())
        .bind(&obs.name)
        .bind(obs.end_time)
        .bind(obs.completion_start_time)
        .bind(&obs.output)
        .bind(&obs.model)
        .bind(obs.prompt_tokens)
        .bind(obs.completion_tokens)
        .bind(obs.total_tokens)
        .bind(obs.tokens_estimated)
        .bind(obs.calculated_input_cost)
        .bind(obs.calculated_output_cost)
        .bind(obs.calculated_total_cost)
        .bind(obs.level.as_str())
        .bind(&obs.status_message)
        .execute(&mut *self.tx)
        .await
        .map_err(DataError::from_postgres)?;

        if result.rows_affected() == 0 {
            return Err(DataError::NotFound {
                entity: "observation",
                id: obs.id.clone(),
            });
        }
        Ok(())
    }

    async fn savepoint(&mut self, name: &str) -> Result<(), DataError> {
        validate_savepoint_name(name)?;
        let sql = format!("SAVEPOINT {}", name);
        let conn: &mut sqlx::PgConnection = &mut self.tx;
        sqlx::Executor::execute(conn, sqlx::raw_sql(&sql))
            .await
            .map_err(DataError::from_postgres)?;
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), DataError> {
        validate_savepoint_name(name)?;
        let sql = format!("RELEASE SAVEPOINT {}", name);
        let conn: &mut sqlx::PgConnection = &mut self.tx;
        sqlx::Executor::execute(conn, sqlx::raw_sql(&sql))
            .await
            .map_err(DataError::from_postgres)?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), DataError> {
        validate_savepoint_name(name)?;
        let sql = format!("ROLLBACK TO SAVEPOINT {}", name);
        let conn: &mut sqlx::PgConnection = &mut self.tx;
        sqlx::Executor::execute(conn, sqlx::raw_sql(&sql))
            .await
            .map_err(DataError::from_postgres)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DataError> {
        self.tx.commit().await.map_err(DataError::from_postgres)
    }

    async fn rollback(self: Box<Self>) -> Result<(), DataError> {
        self.tx.rollback().await.map_err(DataError::from_postgres)
    }
}
