//! PostgreSQL schema definitions
//!
//! Ingestion tables only. Projects are owned by the management surface; the
//! `projects` table here carries just the fields ingestion reads.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Complete schema SQL for PostgreSQL
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at BIGINT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at BIGINT NOT NULL,
    checksum TEXT NOT NULL,
    execution_time_ms INTEGER,
    success BOOLEAN NOT NULL DEFAULT TRUE
);

-- =============================================================================
-- 1. Projects (ingestion view)
-- =============================================================================
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL CHECK(length(name) >= 1 AND length(name) <= 100),
    tracing_enabled BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- =============================================================================
-- 2. Traces (project_id is not a FK: projects may live in another database)
-- =============================================================================
CREATE TABLE IF NOT EXISTS traces (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    name TEXT NOT NULL,
    user_id TEXT,
    session_id TEXT,
    meta JSONB NOT NULL DEFAULT '{}'::jsonb,
    tags JSONB NOT NULL DEFAULT '[]'::jsonb,
    input JSONB,
    output JSONB,
    timestamp TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_traces_project_timestamp ON traces(project_id, timestamp DESC);
CREATE INDEX IF NOT EXISTS idx_traces_session ON traces(session_id) WHERE session_id IS NOT NULL;

-- =============================================================================
-- 3. Observations (references traces)
-- =============================================================================
CREATE TABLE IF NOT EXISTS observations (
    id TEXT PRIMARY KEY,
    trace_id TEXT NOT NULL REFERENCES traces(id) ON DELETE CASCADE,
    parent_observation_id TEXT,
    type TEXT NOT NULL DEFAULT 'SPAN'
        CHECK(type IN ('SPAN', 'GENERATION', 'EVENT', 'TOOL', 'AGENT')),
    name TEXT NOT NULL,
    start_time TIMESTAMPTZ NOT NULL,
    end_time TIMESTAMPTZ,
    completion_start_time TIMESTAMPTZ,
    input JSONB,
    output JSONB,
    metadata JSONB,
    model TEXT,
    model_parameters JSONB,
    prompt_tokens BIGINT,
    completion_tokens BIGINT,
    total_tokens BIGINT,
    tokens_estimated BOOLEAN NOT NULL DEFAULT FALSE,
    calculated_input_cost NUMERIC(12, 6),
    calculated_output_cost NUMERIC(12, 6),
    calculated_total_cost NUMERIC(12, 6),
    level TEXT NOT NULL DEFAULT 'DEFAULT'
        CHECK(level IN ('DEFAULT', 'WARNING', 'ERROR', 'DEBUG')),
    status_message TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_observations_trace_start ON observations(trace_id, start_time);
CREATE INDEX IF NOT EXISTS idx_observations_parent ON observations(parent_observation_id)
    WHERE parent_observation_id IS NOT NULL;

-- =============================================================================
-- 4. Model pricing (project_id NULL = global default)
-- =============================================================================
CREATE TABLE IF NOT EXISTS model_pricing (
    id TEXT PRIMARY KEY,
    project_id TEXT,
    hosting_provider TEXT NOT NULL,
    model_name TEXT NOT NULL,
    input_price_per_million NUMERIC(10, 6) NOT NULL CHECK(input_price_per_million >= 0),
    output_price_per_million NUMERIC(10, 6) NOT NULL CHECK(output_price_per_million >= 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE(project_id, hosting_provider, model_name)
);

-- NULL project ids never collide under UNIQUE, so globals need their own index
CREATE UNIQUE INDEX IF NOT EXISTS idx_model_pricing_global
    ON model_pricing(hosting_provider, model_name) WHERE project_id IS NULL;
"#;

/// Default data SQL for PostgreSQL (inserted separately after schema)
pub const DEFAULT_DATA: &str = r#"
-- 1. Default project
INSERT INTO projects (id, name) VALUES ('default', 'Default Project')
ON CONFLICT (id) DO NOTHING;

-- 2. Global model pricing (USD per 1M tokens)
INSERT INTO model_pricing (id, project_id, hosting_provider, model_name, input_price_per_million, output_price_per_million) VALUES
    ('default-openai-gpt-4-turbo', NULL, 'openai', 'gpt-4-turbo', 10, 30),
    ('default-openai-gpt-4', NULL, 'openai', 'gpt-4', 30, 60),
    ('default-openai-gpt-3.5-turbo', NULL, 'openai', 'gpt-3.5-turbo', 0.5, 1.5),
    ('default-openai-gpt-4o', NULL, 'openai', 'gpt-4o', 2.5, 10),
    ('default-openai-gpt-4o-mini', NULL, 'openai', 'gpt-4o-mini', 0.15, 0.6),
    ('default-anthropic-claude-3-opus-20240229', NULL, 'anthropic', 'claude-3-opus-20240229', 15, 75),
    ('default-anthropic-claude-3-sonnet-20240229', NULL, 'anthropic', 'claude-3-sonnet-20240229', 3, 15),
    ('default-anthropic-claude-3-haiku-20240307', NULL, 'anthropic', 'claude-3-haiku-20240307', 0.25, 1.25),
    ('default-anthropic-claude-3-5-sonnet-20241022', NULL, 'anthropic', 'claude-3-5-sonnet-20241022', 3, 15),
    ('default-azure-gpt-4-turbo', NULL, 'azure', 'gpt-4-turbo', 10, 30),
    ('default-azure-gpt-4', NULL, 'azure', 'gpt-4', 30, 60),
    ('default-azure-gpt-35-turbo', NULL, 'azure', 'gpt-35-turbo', 0.5, 1.5)
ON CONFLICT DO NOTHING;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::DEFAULT_MODEL_PRICING;

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn test_schema_version_is_positive() {
        assert!(SCHEMA_VERSION > 0);
    }

    #[test]
    fn test_schema_contains_required_tables() {
        let required_tables = [
            "schema_version",
            "schema_migrations",
            "projects",
            "traces",
            "observations",
            "model_pricing",
        ];

        for table in required_tables {
            assert!(
                SCHEMA.contains(&format!("CREATE TABLE IF NOT EXISTS {}", table)),
                "Schema missing table: {}",
                table
            );
        }
    }

    #[test]
    fn test_observations_cascade_with_trace() {
        assert!(SCHEMA.contains("REFERENCES traces(id) ON DELETE CASCADE"));
    }

    #[test]
    fn test_default_data_matches_seed_table() {
        for (provider, model, input, output) in DEFAULT_MODEL_PRICING {
            let row = format!(
                "NULL, '{}', '{}', {}, {})",
                provider, model, input, output
            );
            assert!(DEFAULT_DATA.contains(&row), "Default data missing {}", row);
        }
    }
}
