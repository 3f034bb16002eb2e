//! Token cost calculation from configured model pricing

use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

use super::provider::classify_provider;
use crate::data::error::DataError;
use crate::data::traits::IngestStore;
use crate::data::types::ModelPricing;

/// Decimal places kept for every computed cost
const COST_DECIMAL_PLACES: u32 = 6;

const TOKENS_PER_PRICE_UNIT: i64 = 1_000_000;

#[derive(Error, Debug)]
pub enum CostError {
    #[error("token counts must be non-negative (prompt={prompt}, completion={completion})")]
    NegativeTokens { prompt: i64, completion: i64 },
    #[error("pricing lookup failed: {0}")]
    Store(#[from] DataError),
}

/// Which pricing row produced a cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PricingSource {
    /// Project-specific override
    Project,
    /// Global default row
    Default,
}

/// Cost of one LLM call in USD
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CostResult {
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub total_cost: Decimal,
    pub pricing_source: PricingSource,
}

/// Resolves pricing for a project and computes token costs
#[derive(Clone)]
pub struct CostCalculator {
    store: Arc<dyn IngestStore>,
}

impl CostCalculator {
    pub fn new(store: Arc<dyn IngestStore>) -> Self {
        Self { store }
    }

    /// Cost of a call, or `None` when no pricing row matches the model
    pub async fn calculate(
        &self,
        project_id: &str,
        model: &str,
        prompt_tokens: i64,
        completion_tokens: i64,
    ) -> Result<Option<CostResult>, CostError> {
        if prompt_tokens < 0 || completion_tokens < 0 {
            return Err(CostError::NegativeTokens {
                prompt: prompt_tokens,
                completion: completion_tokens,
            });
        }

        let provider = classify_provider(model);
        let Some((pricing, source)) = self.resolve(project_id, provider.as_str(), model).await?
        else {
            tracing::warn!(
                project_id,
                model,
                provider = %provider,
                "No pricing configured for model"
            );
            return Ok(None);
        };

        // Total sums the unrounded parts; each field is rounded on its own
        let raw_input = token_cost(prompt_tokens, pricing.input_price_per_million);
        let raw_output = token_cost(completion_tokens, pricing.output_price_per_million);
        let total_cost = round_cost(raw_input + raw_output);
        let input_cost = round_cost(raw_input);
        let output_cost = round_cost(raw_output);

        tracing::debug!(
            project_id,
            model,
            %input_cost,
            %output_cost,
            %total_cost,
            source = ?source,
            "Calculated cost"
        );

        Ok(Some(CostResult {
            input_cost,
            output_cost,
            total_cost,
            pricing_source: source,
        }))
    }

    /// Project row first, then the global row
    async fn resolve(
        &self,
        project_id: &str,
        provider: &str,
        model: &str,
    ) -> Result<Option<(ModelPricing, PricingSource)>, DataError> {
        if let Some(row) = self
            .store
            .find_pricing(Some(project_id), provider, model)
            .await?
        {
            return Ok(Some((row, PricingSource::Project)));
        }
        Ok(self
            .store
            .find_pricing(None, provider, model)
            .await?
            .map(|row| (row, PricingSource::Default)))
    }
}

fn token_cost(tokens: i64, price_per_million: Decimal) -> Decimal {
    Decimal::from(tokens) / Decimal::from(TOKENS_PER_PRICE_UNIT) * price_per_million
}

fn round_cost(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(COST_DECIMAL_PLACES, RoundingStrategy::MidpointNearestEven)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    use crate::data::memory::MemoryStore;
    use crate::data::traits::IngestTx;
    use crate::data::types::{Observation, Trace};

    fn calculator_with(store: Arc<MemoryStore>) -> CostCalculator {
        CostCalculator::new(store as Arc<dyn IngestStore>)
    }

    /// Store that only counts pricing lookups
    #[derive(Default)]
    struct CountingStore {
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl IngestStore for CountingStore {
        async fn begin(&self) -> Result<Box<dyn IngestTx>, DataError> {
            unimplemented!()
        }
        async fn trace_project_id(&self, _: &str) -> Result<Option<String>, DataError> {
            unimplemented!()
        }
        async fn find_pricing(
            &self,
            _: Option<&str>,
            _: &str,
            _: &str,
        ) -> Result<Option<ModelPricing>, DataError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
        async fn project_tracing_enabled(&self, _: &str) -> Result<Option<bool>, DataError> {
            unimplemented!()
        }
        async fn set_project_tracing_enabled(&self, _: &str, _: bool) -> Result<bool, DataError> {
            unimplemented!()
        }
        async fn get_trace(&self, _: &str) -> Result<Option<Trace>, DataError> {
            unimplemented!()
        }
        async fn list_observations(&self, _: &str) -> Result<Vec<Observation>, DataError> {
            unimplemented!()
        }
        async fn health_check(&self) -> Result<(), DataError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_pricing_gpt4_turbo() {
        let calc = calculator_with(Arc::new(MemoryStore::new()));
        let result = calc
            .calculate("default", "gpt-4-turbo", 150, 50)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.input_cost, dec!(0.001500));
        assert_eq!(result.output_cost, dec!(0.001500));
        assert_eq!(result.total_cost, dec!(0.003000));
        assert_eq!(result.pricing_source, PricingSource::Default);
    }

    #[tokio::test]
    async fn test_project_pricing_takes_precedence() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_pricing(Some("acme"), "openai", "gpt-4-turbo", dec!(1), dec!(2));
        let calc = calculator_with(Arc::clone(&store));

        let result = calc
            .calculate("acme", "gpt-4-turbo", 1_000_000, 500_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.input_cost, dec!(1));
        assert_eq!(result.output_cost, dec!(1));
        assert_eq!(result.total_cost, dec!(2));
        assert_eq!(result.pricing_source, PricingSource::Project);

        // Other projects still see the global row
        let other = calc
            .calculate("other", "gpt-4-turbo", 1_000_000, 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(other.input_cost, dec!(10));
        assert_eq!(other.pricing_source, PricingSource::Default);
    }

    #[tokio::test]
    async fn test_unknown_model_has_no_cost() {
        let calc = calculator_with(Arc::new(MemoryStore::new()));
        let result = calc.calculate("default", "mistral-large", 10, 10).await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn test_negative_tokens_rejected_before_lookup() {
        let store = Arc::new(CountingStore::default());
        let calc = CostCalculator::new(Arc::clone(&store) as Arc<dyn IngestStore>);

        let result = calc.calculate("default", "gpt-4", -1, 10).await;
        assert!(matches!(
            result,
            Err(CostError::NegativeTokens {
                prompt: -1,
                completion: 10
            })
        ));
        let result = calc.calculate("default", "gpt-4", 1, -10).await;
        assert!(matches!(result, Err(CostError::NegativeTokens { .. })));
        assert_eq!(store.lookups.load(Ordering::SeqCst), 0);

        // Non-negative counts do reach the store: project then global
        calc.calculate("default", "gpt-4", 0, 0).await.unwrap();
        assert_eq!(store.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_tokens_cost_zero() {
        let calc = calculator_with(Arc::new(MemoryStore::new()));
        let result = calc
            .calculate("default", "claude-3-haiku-20240307", 0, 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.total_cost, Decimal::ZERO);
    }

    #[test]
    fn test_round_cost_bankers_rounding() {
        assert_eq!(round_cost(dec!(0.0000005)), dec!(0.000000));
        assert_eq!(round_cost(dec!(0.0000015)), dec!(0.000002));
        assert_eq!(round_cost(dec!(0.0000025)), dec!(0.000002));
    }

    #[test]
    fn test_token_cost_small_counts() {
        // 7 tokens at 0.15/M
        assert_eq!(token_cost(7, dec!(0.15)), dec!(0.00000105));
        assert_eq!(round_cost(token_cost(7, dec!(0.15))), dec!(0.000001));
    }

    #[tokio::test]
    async fn test_total_sums_unrounded_parts() {
        let calc = calculator_with(Arc::new(MemoryStore::new()));
        // 1 token at 0.5/M = 0.0000005, 3 tokens at 1.5/M = 0.0000045
        let result = calc
            .calculate("default", "gpt-3.5-turbo", 1, 3)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.input_cost, dec!(0.000000));
        assert_eq!(result.output_cost, dec!(0.000004));
        assert_eq!(result.total_cost, dec!(0.000005));
    }

    #[test]
    fn test_cost_result_serializes_lowercase_source() {
        let result = CostResult {
            input_cost: dec!(0.001500),
            output_cost: dec!(0.001500),
            total_cost: dec!(0.003000),
            pricing_source: PricingSource::Default,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["pricing_source"], "default");
    }
}
