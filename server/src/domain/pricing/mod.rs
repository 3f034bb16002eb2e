//! LLM cost calculation
//!
//! - `provider` - hosting provider classification from model identifiers
//! - `cost` - project/global pricing resolution and decimal cost math

mod cost;
mod provider;

pub use cost::{CostCalculator, CostError, CostResult, PricingSource};
pub use provider::{HostingProvider, classify_provider};
