//! Shared data types for all store backends
//!
//! Both the PostgreSQL and in-memory stores read and write these types so
//! that ingestion and the read paths see one consistent data model.

mod enums;
mod rows;
mod seed;

pub use enums::{ObservationLevel, ObservationType};
pub use rows::{ModelPricing, Observation, Trace};
pub use seed::DEFAULT_MODEL_PRICING;
