//! Domain logic for trace ingestion
//!
//! - `ingest` - stream consumer turning lifecycle events into rows
//! - `pricing` - provider classification and token cost calculation
//! - `projects` - cached per-project tracing flag
//! - `traces` - observation trees and visualization graphs

pub mod ingest;
pub mod pricing;
pub mod projects;
pub mod traces;

pub use ingest::{ConsumerHandle, ConsumerState, LivenessPublisher, StreamConsumer};
pub use pricing::CostCalculator;
pub use projects::TracingFlagCache;
pub use traces::TreeService;
