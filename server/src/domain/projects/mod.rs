//! Project-level settings consumed by ingestion

mod tracing_flag;

pub use tracing_flag::TracingFlagCache;
