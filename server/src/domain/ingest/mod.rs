//! Lifecycle event ingestion
//!
//! - `event` - log entry decoding and typed payload views
//! - `tokens` - token usage extraction and estimation
//! - `handlers` - per-event store writes with cost enrichment
//! - `consumer` - consumer-group loop, batching, acknowledgment, recovery
//! - `heartbeat` - consumer liveness key

mod consumer;
mod error;
mod event;
mod handlers;
mod heartbeat;
mod tokens;

pub use consumer::{BatchOutcome, ClaimSettings, ConsumerHandle, ConsumerState, StreamConsumer};
pub use error::IngestError;
pub use event::{EventKind, LifecycleEvent};
pub use handlers::EventHandlers;
pub use heartbeat::{Heartbeat, LivenessPublisher};
pub use tokens::{TokenUsage, extract_token_usage};
