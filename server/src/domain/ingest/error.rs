//! Per-event ingestion errors

use thiserror::Error;

use crate::data::error::DataError;

/// Failure of a single lifecycle event
///
/// The event's transaction (or savepoint) is rolled back and its log entry
/// is left unacknowledged so it is redelivered.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("invalid event payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("observation not found: {0}")]
    ObservationNotFound(String),
    #[error(transparent)]
    Store(#[from] DataError),
}
