//! tracehouse: trace ingestion and aggregation service
//!
//! Consumes trace/observation lifecycle events from a durable log, persists
//! them with cost metadata, and serves observation trees and graphs.

pub mod app;
pub mod core;
pub mod data;
pub mod domain;
pub mod utils;
