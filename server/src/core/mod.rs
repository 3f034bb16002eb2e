//! Core application infrastructure

pub mod cli;
pub mod config;
pub mod constants;
pub mod shutdown;

pub use crate::app::CoreApp;
pub use cli::{CliConfig, Commands, TracingCommands};
pub use config::AppConfig;
pub use shutdown::ShutdownService;
