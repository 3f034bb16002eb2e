//! Shared helpers

pub mod retry;
pub mod time;
pub mod url;
