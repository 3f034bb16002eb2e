//! Shared enum types for stored observations

use std::fmt;

use serde::{Deserialize, Serialize};

/// Observation types accepted by ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObservationType {
    #[default]
    Span,
    Generation,
    Event,
    Tool,
    Agent,
}

impl ObservationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Span => "SPAN",
            Self::Generation => "GENERATION",
            Self::Event => "EVENT",
            Self::Tool => "TOOL",
            Self::Agent => "AGENT",
        }
    }

    /// Parse a stored or published type name (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SPAN" => Some(Self::Span),
            "GENERATION" => Some(Self::Generation),
            "EVENT" => Some(Self::Event),
            "TOOL" => Some(Self::Tool),
            "AGENT" => Some(Self::Agent),
            _ => None,
        }
    }
}

impl fmt::Display for ObservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity level of an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObservationLevel {
    #[default]
    Default,
    Warning,
    Error,
    Debug,
}

impl ObservationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Debug => "DEBUG",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DEFAULT" => Some(Self::Default),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            "DEBUG" => Some(Self::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for ObservationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
