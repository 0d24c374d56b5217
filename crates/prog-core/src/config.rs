use serde::{Deserialize, Serialize};

use crate::interpolate::MISSING_VALUE;

/// Knobs for cache rebuilds and dynamic data recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Text substituted for placeholders whose key has no value.
    pub missing_value_text: String,
    /// When an `ASSIGN STRING` expression does not parse, assign its
    /// interpolated text as a literal instead of failing.
    pub literal_string_fallback: bool,
    /// Emit `tracing` events for every diagnostic. Diagnostics are recorded
    /// either way.
    pub trace_failures: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            missing_value_text: MISSING_VALUE.to_string(),
            literal_string_fallback: true,
            trace_failures: true,
        }
    }
}

impl EngineConfig {
    /// Set the text substituted for unknown placeholders.
    pub fn with_missing_value_text(mut self, text: impl Into<String>) -> Self {
        self.missing_value_text = text.into();
        self
    }

    /// Enable or disable the literal fallback for `ASSIGN STRING`.
    pub fn with_literal_string_fallback(mut self, enabled: bool) -> Self {
        self.literal_string_fallback = enabled;
        self
    }

    /// Enable or disable `tracing` output for diagnostics.
    pub fn with_trace_failures(mut self, enabled: bool) -> Self {
        self.trace_failures = enabled;
        self
    }
}
