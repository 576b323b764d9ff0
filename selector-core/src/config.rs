//! Engine configuration.
//!
//! Options are plain data so hosts can load them from their own config
//! files. Both development checks are off by default; they run the selector
//! extra times and only ever emit `tracing` warnings.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SelectError};

/// How often a development check runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckFrequency {
    /// Never run the check.
    #[default]
    Never,
    /// Run on the first fresh selector invocation of each engine.
    Once,
    /// Run on every fresh selector invocation.
    Always,
}

impl CheckFrequency {
    pub(crate) fn applies(self, first_run: bool) -> bool {
        match self {
            CheckFrequency::Never => false,
            CheckFrequency::Once => first_run,
            CheckFrequency::Always => true,
        }
    }
}

/// Per-engine options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SelectorOptions {
    /// Re-run the selector on the same state and warn when the two results
    /// are not equal under the engine's equality policy.
    pub stability_check: CheckFrequency,

    /// Warn when the selector returns the whole root state unchanged.
    pub identity_function_check: CheckFrequency,
}

impl SelectorOptions {
    /// Both checks on their first run, the usual setting during development.
    pub fn development() -> Self {
        Self {
            stability_check: CheckFrequency::Once,
            identity_function_check: CheckFrequency::Once,
        }
    }

    /// Parse options from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(SelectError::InvalidOptions)
    }
}
