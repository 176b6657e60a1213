use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Driver diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[schemars(title = "Debug", inline)]
#[serde(default)]
pub struct DebugOptions {
    /// Override the process-wide error-check switch; unset keeps the build
    /// default (on in debug builds).
    #[schemars(title = "Error Checks")]
    pub error_checks: Option<bool>,
    /// Log driver errors as they are detected.
    #[schemars(title = "Error Log")]
    pub error_log: bool,
    /// Log every capability when a context is activated for the first time.
    #[schemars(title = "Log Configuration")]
    pub log_config: bool,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            error_checks: None,
            error_log: true,
            log_config: false,
        }
    }
}
