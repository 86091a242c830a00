use serde::{Deserialize, Serialize};

/// Configuration for telemetry initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
    /// Emit logs as JSON lines instead of the human-readable format
    pub json_output: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown-service".to_string(),
            log_level: "info".to_string(),
            json_output: false,
        }
    }
}
