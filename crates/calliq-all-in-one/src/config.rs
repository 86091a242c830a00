use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub log_json: bool,

    // PostgreSQL configuration
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    #[serde(default = "default_postgres_username")]
    pub postgres_username: String,

    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    #[serde(default = "default_postgres_pool_size")]
    pub postgres_pool_size: usize,

    // Audit retention sweep
    /// How often the retention sweeper runs, in seconds
    #[serde(default = "default_audit_sweep_interval_secs")]
    pub audit_sweep_interval_secs: u64,

    /// Entries older than this many days are purged by the sweeper
    #[serde(default = "default_audit_retention_days")]
    pub audit_retention_days: i64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_postgres_host() -> String {
    "localhost".to_string()
}

fn default_postgres_port() -> u16 {
    5432
}

fn default_postgres_database() -> String {
    "calliq".to_string()
}

fn default_postgres_username() -> String {
    "calliq".to_string()
}

fn default_postgres_password() -> String {
    "calliq".to_string()
}

fn default_postgres_pool_size() -> usize {
    10
}

fn default_audit_sweep_interval_secs() -> u64 {
    3600
}

fn default_audit_retention_days() -> i64 {
    90
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("CALLIQ"))
            .build()?
            .try_deserialize()
    }
}
