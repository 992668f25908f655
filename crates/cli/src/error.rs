use connectors::error::{EventHubError, SnowflakeError};
use engine_config::error::ConfigError;
use engine_runtime::error::OrchestratorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Snowflake error: {0}")]
    Snowflake(#[from] SnowflakeError),

    #[error("Event Hubs error: {0}")]
    EventHub(#[from] EventHubError),

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("{0}")]
    Unexpected(String),

    #[error("shutdown requested")]
    ShutdownRequested,
}
