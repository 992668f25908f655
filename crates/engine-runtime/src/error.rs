use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("mapping `{0}` failed to start: {1}")]
    MappingStartFailed(String, String),

    #[error("shutdown timed out after {0:?}")]
    ShutdownTimedOut(std::time::Duration),
}
