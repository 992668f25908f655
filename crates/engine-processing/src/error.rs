use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("source error: {0}")]
    Source(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("checkpoint store error: {0}")]
    CheckpointStore(String),
}

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("mapping `{0}` failed to start: {1}")]
    StartFailed(String, String),

    #[error("consumer error: {0}")]
    Consumer(#[from] ConsumerError),
}
