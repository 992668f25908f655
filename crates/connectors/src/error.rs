use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnowflakeError {
    #[error("failed to load private key: {0}")]
    KeyLoad(String),

    #[error("failed to sign JWT: {0}")]
    Jwt(String),

    #[error("HTTP request to Snowflake failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Snowflake API returned an error response: {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("invalid identifier `{0}`: must match ^[A-Za-z0-9_$]+$")]
    InvalidIdentifier(String),

    #[error("channel `{0}` is closed")]
    ChannelClosed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("checkpoint store error: {0}")]
    CheckpointStore(String),
}

#[derive(Debug, Error)]
pub enum EventHubError {
    #[error("event source error: {0}")]
    Source(String),

    #[error("no more partitions assigned")]
    NoAssignment,
}
