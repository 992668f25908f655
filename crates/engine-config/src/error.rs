use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read env file {path}: {source}")]
    EnvFile { path: String, source: std::io::Error },

    #[error("malformed env file line {line}: expected KEY=VALUE")]
    MalformedEnvLine { line: usize },

    #[error("unknown mapping target `{0}`: no sink topology registered under that key")]
    UnknownMappingTarget(String),
}
