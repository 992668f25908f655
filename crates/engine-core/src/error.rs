use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("operation failed and was classified fatal: {0}")]
    Fatal(String),

    #[error("operation failed after {attempts} attempts: {last_error}")]
    AttemptsExceeded { attempts: usize, last_error: String },

    #[error("decision oracle error: {0}")]
    Oracle(String),
}

#[derive(Error, Debug)]
pub enum AccumulatorError {
    #[error("push on a sealed batch for partition {0}")]
    PushAfterSeal(String),
}
