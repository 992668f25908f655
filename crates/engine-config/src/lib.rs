pub mod app;
pub mod env;
pub mod error;
pub mod mapping;
pub mod observability;
pub mod retry;
pub mod sink;
pub mod source;
pub mod telemetry;
