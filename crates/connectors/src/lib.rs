pub mod error;
pub mod eventhub;
pub mod snowflake;
