pub mod mock;

#[cfg(feature = "azure-eventhubs")]
pub mod azure;
