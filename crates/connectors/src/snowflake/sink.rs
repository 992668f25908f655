use crate::error::SnowflakeError;
use crate::snowflake::client::SnowflakeClient;
use crate::snowflake::jwt::KeyPairCredentials;
use crate::snowflake::validate_identifier;
use async_trait::async_trait;
use model::row::{Row, RowId};
use model::sink::{ChannelClient, ChannelName};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds the diagnostic channel name the original connector logs
/// (`create_channel_name`), distinct from the cache key used internally.
pub fn diagnostic_channel_name(table: &str, partition_id: &str) -> String {
    format!("{table}-partition-{partition_id}")
}

/// Factory seam standing in for the original connector's selection between
/// a "classic" and "high-performance" streaming client
/// (`create_snowflake_streaming_client`). Only the high-performance shape is
/// implemented here; a second backend would plug in alongside this function
/// without callers needing to change.
pub fn build_sink(
    account_host: impl Into<String>,
    account: impl Into<String>,
    user: impl Into<String>,
    private_key_pem: &str,
    private_key_password: Option<&str>,
    pipe_name: impl Into<String>,
    client_suffix: impl Into<String>,
) -> Result<SnowflakeStreamingSink, SnowflakeError> {
    let credentials = KeyPairCredentials::load(account, user, private_key_pem, private_key_password)?;
    let client = SnowflakeClient::new(account_host, credentials);
    Ok(SnowflakeStreamingSink::new(client, pipe_name, client_suffix))
}

/// The channel cache key: one open channel per (table, partition, client
/// instance) so two mapping instances never contend for the same channel.
fn cache_key(table: &str, partition_id: &str, client_suffix: &str) -> ChannelName {
    ChannelName::new(format!("{table}_partition_{partition_id}_{client_suffix}"))
}

#[derive(Serialize)]
struct AppendRowsRequest<'a> {
    rows: &'a [serde_json::Value],
}

struct OpenChannel {
    last_committed: Option<RowId>,
}

/// C3, the Snowflake Streaming Sink (§4.3). Maintains one open channel per
/// partition, keyed the way the original Python client's channel cache was
/// keyed, and performs idempotent row appends keyed by [`RowId`].
pub struct SnowflakeStreamingSink {
    client: SnowflakeClient,
    pipe: String,
    client_suffix: String,
    channels: Arc<RwLock<HashMap<ChannelName, OpenChannel>>>,
}

impl SnowflakeStreamingSink {
    pub fn new(client: SnowflakeClient, pipe: impl Into<String>, client_suffix: impl Into<String>) -> Self {
        Self {
            client,
            pipe: pipe.into(),
            client_suffix: client_suffix.into(),
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

}

#[async_trait]
impl ChannelClient for SnowflakeStreamingSink {
    type Error = SnowflakeError;

    fn channel_name_for(&self, table: &str, partition_id: &str) -> Result<ChannelName, Self::Error> {
        validate_identifier(table)?;
        tracing::debug!(
            channel = %diagnostic_channel_name(table, partition_id),
            "deriving streaming channel name"
        );
        Ok(cache_key(table, partition_id, &self.client_suffix))
    }

    async fn open_channel(&self, name: &ChannelName) -> Result<Option<RowId>, Self::Error> {
        if let Some(existing) = self.channels.read().get(name) {
            return Ok(existing.last_committed.clone());
        }

        let statement = format!(
            "SELECT SYSTEM$PIPE_STATUS('{pipe}')",
            pipe = self.pipe.replace('\'', "''")
        );
        self.client.execute_sql(&statement).await?;

        self.channels
            .write()
            .insert(name.clone(), OpenChannel { last_committed: None });
        Ok(None)
    }

    /// Empty `rows` is a no-op success (§4.3 "empty batch short-circuit") —
    /// the orchestrator calls this on every flush tick even when nothing
    /// accumulated, and a round trip for zero rows would only waste a call.
    async fn ingest_batch(&self, name: &ChannelName, rows: &[(RowId, Row)]) -> Result<bool, Self::Error> {
        if rows.is_empty() {
            return Ok(true);
        }

        if !self.channels.read().contains_key(name) {
            return Err(SnowflakeError::ChannelClosed(name.to_string()));
        }

        let payload: Vec<serde_json::Value> = rows
            .iter()
            .map(|(row_id, row)| {
                serde_json::json!({
                    "row_id": row_id.as_str(),
                    "row": row,
                })
            })
            .collect();

        let url = format!(
            "https://{}/v2/streaming/data/pipes/{}/channels/{}/rows",
            self.client.account_host(),
            self.pipe,
            name.as_str(),
        );

        let response = self
            .client
            .http()
            .post(&url)
            .bearer_auth(self.client.token()?)
            .json(&AppendRowsRequest { rows: &payload })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SnowflakeError::ApiError { status: status.as_u16(), body });
        }

        if let Some(last) = rows.last() {
            if let Some(channel) = self.channels.write().get_mut(name) {
                channel.last_committed = Some(last.0.clone());
            }
        }

        Ok(true)
    }

    async fn close_channel(&self, name: &ChannelName) -> Result<(), Self::Error> {
        self.channels.write().remove(name);
        Ok(())
    }

    async fn close_client(&self) -> Result<(), Self::Error> {
        self.channels.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_matches_spec_format() {
        let key = cache_key("EVENTS", "3", "abc123");
        assert_eq!(key.as_str(), "EVENTS_partition_3_abc123");
    }

    #[test]
    fn diagnostic_name_is_distinct_from_cache_key() {
        let diag = diagnostic_channel_name("EVENTS", "3");
        assert_eq!(diag, "EVENTS-partition-3");
        assert_ne!(diag, cache_key("EVENTS", "3", "abc123").as_str());
    }
}
