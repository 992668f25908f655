use crate::error::SnowflakeError;
use crate::snowflake::client::SnowflakeClient;
use crate::snowflake::validate_identifier;
use async_trait::async_trait;
use model::checkpoint::{Checkpoint, CheckpointKey};

/// C2, the Checkpoint Store (§4.2). Backed by a primary-keyed control table
/// rather than a log — each write is a `MERGE` upsert keyed on the six
/// [`CheckpointKey`] fields, so re-delivery of the same watermark is
/// idempotent rather than appended.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), SnowflakeError>;

    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, SnowflakeError>;

    /// Latest checkpoint for every partition sharing `key`'s namespace/name/
    /// target triple, used to resume a mapping across all its partitions.
    async fn load_all_partitions(
        &self,
        namespace: &str,
        name: &str,
        target_db: &str,
        target_schema: &str,
        target_table: &str,
    ) -> Result<Vec<Checkpoint>, SnowflakeError>;
}

pub struct SnowflakeCheckpointStore {
    client: SnowflakeClient,
    control_db: String,
    control_schema: String,
    control_table: String,
}

impl SnowflakeCheckpointStore {
    pub fn new(
        client: SnowflakeClient,
        control_db: impl Into<String>,
        control_schema: impl Into<String>,
        control_table: impl Into<String>,
    ) -> Result<Self, SnowflakeError> {
        let control_db = control_db.into();
        let control_schema = control_schema.into();
        let control_table = control_table.into();
        validate_identifier(&control_db)?;
        validate_identifier(&control_schema)?;
        validate_identifier(&control_table)?;

        Ok(Self { client, control_db, control_schema, control_table })
    }

    fn qualified_table(&self) -> String {
        format!("{}.{}.{}", self.control_db, self.control_schema, self.control_table)
    }

    /// Idempotent DDL: a hybrid table primary-keyed on the six checkpoint
    /// identity columns, matching the control table the original connector
    /// provisions on startup.
    pub async fn ensure_table(&self) -> Result<(), SnowflakeError> {
        let table = self.qualified_table();
        let statement = format!(
            "CREATE HYBRID TABLE IF NOT EXISTS {table} (
                source_namespace STRING,
                source_name STRING,
                target_db STRING,
                target_schema STRING,
                target_table STRING,
                partition_id STRING,
                waterlevel NUMBER,
                metadata_json STRING,
                inserted_at TIMESTAMP_NTZ,
                PRIMARY KEY (source_namespace, source_name, target_db, target_schema, target_table, partition_id)
            )"
        );
        self.client.execute_sql(&statement).await?;
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for SnowflakeCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), SnowflakeError> {
        let table = self.qualified_table();
        let key = &checkpoint.key;
        let metadata = checkpoint
            .metadata_json
            .as_deref()
            .map(|m| format!("'{}'", m.replace('\'', "''")))
            .unwrap_or_else(|| "NULL".to_string());

        let statement = format!(
            "MERGE INTO {table} AS t
             USING (SELECT '{ns}' AS source_namespace, '{name}' AS source_name,
                           '{db}' AS target_db, '{schema}' AS target_schema,
                           '{tbl}' AS target_table, '{part}' AS partition_id,
                           {wl} AS waterlevel, {meta} AS metadata_json,
                           CURRENT_TIMESTAMP() AS inserted_at) AS s
             ON t.source_namespace = s.source_namespace AND t.source_name = s.source_name
                AND t.target_db = s.target_db AND t.target_schema = s.target_schema
                AND t.target_table = s.target_table AND t.partition_id = s.partition_id
             WHEN MATCHED THEN UPDATE SET
                 waterlevel = s.waterlevel, metadata_json = s.metadata_json, inserted_at = s.inserted_at
             WHEN NOT MATCHED THEN INSERT
                 (source_namespace, source_name, target_db, target_schema, target_table,
                  partition_id, waterlevel, metadata_json, inserted_at)
                 VALUES (s.source_namespace, s.source_name, s.target_db, s.target_schema,
                         s.target_table, s.partition_id, s.waterlevel, s.metadata_json, s.inserted_at)",
            ns = key.source_namespace,
            name = key.source_name,
            db = key.target_db,
            schema = key.target_schema,
            tbl = key.target_table,
            part = key.partition_id,
            wl = checkpoint.waterlevel,
            meta = metadata,
        );

        self.client.execute_sql(&statement).await?;
        Ok(())
    }

    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>, SnowflakeError> {
        let all = self
            .load_all_partitions(
                &key.source_namespace,
                &key.source_name,
                &key.target_db,
                &key.target_schema,
                &key.target_table,
            )
            .await?;
        Ok(all.into_iter().find(|c| c.key.partition_id == key.partition_id))
    }

    async fn load_all_partitions(
        &self,
        namespace: &str,
        name: &str,
        target_db: &str,
        target_schema: &str,
        target_table: &str,
    ) -> Result<Vec<Checkpoint>, SnowflakeError> {
        let table = self.qualified_table();
        let statement = format!(
            "SELECT partition_id, waterlevel, metadata_json, inserted_at
             FROM (
                 SELECT *, ROW_NUMBER() OVER (
                     PARTITION BY partition_id ORDER BY inserted_at DESC
                 ) AS rn
                 FROM {table}
                 WHERE source_namespace = '{namespace}' AND source_name = '{name}'
                   AND target_db = '{target_db}' AND target_schema = '{target_schema}'
                   AND target_table = '{target_table}'
             )
             WHERE rn = 1"
        );

        let body = self.client.execute_sql(&statement).await?;
        let rows = body
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();

        let mut checkpoints = Vec::with_capacity(rows.len());
        for row in rows {
            let arr = row.as_array().ok_or_else(|| {
                SnowflakeError::CheckpointStore("unexpected row shape from SQL API".to_string())
            })?;
            let partition_id = arr[0].as_str().unwrap_or_default().to_string();
            let waterlevel: i64 = arr[1]
                .as_str()
                .and_then(|s| s.parse().ok())
                .or_else(|| arr[1].as_i64())
                .ok_or_else(|| SnowflakeError::CheckpointStore("missing waterlevel".to_string()))?;
            let metadata_json = arr[2].as_str().map(|s| s.to_string());
            let inserted_at = chrono::Utc::now();

            checkpoints.push(Checkpoint {
                key: model::checkpoint::CheckpointKey::new(
                    namespace, name, target_db, target_schema, target_table, partition_id,
                ),
                waterlevel,
                metadata_json,
                inserted_at,
            });
        }
        Ok(checkpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snowflake::jwt::KeyPairCredentials;
    use pkcs8::EncodePrivateKey;
    use rsa::RsaPrivateKey;

    fn test_client() -> SnowflakeClient {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("generate test key");
        let pem = key.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap();
        let creds = KeyPairCredentials::load("acct", "user", &pem, None).unwrap();
        SnowflakeClient::new("acct.snowflakecomputing.com", creds)
    }

    #[test]
    fn rejects_unsafe_control_table_identifiers() {
        let result = SnowflakeCheckpointStore::new(test_client(), "db", "schema; DROP TABLE x", "checkpoints");
        assert!(result.is_err());
    }

    #[test]
    fn accepts_safe_identifiers() {
        let result = SnowflakeCheckpointStore::new(test_client(), "db", "schema", "checkpoints");
        assert!(result.is_ok());
    }
}
