use crate::error::SnowflakeError;
use crate::snowflake::jwt::KeyPairCredentials;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

const JWT_TTL: Duration = Duration::from_secs(59 * 60);
const JWT_REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

struct CachedToken {
    value: String,
    minted_at: Instant,
}

/// A thin REST client over Snowflake's SQL API, shared by the checkpoint
/// store (control-table MERGE statements) and the streaming sink (channel
/// open/append/close calls). Holds one signed JWT, refreshed lazily just
/// before expiry rather than on a timer — mirrors how the original connector
/// treated its Snowflake session as a long-lived, reconnect-on-demand
/// resource.
#[derive(Clone)]
pub struct SnowflakeClient {
    http: reqwest::Client,
    credentials: Arc<KeyPairCredentials>,
    account_host: String,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl SnowflakeClient {
    pub fn new(account_host: impl Into<String>, credentials: KeyPairCredentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials: Arc::new(credentials),
            account_host: account_host.into(),
            token: Arc::new(Mutex::new(None)),
        }
    }

    fn bearer_token(&self) -> Result<String, SnowflakeError> {
        let mut guard = self.token.lock();
        if let Some(cached) = guard.as_ref() {
            if cached.minted_at.elapsed() < JWT_TTL - JWT_REFRESH_MARGIN {
                return Ok(cached.value.clone());
            }
        }

        let value = self.credentials.sign(JWT_TTL)?;
        *guard = Some(CachedToken { value: value.clone(), minted_at: Instant::now() });
        Ok(value)
    }

    /// Executes one SQL statement via the SQL API and returns its JSON body.
    /// Used by the control-table checkpoint store for `MERGE`/`CREATE TABLE`
    /// statements; never accepts caller-supplied identifiers without prior
    /// validation (§6).
    pub async fn execute_sql(&self, statement: &str) -> Result<serde_json::Value, SnowflakeError> {
        let token = self.bearer_token()?;
        let url = format!("https://{}/api/v2/statements", self.account_host);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .header("X-Snowflake-Authorization-Token-Type", "KEYPAIR_JWT")
            .json(&serde_json::json!({ "statement": statement, "timeout": 60 }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SnowflakeError::ApiError { status: status.as_u16(), body });
        }

        Ok(response.json().await?)
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn account_host(&self) -> &str {
        &self.account_host
    }

    pub(crate) fn token(&self) -> Result<String, SnowflakeError> {
        self.bearer_token()
    }
}
