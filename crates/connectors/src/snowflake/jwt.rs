use crate::error::SnowflakeError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as base64_standard;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use rsa::RsaPrivateKey;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Key-pair credentials for Snowflake's JWT authentication scheme: the
/// account/user identify the principal, the private key signs the token.
#[derive(Clone)]
pub struct KeyPairCredentials {
    account: String,
    user: String,
    private_key: RsaPrivateKey,
}

#[derive(Serialize)]
struct Claims {
    iss: String,
    sub: String,
    iat: u64,
    exp: u64,
}

impl KeyPairCredentials {
    /// Loads an (optionally encrypted) PKCS#8 PEM private key. Mirrors the
    /// original connector's `_build_connection_profile`, which decrypts the
    /// key once at startup rather than per request.
    pub fn load(
        account: impl Into<String>,
        user: impl Into<String>,
        private_key_pem: &str,
        private_key_password: Option<&str>,
    ) -> Result<Self, SnowflakeError> {
        let private_key = match private_key_password {
            Some(password) => RsaPrivateKey::from_pkcs8_encrypted_pem(private_key_pem, password)
                .map_err(|e| SnowflakeError::KeyLoad(e.to_string()))?,
            None => RsaPrivateKey::from_pkcs8_pem(private_key_pem)
                .map_err(|e| SnowflakeError::KeyLoad(e.to_string()))?,
        };

        Ok(Self {
            account: account.into(),
            user: user.into(),
            private_key,
        })
    }

    /// The SHA256 fingerprint of the public key, formatted the way Snowflake
    /// expects it in the JWT issuer claim: `"SHA256:" + base64(digest)`.
    fn public_key_fingerprint(&self) -> Result<String, SnowflakeError> {
        let public_key = self.private_key.to_public_key();
        let der = public_key
            .to_public_key_der()
            .map_err(|e| SnowflakeError::KeyLoad(e.to_string()))?;
        let digest = Sha256::digest(der.as_bytes());
        Ok(format!("SHA256:{}", base64_standard.encode(digest)))
    }

    fn qualified_username(&self) -> String {
        format!("{}.{}", self.account.to_uppercase(), self.user.to_uppercase())
    }

    /// Mints a JWT valid for `ttl`, signed with RS256 per Snowflake's
    /// key-pair authentication protocol.
    pub fn sign(&self, ttl: Duration) -> Result<String, SnowflakeError> {
        let qualified_username = self.qualified_username();
        let fingerprint = self.public_key_fingerprint()?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| SnowflakeError::Jwt(e.to_string()))?;

        let claims = Claims {
            iss: format!("{qualified_username}.{fingerprint}"),
            sub: qualified_username,
            iat: now.as_secs(),
            exp: (now + ttl).as_secs(),
        };

        let pkcs8_pem = self
            .private_key
            .to_pkcs8_pem(pkcs8::LineEnding::LF)
            .map_err(|e| SnowflakeError::Jwt(e.to_string()))?;

        let encoding_key = EncodingKey::from_rsa_pem(pkcs8_pem.as_bytes())
            .map_err(|e| SnowflakeError::Jwt(e.to_string()))?;

        encode(&Header::new(Algorithm::RS256), &claims, &encoding_key)
            .map_err(|e| SnowflakeError::Jwt(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey as _;

    fn test_key_pem() -> String {
        let mut rng = rand::thread_rng();
        let key = RsaPrivateKey::new(&mut rng, 2048).expect("generate test key");
        key.to_pkcs8_pem(pkcs8::LineEnding::LF).unwrap().to_string()
    }

    #[test]
    fn signs_a_well_formed_jwt() {
        let pem = test_key_pem();
        let creds = KeyPairCredentials::load("myaccount", "myuser", &pem, None).unwrap();
        let token = creds.sign(Duration::from_secs(3600)).unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn qualified_username_is_uppercased() {
        let pem = test_key_pem();
        let creds = KeyPairCredentials::load("acct", "user", &pem, None).unwrap();
        assert_eq!(creds.qualified_username(), "ACCT.USER");
    }
}
