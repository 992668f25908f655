pub mod checkpoint_store;
pub mod client;
pub mod jwt;
pub mod sink;

/// Validates a SQL identifier the way the control table DDL does (§6):
/// letters, digits, underscore, and dollar sign only. Anything else risks
/// injection through an unparameterized `MERGE`/`CREATE TABLE` statement.
pub fn validate_identifier(name: &str) -> Result<(), crate::error::SnowflakeError> {
    let valid = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'$');

    if valid {
        Ok(())
    } else {
        Err(crate::error::SnowflakeError::InvalidIdentifier(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_identifiers() {
        assert!(validate_identifier("MY_TABLE$1").is_ok());
    }

    #[test]
    fn rejects_injection_attempts() {
        assert!(validate_identifier("table; DROP TABLE x").is_err());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("a b").is_err());
    }
}
