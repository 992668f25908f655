use async_trait::async_trait;
use std::fmt;

/// A malformed [`Decision`] from a [`DecisionOracle`] — out-of-range fields
/// (§8: `suggested_wait_seconds ∈ [1,60]`, `confidence ∈ [0,1]`).
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidDecision {
    pub field: &'static str,
    pub value: String,
}

impl fmt::Display for InvalidDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid decision field `{}`: {}", self.field, self.value)
    }
}

impl std::error::Error for InvalidDecision {}

/// An advisory retry decision returned by an external oracle (§4.1 "Advisory
/// mode"). Constructed only through [`Decision::new`], which enforces the
/// range invariants so an out-of-range oracle response can never silently
/// propagate.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub should_retry: bool,
    pub suggested_wait_seconds: u64,
    pub confidence: f64,
    pub reason: Option<String>,
}

impl Decision {
    pub fn new(
        should_retry: bool,
        suggested_wait_seconds: u64,
        confidence: f64,
        reason: Option<String>,
    ) -> Result<Self, InvalidDecision> {
        if !(1..=60).contains(&suggested_wait_seconds) {
            return Err(InvalidDecision {
                field: "suggested_wait_seconds",
                value: suggested_wait_seconds.to_string(),
            });
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(InvalidDecision {
                field: "confidence",
                value: confidence.to_string(),
            });
        }
        Ok(Self {
            should_retry,
            suggested_wait_seconds,
            confidence,
            reason,
        })
    }

    /// The conservative fallback used when the oracle cannot be consulted in
    /// time (§4.1 "fail closed"): never retry.
    pub fn conservative_fallback() -> Self {
        Self {
            should_retry: false,
            suggested_wait_seconds: 1,
            confidence: 0.0,
            reason: Some("oracle unavailable, defaulting to no-retry".to_string()),
        }
    }
}

/// The external advisory-retry interface (§4.1, §6). The retry engine's
/// Advisory mode consults this for each failure classification; C1 caches
/// responses by a hash of the classification key.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn decide(&self, failure_kind: &str, attempt: u32) -> Result<Decision, Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wait_seconds_out_of_range() {
        assert!(Decision::new(true, 0, 0.5, None).is_err());
        assert!(Decision::new(true, 61, 0.5, None).is_err());
        assert!(Decision::new(true, 1, 0.5, None).is_ok());
        assert!(Decision::new(true, 60, 0.5, None).is_ok());
    }

    #[test]
    fn rejects_confidence_out_of_range() {
        assert!(Decision::new(true, 5, -0.01, None).is_err());
        assert!(Decision::new(true, 5, 1.01, None).is_err());
        assert!(Decision::new(true, 5, 0.0, None).is_ok());
        assert!(Decision::new(true, 5, 1.0, None).is_ok());
    }

    #[test]
    fn conservative_fallback_never_retries() {
        let d = Decision::conservative_fallback();
        assert!(!d.should_retry);
    }
}
