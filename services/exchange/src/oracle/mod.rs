//! Price oracle
//!
//! Supplies the swap rate (asset units per native unit) to the orchestrator.
//! A failed fetch is always an error, never a silent zero rate.

pub mod cached;
pub mod coingecko;
pub mod fixed;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use cached::CachedOracle;
pub use coingecko::CoingeckoOracle;
pub use fixed::FixedRateOracle;

/// Oracle-related errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// Upstream request could not be made
    #[error("price request failed: {reason}")]
    Request { reason: String },

    /// Upstream answered with a non-success status
    #[error("price feed returned status {status}")]
    Status { status: u16 },

    /// Upstream body could not be decoded
    #[error("undecodable price response: {reason}")]
    Decode { reason: String },

    /// Zero or negative rate
    #[error("invalid rate: {rate}")]
    InvalidRate { rate: String },

    /// No fresh rate and no cached rate young enough to fall back on
    #[error("no usable rate: {reason}")]
    Unavailable { reason: String },
}

/// A quoted exchange rate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    /// Asset units per native unit
    pub value: Decimal,
    pub observed_at: DateTime<Utc>,
    pub source: String,
}

impl Rate {
    /// Build a rate, rejecting non-positive values.
    pub fn new(value: Decimal, observed_at: DateTime<Utc>, source: impl Into<String>) -> Result<Self, OracleError> {
        if value <= Decimal::ZERO {
            return Err(OracleError::InvalidRate {
                rate: value.to_string(),
            });
        }
        Ok(Self {
            value,
            observed_at,
            source: source.into(),
        })
    }
}

/// Capability interface for rate sources.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn fetch_rate(&self) -> Result<Rate, OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_rejects_non_positive() {
        assert!(matches!(
            Rate::new(Decimal::ZERO, Utc::now(), "test"),
            Err(OracleError::InvalidRate { .. })
        ));
        assert!(Rate::new(Decimal::NEGATIVE_ONE, Utc::now(), "test").is_err());
        assert!(Rate::new(Decimal::ONE, Utc::now(), "test").is_ok());
    }
}
