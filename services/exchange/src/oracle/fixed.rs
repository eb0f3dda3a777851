//! Admin-set fixed rate

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;

use super::{OracleError, PriceOracle, Rate};

/// Rate source returning whatever the admin last set.
pub struct FixedRateOracle {
    rate: RwLock<Decimal>,
}

impl FixedRateOracle {
    pub fn new(rate: Decimal) -> Self {
        Self {
            rate: RwLock::new(rate),
        }
    }

    pub fn set_rate(&self, rate: Decimal) {
        *self.rate.write().unwrap_or_else(|p| p.into_inner()) = rate;
    }
}

#[async_trait]
impl PriceOracle for FixedRateOracle {
    async fn fetch_rate(&self) -> Result<Rate, OracleError> {
        let value = *self.rate.read().unwrap_or_else(|p| p.into_inner());
        Rate::new(value, Utc::now(), "fixed")
    }
}
