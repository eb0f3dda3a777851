//! CoinGecko simple-price feed
//!
//! Requests the native coin's fiat price and divides it by the configured
//! fiat price of one asset unit:
//!
//! `GET {endpoint}/simple/price?ids={coin}&vs_currencies={fiat}&include_last_updated_at=true`
//!
//! Response shape: `{"algorand": {"nzd": 0.31, "last_updated_at": 1700000000}}`.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::{OracleError, PriceOracle, Rate};
use crate::config::OracleConfig;

#[derive(Debug, Deserialize)]
struct CoinQuote {
    #[serde(default)]
    last_updated_at: Option<i64>,
    #[serde(flatten)]
    prices: HashMap<String, serde_json::Value>,
}

/// HTTP client for the CoinGecko simple-price endpoint.
pub struct CoingeckoOracle {
    client: Client,
    endpoint: String,
    coin_id: String,
    vs_currency: String,
    asset_price: Decimal,
}

impl CoingeckoOracle {
    pub fn new(config: &OracleConfig) -> Self {
        Self {
            client: Client::new(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            coin_id: config.coin_id.clone(),
            vs_currency: config.vs_currency.clone(),
            asset_price: config.asset_price,
        }
    }

    pub fn request_url(&self) -> String {
        format!(
            "{}/simple/price?ids={}&vs_currencies={}&include_last_updated_at=true",
            self.endpoint, self.coin_id, self.vs_currency
        )
    }

    /// Decode a response body into a rate.
    pub fn parse_response(&self, body: &[u8]) -> Result<Rate, OracleError> {
        let decode = |reason: String| OracleError::Decode { reason };

        let mut quotes: HashMap<String, CoinQuote> =
            serde_json::from_slice(body).map_err(|e| decode(e.to_string()))?;
        let quote = quotes
            .remove(&self.coin_id)
            .ok_or_else(|| decode(format!("missing coin '{}'", self.coin_id)))?;
        let price = quote
            .prices
            .get(&self.vs_currency)
            .and_then(|v| v.as_number())
            .ok_or_else(|| decode(format!("missing price in '{}'", self.vs_currency)))?;
        let text = price.to_string();
        let native_price = Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|e| decode(e.to_string()))?;

        let observed_at = quote
            .last_updated_at
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .unwrap_or_else(Utc::now);

        let value = native_price
            .checked_div(self.asset_price)
            .ok_or_else(|| OracleError::InvalidRate {
                rate: format!("{} / {}", native_price, self.asset_price),
            })?;
        Rate::new(value, observed_at, "coingecko")
    }
}

#[async_trait]
impl PriceOracle for CoingeckoOracle {
    async fn fetch_rate(&self) -> Result<Rate, OracleError> {
        let url = self.request_url();
        debug!(url = %url, "Requesting price");

        let response = self
            .client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| OracleError::Request {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| OracleError::Request {
            reason: e.to_string(),
        })?;
        self.parse_response(&body)
    }
}
