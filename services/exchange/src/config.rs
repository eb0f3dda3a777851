//! Exchange configuration
//!
//! Loaded once at startup from TOML and shared immutably (`Arc<ExchangeConfig>`).
//! Decimal values are written as strings (`asset_price = "0.25"`).

use std::fmt;
use std::path::Path;
use std::time::Duration;

use contracts::escrow::EscrowParams;
use contracts::security::{DEFAULT_MAX_FEE, MAX_LEASE_WINDOW};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use signing::Keypair;
use thiserror::Error;
use types::asset::{Asset, MAX_DECIMALS};
use types::ids::{Address, AssetId};

use crate::confirm::ConfirmationPolicy;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File not found
    #[error("config file not found: {0}")]
    NotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error
    #[error("validation error: {0}")]
    Validation(String),
}

/// The traded ledger asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetConfig {
    pub id: u64,
    pub unit_name: String,
    pub decimals: u32,
}

/// Confirmation wait bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub timeout_ms: u64,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            initial_backoff_ms: 250,
            max_backoff_ms: 4_000,
        }
    }
}

/// Price feed settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub endpoint: String,
    /// Coin whose fiat price is requested (the native currency)
    pub coin_id: String,
    pub vs_currency: String,
    /// Fiat price of one whole asset unit
    pub asset_price: Decimal,
    pub refresh_interval_secs: u64,
    pub max_staleness_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.coingecko.com/api/v3".to_string(),
            coin_id: "algorand".to_string(),
            vs_currency: "nzd".to_string(),
            asset_price: Decimal::ONE,
            refresh_interval_secs: 10,
            max_staleness_secs: 300,
        }
    }
}

impl OracleConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn max_staleness(&self) -> Duration {
        Duration::from_secs(self.max_staleness_secs)
    }
}

fn default_max_fee() -> u64 {
    DEFAULT_MAX_FEE
}

fn default_escrow_min_balance() -> u64 {
    250_000
}

fn default_validity_rounds() -> u64 {
    MAX_LEASE_WINDOW
}

/// Immutable exchange parameters.
#[derive(Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub admin_address: Address,
    /// Hex ed25519 seed of the admin key
    pub admin_seed_hex: String,
    pub asset: AssetConfig,
    /// Smallest swap size, in asset smallest units
    pub min_asset_amount: u64,
    #[serde(default = "default_max_fee")]
    pub max_fee: u64,
    /// Native amount seeded into the escrow at bootstrap
    #[serde(default = "default_escrow_min_balance")]
    pub escrow_min_balance: u64,
    #[serde(default = "default_validity_rounds")]
    pub validity_rounds: u64,
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
}

impl fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("admin_address", &self.admin_address.to_string())
            .field("admin_seed_hex", &"<redacted>")
            .field("asset", &self.asset)
            .field("min_asset_amount", &self.min_asset_amount)
            .field("max_fee", &self.max_fee)
            .field("escrow_min_balance", &self.escrow_min_balance)
            .field("validity_rounds", &self.validity_rounds)
            .field("confirmation", &self.confirmation)
            .field("oracle", &self.oracle)
            .finish()
    }
}

impl ExchangeConfig {
    /// Load configuration from file
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::load_str(&content)
    }

    /// Load configuration from string
    pub fn load_str(content: &str) -> Result<Self, ConfigError> {
        let config: ExchangeConfig = toml::from_str(content)?;
        config.validate()?;
        tracing::info!(
            admin = %config.admin_address,
            asset_id = config.asset.id,
            "Exchange configuration loaded"
        );
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let admin = self.admin_keypair()?;
        if admin.address() != self.admin_address {
            return Err(ConfigError::Validation(
                "admin seed does not derive admin_address".to_string(),
            ));
        }
        if self.asset.decimals > MAX_DECIMALS {
            return Err(ConfigError::Validation(format!(
                "asset decimals {} exceed {}",
                self.asset.decimals, MAX_DECIMALS
            )));
        }
        if self.max_fee == 0 {
            return Err(ConfigError::Validation("max_fee must be positive".to_string()));
        }
        if self.validity_rounds == 0 || self.validity_rounds > MAX_LEASE_WINDOW {
            return Err(ConfigError::Validation(format!(
                "validity_rounds must be within 1..={}",
                MAX_LEASE_WINDOW
            )));
        }

        let c = &self.confirmation;
        if c.timeout_ms == 0 || c.initial_backoff_ms == 0 {
            return Err(ConfigError::Validation(
                "confirmation timeout and backoff must be positive".to_string(),
            ));
        }
        if c.initial_backoff_ms > c.max_backoff_ms {
            return Err(ConfigError::Validation(
                "initial_backoff_ms exceeds max_backoff_ms".to_string(),
            ));
        }

        let o = &self.oracle;
        if o.asset_price <= Decimal::ZERO {
            return Err(ConfigError::Validation("asset_price must be positive".to_string()));
        }
        if o.refresh_interval_secs > o.max_staleness_secs {
            return Err(ConfigError::Validation(
                "refresh_interval_secs exceeds max_staleness_secs".to_string(),
            ));
        }
        Ok(())
    }

    pub fn admin_keypair(&self) -> Result<Keypair, ConfigError> {
        Keypair::from_seed_hex(&self.admin_seed_hex)
            .map_err(|e| ConfigError::Validation(format!("admin_seed_hex: {}", e)))
    }

    /// The traded asset.
    pub fn asset(&self) -> Result<Asset, ConfigError> {
        Asset::token(
            AssetId(self.asset.id),
            self.asset.unit_name.clone(),
            self.asset.decimals,
        )
        .map_err(|e| ConfigError::Validation(e.to_string()))
    }

    /// Parameters compiled into the escrow program.
    pub fn escrow_params(&self) -> EscrowParams {
        EscrowParams {
            admin: self.admin_address,
            asset_id: AssetId(self.asset.id),
            min_asset_amount: self.min_asset_amount,
            max_fee: self.max_fee,
        }
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            timeout: Duration::from_millis(self.confirmation.timeout_ms),
            initial_backoff: Duration::from_millis(self.confirmation.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.confirmation.max_backoff_ms),
        }
    }
}
