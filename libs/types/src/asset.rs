//! Assets and smallest-unit amount conversion
//!
//! Every amount embedded in a ledger operation is an integer count of the
//! asset's smallest unit (`human × 10^decimals`). Human-unit amounts and
//! exchange rates are carried as `Decimal`, never as floats. Conversion to
//! the smallest unit truncates toward zero.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AmountError;
use crate::ids::AssetId;

/// Largest supported scale: `10^19` still fits the `u64` smallest-unit range.
pub const MAX_DECIMALS: u32 = 19;

/// Decimals of the ledger's native currency.
pub const NATIVE_DECIMALS: u32 = 6;

/// A ledger asset.
///
/// `id == None` denotes the native currency; `Some(id)` a ledger-issued
/// asset such as the chad token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Option<AssetId>,
    pub unit_name: String,
    pub decimals: u32,
}

impl Asset {
    /// The ledger's native currency.
    pub fn native() -> Self {
        Self {
            id: None,
            unit_name: "ALGO".to_string(),
            decimals: NATIVE_DECIMALS,
        }
    }

    /// A ledger-issued asset.
    pub fn token(
        id: AssetId,
        unit_name: impl Into<String>,
        decimals: u32,
    ) -> Result<Self, AmountError> {
        if decimals > MAX_DECIMALS {
            return Err(AmountError::UnsupportedScale { decimals });
        }
        Ok(Self {
            id: Some(id),
            unit_name: unit_name.into(),
            decimals,
        })
    }

    pub fn is_native(&self) -> bool {
        self.id.is_none()
    }

    /// `10^decimals`.
    fn scale_factor(&self) -> Result<Decimal, AmountError> {
        if self.decimals > MAX_DECIMALS {
            return Err(AmountError::UnsupportedScale {
                decimals: self.decimals,
            });
        }
        Ok(Decimal::from(10u64.pow(self.decimals)))
    }

    /// Convert a human-unit amount to the smallest unit, truncating.
    pub fn to_smallest_unit(&self, human: Decimal) -> Result<u64, AmountError> {
        if human.is_sign_negative() && !human.is_zero() {
            return Err(AmountError::Negative {
                amount: human.to_string(),
            });
        }
        let scaled = human
            .checked_mul(self.scale_factor()?)
            .ok_or_else(|| AmountError::Overflow {
                amount: human.to_string(),
            })?;
        scaled.trunc().to_u64().ok_or_else(|| AmountError::Overflow {
            amount: human.to_string(),
        })
    }

    /// Convert a smallest-unit amount to human units (exact).
    pub fn to_human_unit(&self, smallest: u64) -> Decimal {
        Decimal::from_i128_with_scale(smallest as i128, self.decimals.min(MAX_DECIMALS))
    }
}

fn check_rate(rate: Decimal) -> Result<(), AmountError> {
    if rate <= Decimal::ZERO {
        return Err(AmountError::InvalidRate {
            rate: rate.to_string(),
        });
    }
    Ok(())
}

/// Convert `amount` (smallest units of `from`) into smallest units of `to`
/// at `rate` units of `to` per unit of `from`. Truncates.
pub fn convert_at_rate(
    amount: u64,
    from: &Asset,
    to: &Asset,
    rate: Decimal,
) -> Result<u64, AmountError> {
    check_rate(rate)?;
    let human = from.to_human_unit(amount);
    let converted = human
        .checked_mul(rate)
        .ok_or_else(|| AmountError::Overflow {
            amount: human.to_string(),
        })?;
    to.to_smallest_unit(converted)
}

/// Convert `amount` (smallest units of `from`) into smallest units of `to`
/// where `rate` is units of `from` per unit of `to`. Truncates.
pub fn convert_at_inverse_rate(
    amount: u64,
    from: &Asset,
    to: &Asset,
    rate: Decimal,
) -> Result<u64, AmountError> {
    check_rate(rate)?;
    let human = from.to_human_unit(amount);
    let converted = human
        .checked_div(rate)
        .ok_or_else(|| AmountError::Overflow {
            amount: human.to_string(),
        })?;
    to.to_smallest_unit(converted)
}
