//! Policy violation types
//!
//! Every rejection names the leg (group position) it was raised for.

use thiserror::Error;
use types::ids::AssetId;

/// Reason an authorization program refused a group.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("Group of {legs} legs matches no authorized class")]
    UnsupportedShape { legs: usize },

    #[error("Leg {index} is not the leg this program authorizes")]
    NotAuthorizedLeg { index: usize },

    #[error("Leg {leg}: expected a {expected} operation")]
    WrongKind { leg: usize, expected: &'static str },

    #[error("Leg {leg}: fee {fee} exceeds ceiling {max}")]
    FeeTooHigh { leg: usize, fee: u64, max: u64 },

    #[error("Leg {leg}: close-out address must not be set")]
    CloseOutSet { leg: usize },

    #[error("Leg {leg}: rekey address must not be set")]
    RekeySet { leg: usize },

    #[error("Leg {leg}: revocation sender must not be set")]
    RevocationSenderSet { leg: usize },

    #[error("Leg {leg}: asset {actual} does not match {expected}")]
    AssetMismatch {
        leg: usize,
        expected: AssetId,
        actual: AssetId,
    },

    #[error("Leg {leg}: receiver does not match")]
    ReceiverMismatch { leg: usize },

    #[error("Leg {leg}: sender does not match")]
    SenderMismatch { leg: usize },

    #[error("Leg {leg}: amount {amount} below minimum {min}")]
    AmountBelowMinimum { leg: usize, amount: u64, min: u64 },

    #[error("Leg {leg}: amount {amount} above ceiling {ceiling}")]
    AmountAboveCeiling { leg: usize, amount: u64, ceiling: u64 },

    #[error("Leg {leg}: amount {amount} differs from agreed {expected}")]
    AmountMismatch { leg: usize, amount: u64, expected: u64 },

    #[error("Leg {leg}: amount must be zero, got {amount}")]
    NonZeroAmount { leg: usize, amount: u64 },

    #[error("Leg {leg}: missing or wrong lease tag")]
    LeaseMismatch { leg: usize },

    #[error("Leg {leg}: validity window of {length} rounds exceeds {max}")]
    WindowTooLong { leg: usize, length: u64, max: u64 },

    #[error("Program decode failed: {reason}")]
    Decode { reason: String },

    #[error("Unsupported program version: {version}")]
    UnsupportedVersion { version: u8 },
}
