//! Error types for the ledger data model
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Identifier parsing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdError {
    #[error("Invalid hex: {value}")]
    InvalidHex { value: String },

    #[error("Invalid length (expected 32 bytes): {value}")]
    InvalidLength { value: String },
}

/// Amount conversion errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmountError {
    #[error("Negative amount: {amount}")]
    Negative { amount: String },

    #[error("Amount overflows smallest-unit range: {amount}")]
    Overflow { amount: String },

    #[error("Unsupported decimal scale: {decimals}")]
    UnsupportedScale { decimals: u32 },

    #[error("Invalid rate: {rate}")]
    InvalidRate { rate: String },
}

/// Transaction group construction errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GroupError {
    #[error("Empty transaction group")]
    Empty,

    #[error("Transaction group too large: {size} legs (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Leg {index} carries a group id that does not match the group")]
    GroupIdMismatch { index: usize },
}
