use std::time::Duration;

use contracts::errors::PolicyViolation;
use signing::SigningError;
use thiserror::Error;
use types::errors::{AmountError, GroupError};
use types::ids::{Address, TxId};

use crate::config::ConfigError;
use crate::ledger::LedgerError;
use crate::oracle::OracleError;

/// Central error type for exchange operations
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The group failed an authorization program or ledger check; nothing moved
    #[error("Policy rejected: {reason}")]
    PolicyRejected { reason: String },

    /// Lease collision: the sender already has a live group with this lease
    #[error("Replay rejected: lease already active for {sender}")]
    ReplayRejected { sender: Address },

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(#[from] OracleError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Confirmation of {txid} timed out after {waited:?}")]
    ConfirmationTimeout { txid: TxId, waited: Duration },

    #[error("Ledger unavailable: {reason}")]
    LedgerUnavailable { reason: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] AmountError),

    #[error("Invalid group: {0}")]
    InvalidGroup(#[from] GroupError),

    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),
}

impl ExchangeError {
    /// Whether the caller's funds are known not to have moved.
    pub fn funds_unmoved(&self) -> bool {
        matches!(
            self,
            ExchangeError::PolicyRejected { .. }
                | ExchangeError::ReplayRejected { .. }
                | ExchangeError::InvalidAmount(_)
                | ExchangeError::InvalidGroup(_)
                | ExchangeError::Signing(_)
        )
    }

    /// Whether the failure lies with oracle or ledger connectivity.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            ExchangeError::OracleUnavailable(_)
                | ExchangeError::LedgerUnavailable { .. }
                | ExchangeError::ConfirmationTimeout { .. }
        )
    }
}

impl From<LedgerError> for ExchangeError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Rejected { reason } => ExchangeError::PolicyRejected { reason },
            LedgerError::LeaseConflict { sender } => ExchangeError::ReplayRejected { sender },
            LedgerError::Unavailable { reason } => ExchangeError::LedgerUnavailable { reason },
        }
    }
}

impl From<PolicyViolation> for ExchangeError {
    fn from(err: PolicyViolation) -> Self {
        ExchangeError::PolicyRejected {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_error_mapping() {
        let sender = Address::from_bytes([3u8; 32]);
        let err: ExchangeError = LedgerError::LeaseConflict { sender }.into();
        assert!(matches!(err, ExchangeError::ReplayRejected { sender: s } if s == sender));
        assert!(err.funds_unmoved());
        assert!(!err.is_infrastructure());

        let err: ExchangeError = LedgerError::Unavailable {
            reason: "connection refused".to_string(),
        }
        .into();
        assert!(err.is_infrastructure());
        assert!(!err.funds_unmoved());
    }

    #[test]
    fn test_policy_violation_is_rejection() {
        let err: ExchangeError = PolicyViolation::RekeySet { leg: 1 }.into();
        assert!(matches!(err, ExchangeError::PolicyRejected { .. }));
        assert!(err.funds_unmoved());
    }

    #[test]
    fn test_timeout_is_infrastructure() {
        let err = ExchangeError::ConfirmationTimeout {
            txid: TxId::from_bytes([0u8; 32]),
            waited: Duration::from_secs(5),
        };
        assert!(err.is_infrastructure());
        assert!(!err.funds_unmoved());
    }
}
