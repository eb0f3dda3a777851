//! Shared security guards for authorization programs
//!
//! Reusable per-leg checks used by both the escrow and the delegated
//! programs. Each guard inspects one leg and reports the first violation.

use types::ids::{Address, AssetId, Lease};
use types::operation::{AssetTransfer, Operation, Payment};

use crate::errors::PolicyViolation;

/// Fee ceiling applied to every leg unless configured otherwise.
pub const DEFAULT_MAX_FEE: u64 = 1000;

/// Longest validity window (in rounds) a leased leg may declare.
pub const MAX_LEASE_WINDOW: u64 = 1000;

/// `None` and the zero address both mean "not set".
pub fn is_unset(address: Option<Address>) -> bool {
    address.map_or(true, |a| a.is_zero())
}

/// Leg fee must not exceed `max_fee`.
pub fn check_fee(op: &Operation, leg: usize, max_fee: u64) -> Result<(), PolicyViolation> {
    if op.fee() > max_fee {
        return Err(PolicyViolation::FeeTooHigh {
            leg,
            fee: op.fee(),
            max: max_fee,
        });
    }
    Ok(())
}

/// Leg must not rekey its sender.
pub fn check_no_rekey(op: &Operation, leg: usize) -> Result<(), PolicyViolation> {
    if !is_unset(op.header.rekey_to) {
        return Err(PolicyViolation::RekeySet { leg });
    }
    Ok(())
}

/// Leg must not close out the sender's balance or asset holding.
pub fn check_no_close(op: &Operation, leg: usize) -> Result<(), PolicyViolation> {
    let close = match (op.as_payment(), op.as_asset_transfer()) {
        (Some(p), _) => p.close_remainder_to,
        (_, Some(t)) => t.close_assets_to,
        (None, None) => None,
    };
    if !is_unset(close) {
        return Err(PolicyViolation::CloseOutSet { leg });
    }
    Ok(())
}

/// Fee ceiling plus no close-out and no rekey.
pub fn check_spend_hygiene(op: &Operation, leg: usize, max_fee: u64) -> Result<(), PolicyViolation> {
    check_fee(op, leg, max_fee)?;
    check_no_close(op, leg)?;
    check_no_rekey(op, leg)
}

/// Leg must be a payment.
pub fn expect_payment(op: &Operation, leg: usize) -> Result<&Payment, PolicyViolation> {
    op.as_payment().ok_or(PolicyViolation::WrongKind {
        leg,
        expected: "payment",
    })
}

/// Leg must be an asset transfer of `asset_id` without a revocation sender.
pub fn expect_asset_transfer(
    op: &Operation,
    leg: usize,
    asset_id: AssetId,
) -> Result<&AssetTransfer, PolicyViolation> {
    let transfer = op.as_asset_transfer().ok_or(PolicyViolation::WrongKind {
        leg,
        expected: "asset transfer",
    })?;
    if transfer.asset_id != asset_id {
        return Err(PolicyViolation::AssetMismatch {
            leg,
            expected: asset_id,
            actual: transfer.asset_id,
        });
    }
    if !is_unset(transfer.asset_sender) {
        return Err(PolicyViolation::RevocationSenderSet { leg });
    }
    Ok(transfer)
}

/// Leg must carry exactly `expected` as its lease tag.
pub fn check_lease(op: &Operation, leg: usize, expected: Lease) -> Result<(), PolicyViolation> {
    if op.header.active_lease() != Some(expected) {
        return Err(PolicyViolation::LeaseMismatch { leg });
    }
    Ok(())
}

/// Leg validity window must span at most `max` rounds.
pub fn check_window(op: &Operation, leg: usize, max: u64) -> Result<(), PolicyViolation> {
    let length = op.header.validity.length();
    if length > max {
        return Err(PolicyViolation::WindowTooLong { leg, length, max });
    }
    Ok(())
}

/// Zero-amount native payment from `signer` (a live approval attestation).
pub fn check_zero_approval(
    op: &Operation,
    leg: usize,
    signer: Option<Address>,
    max_fee: u64,
) -> Result<(), PolicyViolation> {
    let payment = expect_payment(op, leg)?;
    if payment.amount != 0 {
        return Err(PolicyViolation::NonZeroAmount {
            leg,
            amount: payment.amount,
        });
    }
    if let Some(signer) = signer {
        if op.sender() != signer {
            return Err(PolicyViolation::SenderMismatch { leg });
        }
    }
    check_fee(op, leg, max_fee)
}
