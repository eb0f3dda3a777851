//! Escrow authorization program
//!
//! Decides whether the escrow account may sign a given leg. The escrow has no
//! private key; its address is the hash of this program's compiled bytes and
//! the ledger runs [`evaluate`] for every leg the escrow authorizes.
//!
//! Classification looks only at the group's shape. Validation then checks
//! every field of the classified shape. First matching class wins; anything
//! else is [`EscrowClass::Reject`].

use serde::{Deserialize, Serialize};
use types::group::{GroupShape, SwapLeg, SwapLegs, TransactionGroup};
use types::ids::{Address, AssetId, Lease};
use types::operation::{Operation, OperationBody};

use crate::errors::PolicyViolation;
use crate::security::{
    check_fee, check_lease, check_spend_hygiene, check_window, check_zero_approval,
    expect_asset_transfer, expect_payment, MAX_LEASE_WINDOW,
};

/// Label of the lease every escrow opt-in must carry.
pub const OPT_IN_LEASE_LABEL: &str = "chad-exchange/opt-in/v1";

/// Lease tag bounding escrow opt-ins to one per validity window.
pub fn opt_in_lease() -> Lease {
    Lease::from_label(OPT_IN_LEASE_LABEL)
}

/// Static parameters compiled into the escrow program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowParams {
    /// Exchange owner; sole withdrawal receiver and swap approver
    pub admin: Address,
    pub asset_id: AssetId,
    /// Minimum asset amount (smallest units) moved by a swap
    pub min_asset_amount: u64,
    /// Per-leg fee ceiling
    pub max_fee: u64,
}

/// Transaction classes the escrow recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscrowClass {
    OptIn,
    WithdrawNative,
    WithdrawAsset,
    SwapNativeForAsset,
    SwapAssetForNative,
    Reject,
}

/// Outcome of evaluating the escrow program for one leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub class: EscrowClass,
    pub outcome: Result<(), PolicyViolation>,
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        self.class != EscrowClass::Reject && self.outcome.is_ok()
    }

    pub fn into_result(self) -> Result<EscrowClass, PolicyViolation> {
        self.outcome.map(|()| self.class)
    }
}

/// Classify a group by shape alone.
pub fn classify(group: &TransactionGroup) -> EscrowClass {
    match group.shape() {
        GroupShape::Single(op) => match &op.body {
            OperationBody::AssetTransfer(t) if t.receiver == op.sender() => EscrowClass::OptIn,
            OperationBody::AssetTransfer(_) => EscrowClass::WithdrawAsset,
            OperationBody::Payment(_) => EscrowClass::WithdrawNative,
        },
        GroupShape::Swap(legs) => match (&legs.user.body, &legs.counter.body) {
            (OperationBody::Payment(_), OperationBody::AssetTransfer(_)) => {
                EscrowClass::SwapNativeForAsset
            }
            (OperationBody::AssetTransfer(_), OperationBody::Payment(_)) => {
                EscrowClass::SwapAssetForNative
            }
            _ => EscrowClass::Reject,
        },
        GroupShape::Unsupported(_) => EscrowClass::Reject,
    }
}

/// Evaluate the escrow program for the leg at `leg_index`.
///
/// Never panics; a rejection is carried in the returned [`Verdict`].
pub fn evaluate(params: &EscrowParams, group: &TransactionGroup, leg_index: usize) -> Verdict {
    let class = classify(group);
    let outcome = match (class, group.shape()) {
        (EscrowClass::Reject, _) => Err(PolicyViolation::UnsupportedShape { legs: group.len() }),
        (_, GroupShape::Single(op)) => {
            expect_leg(leg_index, 0).and_then(|()| validate_single(params, class, op))
        }
        (_, GroupShape::Swap(legs)) => expect_leg(leg_index, SwapLeg::Counter.index())
            .and_then(|()| validate_swap(params, class, legs)),
        (_, GroupShape::Unsupported(len)) => Err(PolicyViolation::UnsupportedShape { legs: len }),
    };
    Verdict { class, outcome }
}

fn expect_leg(index: usize, expected: usize) -> Result<(), PolicyViolation> {
    if index != expected {
        return Err(PolicyViolation::NotAuthorizedLeg { index });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Single-leg classes
// ---------------------------------------------------------------------------

fn validate_single(
    params: &EscrowParams,
    class: EscrowClass,
    op: &Operation,
) -> Result<(), PolicyViolation> {
    match class {
        EscrowClass::OptIn => validate_opt_in(params, op),
        EscrowClass::WithdrawNative => {
            let payment = expect_payment(op, 0)?;
            if payment.receiver != params.admin {
                return Err(PolicyViolation::ReceiverMismatch { leg: 0 });
            }
            check_spend_hygiene(op, 0, params.max_fee)
        }
        EscrowClass::WithdrawAsset => {
            let transfer = expect_asset_transfer(op, 0, params.asset_id)?;
            if transfer.receiver != params.admin {
                return Err(PolicyViolation::ReceiverMismatch { leg: 0 });
            }
            check_spend_hygiene(op, 0, params.max_fee)
        }
        _ => Err(PolicyViolation::UnsupportedShape { legs: 1 }),
    }
}

fn validate_opt_in(params: &EscrowParams, op: &Operation) -> Result<(), PolicyViolation> {
    let transfer = expect_asset_transfer(op, 0, params.asset_id)?;
    if transfer.amount != 0 {
        return Err(PolicyViolation::NonZeroAmount {
            leg: 0,
            amount: transfer.amount,
        });
    }
    check_spend_hygiene(op, 0, params.max_fee)?;
    // A leased, short-lived opt-in is admitted at most once per window.
    check_lease(op, 0, opt_in_lease())?;
    check_window(op, 0, MAX_LEASE_WINDOW)
}

// ---------------------------------------------------------------------------
// Swap classes
// ---------------------------------------------------------------------------

const USER: usize = SwapLeg::User as usize;
const COUNTER: usize = SwapLeg::Counter as usize;
const APPROVAL: usize = SwapLeg::Approval as usize;

fn validate_swap(
    params: &EscrowParams,
    class: EscrowClass,
    legs: SwapLegs<'_>,
) -> Result<(), PolicyViolation> {
    match class {
        EscrowClass::SwapNativeForAsset => validate_native_for_asset(params, legs)?,
        EscrowClass::SwapAssetForNative => validate_asset_for_native(params, legs)?,
        _ => return Err(PolicyViolation::UnsupportedShape { legs: 3 }),
    }
    check_zero_approval(legs.approval, APPROVAL, Some(params.admin), params.max_fee)
}

/// Buyer pays native into the escrow; the escrow pays the asset back.
fn validate_native_for_asset(params: &EscrowParams, legs: SwapLegs<'_>) -> Result<(), PolicyViolation> {
    let payment = expect_payment(legs.user, USER)?;
    if payment.receiver != legs.counter.sender() {
        return Err(PolicyViolation::ReceiverMismatch { leg: USER });
    }
    check_fee(legs.user, USER, params.max_fee)?;

    let transfer = expect_asset_transfer(legs.counter, COUNTER, params.asset_id)?;
    if transfer.receiver != legs.user.sender() {
        return Err(PolicyViolation::ReceiverMismatch { leg: COUNTER });
    }
    if transfer.amount < params.min_asset_amount {
        return Err(PolicyViolation::AmountBelowMinimum {
            leg: COUNTER,
            amount: transfer.amount,
            min: params.min_asset_amount,
        });
    }
    check_spend_hygiene(legs.counter, COUNTER, params.max_fee)
}

/// Buyer pays the asset into the escrow; the escrow pays native back.
fn validate_asset_for_native(params: &EscrowParams, legs: SwapLegs<'_>) -> Result<(), PolicyViolation> {
    let transfer = expect_asset_transfer(legs.user, USER, params.asset_id)?;
    if transfer.amount < params.min_asset_amount {
        return Err(PolicyViolation::AmountBelowMinimum {
            leg: USER,
            amount: transfer.amount,
            min: params.min_asset_amount,
        });
    }
    if transfer.receiver != legs.counter.sender() {
        return Err(PolicyViolation::ReceiverMismatch { leg: USER });
    }
    check_spend_hygiene(legs.user, USER, params.max_fee)?;

    let payment = expect_payment(legs.counter, COUNTER)?;
    if payment.receiver != legs.user.sender() {
        return Err(PolicyViolation::ReceiverMismatch { leg: COUNTER });
    }
    check_spend_hygiene(legs.counter, COUNTER, params.max_fee)
}
