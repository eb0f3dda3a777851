//! Delegated swap authorization
//!
//! A user signs this program once; the exchange can then submit exactly one
//! bounded swap on the user's behalf without a second interactive signature.
//! The program authorizes only the user's own leg (leg 0) of a three-leg
//! swap group:
//!
//! - leg 0: user → escrow, at most `ceiling`, carrying the swap lease tag
//! - leg 1: escrow → user, exactly `counter_amount`
//! - leg 2: zero-amount approval payment
//!
//! The lease tag is the replay guard. While a leased leg 0 from the signer is
//! inside its validity window the ledger refuses any other leg 0 with the
//! same tag, so a user has at most one outstanding delegated swap.

use serde::{Deserialize, Serialize};
use types::group::{GroupShape, SwapLeg, SwapLegs, TransactionGroup};
use types::ids::{Address, AssetId, Lease};
use types::operation::Operation;

use crate::errors::PolicyViolation;
use crate::security::{
    check_fee, check_lease, check_spend_hygiene, check_zero_approval, expect_asset_transfer,
    expect_payment,
};

/// Label of the lease identifying this exchange's swap protocol.
pub const SWAP_LEASE_LABEL: &str = "chad-exchange/swap/v1";

/// Lease tag every delegated leg 0 must carry.
pub fn swap_lease() -> Lease {
    Lease::from_label(SWAP_LEASE_LABEL)
}

/// What the user spends, from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapDirection {
    /// User pays native currency, receives the asset
    NativeForAsset,
    /// User pays the asset, receives native currency
    AssetForNative,
}

/// Parameters of one user's delegated swap program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedAuthorization {
    pub direction: SwapDirection,
    /// Exchange escrow address the user pays into
    pub escrow: Address,
    /// Most the user spends (smallest units of the spent asset)
    pub ceiling: u64,
    /// Exact amount the user receives (smallest units of the received asset)
    pub counter_amount: u64,
    pub asset_id: AssetId,
    pub max_fee: u64,
}

const USER: usize = SwapLeg::User as usize;
const COUNTER: usize = SwapLeg::Counter as usize;
const APPROVAL: usize = SwapLeg::Approval as usize;

impl DelegatedAuthorization {
    /// Evaluate the program for the leg at `leg_index`.
    pub fn evaluate(&self, group: &TransactionGroup, leg_index: usize) -> Result<(), PolicyViolation> {
        let legs = match group.shape() {
            GroupShape::Swap(legs) => legs,
            _ => return Err(PolicyViolation::UnsupportedShape { legs: group.len() }),
        };
        if leg_index != USER {
            return Err(PolicyViolation::NotAuthorizedLeg { index: leg_index });
        }
        match self.direction {
            SwapDirection::NativeForAsset => self.validate_native_for_asset(legs)?,
            SwapDirection::AssetForNative => self.validate_asset_for_native(legs)?,
        }
        check_zero_approval(legs.approval, APPROVAL, None, self.max_fee)
    }

    fn validate_native_for_asset(&self, legs: SwapLegs<'_>) -> Result<(), PolicyViolation> {
        let payment = expect_payment(legs.user, USER)?;
        if payment.receiver != self.escrow {
            return Err(PolicyViolation::ReceiverMismatch { leg: USER });
        }
        self.check_user_leg(legs.user, payment.amount)?;

        let transfer = expect_asset_transfer(legs.counter, COUNTER, self.asset_id)?;
        self.check_counter_leg(legs, transfer.receiver, transfer.amount)
    }

    fn validate_asset_for_native(&self, legs: SwapLegs<'_>) -> Result<(), PolicyViolation> {
        let transfer = expect_asset_transfer(legs.user, USER, self.asset_id)?;
        if transfer.receiver != self.escrow {
            return Err(PolicyViolation::ReceiverMismatch { leg: USER });
        }
        self.check_user_leg(legs.user, transfer.amount)?;

        let payment = expect_payment(legs.counter, COUNTER)?;
        self.check_counter_leg(legs, payment.receiver, payment.amount)
    }

    fn check_user_leg(&self, op: &Operation, amount: u64) -> Result<(), PolicyViolation> {
        if amount > self.ceiling {
            return Err(PolicyViolation::AmountAboveCeiling {
                leg: USER,
                amount,
                ceiling: self.ceiling,
            });
        }
        check_spend_hygiene(op, USER, self.max_fee)?;
        check_lease(op, USER, swap_lease())
    }

    fn check_counter_leg(
        &self,
        legs: SwapLegs<'_>,
        receiver: Address,
        amount: u64,
    ) -> Result<(), PolicyViolation> {
        if legs.counter.sender() != self.escrow {
            return Err(PolicyViolation::SenderMismatch { leg: COUNTER });
        }
        if receiver != legs.user.sender() {
            return Err(PolicyViolation::ReceiverMismatch { leg: COUNTER });
        }
        if amount != self.counter_amount {
            return Err(PolicyViolation::AmountMismatch {
                leg: COUNTER,
                amount,
                expected: self.counter_amount,
            });
        }
        check_fee(legs.counter, COUNTER, self.max_fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::group::SwapGroup;
    use types::operation::{Header, OperationBody, ValidityWindow};

    const ASSET: AssetId = AssetId(42);

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    fn escrow() -> Address {
        addr(2)
    }

    fn user() -> Address {
        addr(3)
    }

    fn header(sender: Address) -> Header {
        Header::new(sender, 1000, ValidityWindow::starting_at(100, 500))
    }

    fn buy_auth() -> DelegatedAuthorization {
        DelegatedAuthorization {
            direction: SwapDirection::NativeForAsset,
            escrow: escrow(),
            ceiling: 100,
            counter_amount: 500,
            asset_id: ASSET,
            max_fee: 1000,
        }
    }

    fn sell_auth() -> DelegatedAuthorization {
        DelegatedAuthorization {
            direction: SwapDirection::AssetForNative,
            ..buy_auth()
        }
    }

    fn buy_group(amount: u64, counter: u64) -> TransactionGroup {
        SwapGroup {
            user_leg: Operation::payment(header(user()), escrow(), amount).with_lease(swap_lease()),
            counter_leg: Operation::asset_transfer(header(escrow()), ASSET, user(), counter),
            approval_leg: Operation::payment(header(addr(1)), escrow(), 0),
        }
        .into_group()
        .unwrap()
    }

    fn sell_group(amount: u64, counter: u64) -> SwapGroup {
        SwapGroup {
            user_leg: Operation::asset_transfer(header(user()), ASSET, escrow(), amount)
                .with_lease(swap_lease()),
            counter_leg: Operation::payment(header(escrow()), user(), counter),
            approval_leg: Operation::payment(header(addr(1)), escrow(), 0),
        }
    }

    #[test]
    fn test_within_ceiling_accepted() {
        assert_eq!(buy_auth().evaluate(&buy_group(90, 500), 0), Ok(()));
        assert_eq!(buy_auth().evaluate(&buy_group(100, 500), 0), Ok(()));
    }

    #[test]
    fn test_above_ceiling_rejected() {
        assert_eq!(
            buy_auth().evaluate(&buy_group(110, 500), 0),
            Err(PolicyViolation::AmountAboveCeiling {
                leg: 0,
                amount: 110,
                ceiling: 100
            })
        );
    }

    #[test]
    fn test_counter_amount_must_be_exact() {
        assert!(matches!(
            buy_auth().evaluate(&buy_group(90, 499), 0),
            Err(PolicyViolation::AmountMismatch { leg: 1, .. })
        ));
        assert!(matches!(
            buy_auth().evaluate(&buy_group(90, 501), 0),
            Err(PolicyViolation::AmountMismatch { leg: 1, .. })
        ));
    }

    #[test]
    fn test_missing_lease_rejected() {
        let mut legs = buy_group(90, 500).into_legs();
        legs[0].header.lease = None;
        let group = TransactionGroup::new(legs).unwrap();
        assert_eq!(
            buy_auth().evaluate(&group, 0),
            Err(PolicyViolation::LeaseMismatch { leg: 0 })
        );
    }

    #[test]
    fn test_only_leg_zero_authorized() {
        assert_eq!(
            buy_auth().evaluate(&buy_group(90, 500), 1),
            Err(PolicyViolation::NotAuthorizedLeg { index: 1 })
        );
    }

    #[test]
    fn test_single_leg_rejected() {
        let op = Operation::payment(header(user()), escrow(), 50).with_lease(swap_lease());
        let group = TransactionGroup::new(vec![op]).unwrap();
        assert_eq!(
            buy_auth().evaluate(&group, 0),
            Err(PolicyViolation::UnsupportedShape { legs: 1 })
        );
    }

    #[test]
    fn test_payment_to_other_address_rejected() {
        let mut legs = buy_group(90, 500).into_legs();
        legs[0] = Operation::payment(header(user()), addr(9), 90).with_lease(swap_lease());
        let group = TransactionGroup::new(legs).unwrap();
        assert_eq!(
            buy_auth().evaluate(&group, 0),
            Err(PolicyViolation::ReceiverMismatch { leg: 0 })
        );
    }

    #[test]
    fn test_counter_must_come_from_escrow() {
        let mut legs = buy_group(90, 500).into_legs();
        legs[1] = Operation::asset_transfer(header(addr(8)), ASSET, user(), 500);
        let group = TransactionGroup::new(legs).unwrap();
        assert_eq!(
            buy_auth().evaluate(&group, 0),
            Err(PolicyViolation::SenderMismatch { leg: 1 })
        );
    }

    #[test]
    fn test_direction_is_bound() {
        // A buy program cannot approve the user selling the asset.
        let group = sell_group(90, 500).into_group().unwrap();
        assert!(matches!(
            buy_auth().evaluate(&group, 0),
            Err(PolicyViolation::WrongKind { leg: 0, .. })
        ));
        assert_eq!(sell_auth().evaluate(&group, 0), Ok(()));
    }

    #[test]
    fn test_sell_close_assets_rejected() {
        let mut swap = sell_group(90, 500);
        if let OperationBody::AssetTransfer(t) = &mut swap.user_leg.body {
            t.close_assets_to = Some(addr(9));
        }
        assert_eq!(
            sell_auth().evaluate(&swap.into_group().unwrap(), 0),
            Err(PolicyViolation::CloseOutSet { leg: 0 })
        );
    }

    #[test]
    fn test_sell_rekey_rejected() {
        let mut swap = sell_group(90, 500);
        swap.user_leg.header.rekey_to = Some(addr(9));
        assert_eq!(
            sell_auth().evaluate(&swap.into_group().unwrap(), 0),
            Err(PolicyViolation::RekeySet { leg: 0 })
        );
    }

    #[test]
    fn test_nonzero_approval_rejected() {
        let mut legs = buy_group(90, 500).into_legs();
        legs[2] = Operation::payment(header(addr(1)), escrow(), 7);
        let group = TransactionGroup::new(legs).unwrap();
        assert!(matches!(
            buy_auth().evaluate(&group, 0),
            Err(PolicyViolation::NonZeroAmount { leg: 2, amount: 7 })
        ));
    }

    #[test]
    fn test_swap_lease_is_fixed() {
        assert_eq!(swap_lease(), Lease::from_label(SWAP_LEASE_LABEL));
        assert_ne!(swap_lease(), crate::escrow::opt_in_lease());
    }
}
