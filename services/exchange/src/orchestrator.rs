//! Exchange orchestrator
//!
//! Turns deposit, withdraw and swap intents into atomic groups, signs each
//! leg with the right authority, submits the group and waits for it to be
//! confirmed.
//!
//! Leg authorities:
//! - admin legs: admin key signature
//! - escrow legs: the escrow program itself (no key exists for the escrow)
//! - buyer legs: the buyer's key, or a program the buyer delegated to
//!
//! Escrow legs are checked against the escrow program locally before
//! submission; the ledger stays authoritative. Rejected groups are never
//! retried here.

use std::sync::Arc;

use contracts::delegated::{swap_lease, DelegatedAuthorization, SwapDirection};
use contracts::escrow::{self, opt_in_lease, EscrowClass, EscrowParams};
use contracts::program::{program_address, Program};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use signing::{verify_delegation, Authorization, Keypair, LegSigner, SignedDelegation, SignedGroup};
use tracing::{info, warn};
use types::asset::{convert_at_inverse_rate, convert_at_rate, Asset};
use types::group::{SwapGroup, SwapLeg, TransactionGroup};
use types::ids::{Address, GroupId, TxId};
use types::operation::{Header, Operation, ValidityWindow};

use crate::config::ExchangeConfig;
use crate::confirm::wait_for_confirmation;
use crate::error::ExchangeError;
use crate::ledger::{LedgerClient, SuggestedParams};
use crate::oracle::{PriceOracle, Rate};

/// A group included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub txid: TxId,
    pub group_id: Option<GroupId>,
    pub round: u64,
}

/// Outcome of a confirmed swap, amounts in smallest units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapReceipt {
    pub confirmation: Confirmation,
    /// What the user paid into the escrow
    pub paid: u64,
    /// What the escrow paid the user
    pub received: u64,
}

/// A delegated swap program ready for client-side signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedQuote {
    pub authorization: DelegatedAuthorization,
    #[serde(with = "hex::serde")]
    pub program: Vec<u8>,
    pub rate: Rate,
}

const USER: usize = SwapLeg::User as usize;
const COUNTER: usize = SwapLeg::Counter as usize;

/// The exchange orchestrator.
pub struct Exchange<L> {
    config: Arc<ExchangeConfig>,
    ledger: Arc<L>,
    admin: Keypair,
    asset: Asset,
    escrow_params: EscrowParams,
    escrow_program: Vec<u8>,
    escrow_address: Address,
}

impl<L: LedgerClient> Exchange<L> {
    /// Build the orchestrator. Fails on invalid configuration.
    pub fn new(config: Arc<ExchangeConfig>, ledger: Arc<L>) -> Result<Self, ExchangeError> {
        config.validate()?;
        let admin = config.admin_keypair()?;
        let asset = config.asset()?;
        let escrow_params = config.escrow_params();
        let escrow_program = Program::Escrow(escrow_params.clone()).compile();
        let escrow_address = program_address(&escrow_program);

        info!(
            escrow = %escrow_address,
            admin = %admin.address(),
            asset = %asset.unit_name,
            min_asset_amount = escrow_params.min_asset_amount,
            "Exchange initialized"
        );

        Ok(Self {
            config,
            ledger,
            admin,
            asset,
            escrow_params,
            escrow_program,
            escrow_address,
        })
    }

    pub fn escrow_address(&self) -> Address {
        self.escrow_address
    }

    /// Compiled escrow program bytes.
    pub fn escrow_program(&self) -> &[u8] {
        &self.escrow_program
    }

    pub fn admin_address(&self) -> Address {
        self.admin.address()
    }

    /// The traded asset.
    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    // ───────────────────────── Setup ─────────────────────────

    /// Seed the escrow with its minimum native balance.
    pub async fn fund_escrow(&self) -> Result<Confirmation, ExchangeError> {
        let params = self.ledger.suggested_params().await?;
        let op = Operation::payment(
            self.header(&params, self.admin.address()),
            self.escrow_address,
            self.config.escrow_min_balance,
        );
        let signed = SignedGroup::sign(TransactionGroup::new(vec![op])?, &[LegSigner::Key(&self.admin)])?;
        info!(amount = self.config.escrow_min_balance, "Funding escrow");
        self.submit_and_confirm(signed).await
    }

    /// Opt the escrow into the traded asset.
    pub async fn opt_in_escrow(&self) -> Result<Confirmation, ExchangeError> {
        let asset_id = self.escrow_params.asset_id;
        let params = self.ledger.suggested_params().await?;
        let op = Operation::asset_transfer(
            self.header(&params, self.escrow_address),
            asset_id,
            self.escrow_address,
            0,
        )
        .with_lease(opt_in_lease());
        let group = TransactionGroup::new(vec![op])?;
        self.preflight(&group, 0)?;
        let signed = SignedGroup::sign(group, &[LegSigner::Program(&self.escrow_program)])?;
        info!(%asset_id, "Opting escrow into asset");
        self.submit_and_confirm(signed).await
    }

    /// Fund the escrow, then opt it into the asset.
    pub async fn bootstrap(&self) -> Result<Vec<Confirmation>, ExchangeError> {
        let funded = self.fund_escrow().await?;
        let opted_in = self.opt_in_escrow().await?;
        Ok(vec![funded, opted_in])
    }

    // ───────────────────────── Deposit / Withdraw ─────────────────────────

    /// Move `amount` (human units) of `asset` from the admin into the escrow.
    pub async fn deposit_asset(&self, amount: Decimal, asset: &Asset) -> Result<Confirmation, ExchangeError> {
        let smallest = asset.to_smallest_unit(amount)?;
        let params = self.ledger.suggested_params().await?;
        let op = transfer(
            self.header(&params, self.admin.address()),
            asset,
            self.escrow_address,
            smallest,
        );
        let signed = SignedGroup::sign(TransactionGroup::new(vec![op])?, &[LegSigner::Key(&self.admin)])?;
        info!(amount = smallest, unit = %asset.unit_name, "Depositing into escrow");
        self.submit_and_confirm(signed).await
    }

    pub async fn deposit_native(&self, amount: Decimal) -> Result<Confirmation, ExchangeError> {
        self.deposit_asset(amount, &Asset::native()).await
    }

    /// Move `amount` (human units) of `asset` from the escrow to the admin.
    pub async fn withdraw_asset(&self, amount: Decimal, asset: &Asset) -> Result<Confirmation, ExchangeError> {
        let smallest = asset.to_smallest_unit(amount)?;
        let params = self.ledger.suggested_params().await?;
        let op = transfer(
            self.header(&params, self.escrow_address),
            asset,
            self.admin.address(),
            smallest,
        );
        let group = TransactionGroup::new(vec![op])?;
        self.preflight(&group, 0)?;
        let signed = SignedGroup::sign(group, &[LegSigner::Program(&self.escrow_program)])?;
        info!(amount = smallest, unit = %asset.unit_name, "Withdrawing from escrow");
        self.submit_and_confirm(signed).await
    }

    pub async fn withdraw_native(&self, amount: Decimal) -> Result<Confirmation, ExchangeError> {
        self.withdraw_asset(amount, &Asset::native()).await
    }

    // ───────────────────────── Swaps ─────────────────────────

    /// Buyer pays `native_amount` and receives `native_amount × rate` of the
    /// asset. `rate` is asset units per native unit.
    pub async fn swap_native_for_asset(
        &self,
        native_amount: Decimal,
        rate: Decimal,
        buyer: &Keypair,
    ) -> Result<SwapReceipt, ExchangeError> {
        let native = Asset::native();
        let paid = native.to_smallest_unit(native_amount)?;
        let received = convert_at_rate(paid, &native, &self.asset, rate)?;
        let params = self.ledger.suggested_params().await?;

        let swap = SwapGroup {
            user_leg: transfer(self.header(&params, buyer.address()), &native, self.escrow_address, paid),
            counter_leg: transfer(self.header(&params, self.escrow_address), &self.asset, buyer.address(), received),
            approval_leg: self.approval_leg(&params),
        };
        self.execute_swap(swap, LegSigner::Key(buyer), paid, received).await
    }

    /// Buyer pays `asset_amount` and receives `asset_amount / rate` native.
    pub async fn swap_asset_for_native(
        &self,
        asset_amount: Decimal,
        rate: Decimal,
        buyer: &Keypair,
    ) -> Result<SwapReceipt, ExchangeError> {
        let native = Asset::native();
        let paid = self.asset.to_smallest_unit(asset_amount)?;
        let received = convert_at_inverse_rate(paid, &self.asset, &native, rate)?;
        let params = self.ledger.suggested_params().await?;

        let swap = SwapGroup {
            user_leg: transfer(self.header(&params, buyer.address()), &self.asset, self.escrow_address, paid),
            counter_leg: transfer(self.header(&params, self.escrow_address), &native, buyer.address(), received),
            approval_leg: self.approval_leg(&params),
        };
        self.execute_swap(swap, LegSigner::Key(buyer), paid, received).await
    }

    // ───────────────────────── Delegated swaps ─────────────────────────

    /// Delegated program parameters for this exchange.
    pub fn delegated_authorization(
        &self,
        direction: SwapDirection,
        ceiling: u64,
        counter_amount: u64,
    ) -> DelegatedAuthorization {
        DelegatedAuthorization {
            direction,
            escrow: self.escrow_address,
            ceiling,
            counter_amount,
            asset_id: self.escrow_params.asset_id,
            max_fee: self.config.max_fee,
        }
    }

    /// Quote a delegated buy of the asset for at most `native_ceiling`.
    pub async fn quote_delegated_buy<O: PriceOracle + ?Sized>(
        &self,
        oracle: &O,
        native_ceiling: Decimal,
    ) -> Result<DelegatedQuote, ExchangeError> {
        let rate = oracle.fetch_rate().await?;
        let native = Asset::native();
        let ceiling = native.to_smallest_unit(native_ceiling)?;
        let counter = convert_at_rate(ceiling, &native, &self.asset, rate.value)?;
        Ok(self.quote(SwapDirection::NativeForAsset, ceiling, counter, rate))
    }

    /// Quote a delegated sale of at most `asset_ceiling` of the asset.
    pub async fn quote_delegated_sell<O: PriceOracle + ?Sized>(
        &self,
        oracle: &O,
        asset_ceiling: Decimal,
    ) -> Result<DelegatedQuote, ExchangeError> {
        let rate = oracle.fetch_rate().await?;
        let ceiling = self.asset.to_smallest_unit(asset_ceiling)?;
        let counter = convert_at_inverse_rate(ceiling, &self.asset, &Asset::native(), rate.value)?;
        Ok(self.quote(SwapDirection::AssetForNative, ceiling, counter, rate))
    }

    fn quote(&self, direction: SwapDirection, ceiling: u64, counter: u64, rate: Rate) -> DelegatedQuote {
        let authorization = self.delegated_authorization(direction, ceiling, counter);
        let program = Program::Delegated(authorization.clone()).compile();
        info!(
            ?direction,
            ceiling,
            counter_amount = counter,
            rate = %rate.value,
            "Delegated program quoted"
        );
        DelegatedQuote {
            authorization,
            program,
            rate,
        }
    }

    /// Execute a swap the user pre-authorized by signing a delegated program.
    /// `amount` is what the user pays, at most the program's ceiling.
    pub async fn delegated_swap(
        &self,
        delegation: &SignedDelegation,
        amount: u64,
    ) -> Result<SwapReceipt, ExchangeError> {
        verify_delegation(delegation)?;
        let authorization = match Program::decode(&delegation.program)? {
            Program::Delegated(authorization) => authorization,
            Program::Escrow(_) => {
                return Err(ExchangeError::PolicyRejected {
                    reason: "delegation is not a swap program".to_string(),
                })
            }
        };
        if authorization.escrow != self.escrow_address || authorization.asset_id != self.escrow_params.asset_id {
            return Err(ExchangeError::PolicyRejected {
                reason: "delegated program is bound to another exchange".to_string(),
            });
        }

        let user = delegation.signer;
        let native = Asset::native();
        let (paid_asset, received_asset) = match authorization.direction {
            SwapDirection::NativeForAsset => (&native, &self.asset),
            SwapDirection::AssetForNative => (&self.asset, &native),
        };
        let params = self.ledger.suggested_params().await?;
        let swap = SwapGroup {
            user_leg: transfer(self.header(&params, user), paid_asset, self.escrow_address, amount)
                .with_lease(swap_lease()),
            counter_leg: transfer(
                self.header(&params, self.escrow_address),
                received_asset,
                user,
                authorization.counter_amount,
            ),
            approval_leg: self.approval_leg(&params),
        };

        let group = swap.into_group()?;
        Program::Delegated(authorization.clone()).evaluate(&group, USER)?;
        self.preflight(&group, COUNTER)?;
        let signed = SignedGroup::sign(
            group,
            &[
                LegSigner::Delegation(delegation),
                LegSigner::Program(&self.escrow_program),
                LegSigner::Key(&self.admin),
            ],
        )?;
        let confirmation = self.submit_and_confirm(signed).await?;
        info!(
            txid = %confirmation.txid,
            user = %user,
            paid = amount,
            received = authorization.counter_amount,
            "Delegated swap settled"
        );
        Ok(SwapReceipt {
            confirmation,
            paid: amount,
            received: authorization.counter_amount,
        })
    }

    /// Submit a group signed elsewhere and wait for it.
    pub async fn submit_signed_group(&self, group: SignedGroup) -> Result<Confirmation, ExchangeError> {
        let unsigned = group.group()?;
        for (index, tx) in group.transactions().iter().enumerate() {
            if let Authorization::Program { program, delegation: None } = &tx.authorization {
                if *program == self.escrow_program {
                    self.preflight(&unsigned, index)?;
                }
            }
        }
        self.submit_and_confirm(group).await
    }

    // ───────────────────────── Internals ─────────────────────────

    fn header(&self, params: &SuggestedParams, sender: Address) -> Header {
        Header::new(
            sender,
            params.fee,
            ValidityWindow::starting_at(params.first_valid, self.config.validity_rounds),
        )
    }

    fn approval_leg(&self, params: &SuggestedParams) -> Operation {
        Operation::payment(self.header(params, self.admin.address()), self.escrow_address, 0)
    }

    async fn execute_swap(
        &self,
        swap: SwapGroup,
        user: LegSigner<'_>,
        paid: u64,
        received: u64,
    ) -> Result<SwapReceipt, ExchangeError> {
        let group = swap.into_group()?;
        let class = self.preflight(&group, COUNTER)?;
        let signed = SignedGroup::sign(
            group,
            &[user, LegSigner::Program(&self.escrow_program), LegSigner::Key(&self.admin)],
        )?;
        info!(?class, paid, received, "Submitting swap");
        let confirmation = self.submit_and_confirm(signed).await?;
        Ok(SwapReceipt {
            confirmation,
            paid,
            received,
        })
    }

    /// Evaluate the escrow program for the escrow's leg.
    fn preflight(&self, group: &TransactionGroup, escrow_leg: usize) -> Result<EscrowClass, ExchangeError> {
        escrow::evaluate(&self.escrow_params, group, escrow_leg)
            .into_result()
            .map_err(|violation| {
                warn!(error = %violation, "Escrow program would reject group");
                ExchangeError::from(violation)
            })
    }

    async fn submit_and_confirm(&self, signed: SignedGroup) -> Result<Confirmation, ExchangeError> {
        let group_id = signed.group_id();
        let txid = self.ledger.submit(&signed).await.map_err(|err| {
            warn!(error = %err, legs = signed.len(), "Submission refused");
            ExchangeError::from(err)
        })?;
        info!(
            %txid,
            group_id = ?group_id.map(|g| g.to_string()),
            legs = signed.len(),
            "Group submitted"
        );
        let round = wait_for_confirmation(self.ledger.as_ref(), &txid, &self.config.confirmation_policy()).await?;
        Ok(Confirmation {
            txid,
            group_id,
            round,
        })
    }
}

/// Transfer of `asset`: a payment for the native currency, an asset
/// transfer otherwise.
fn transfer(header: Header, asset: &Asset, receiver: Address, amount: u64) -> Operation {
    match asset.id {
        None => Operation::payment(header, receiver, amount),
        Some(asset_id) => Operation::asset_transfer(header, asset_id, receiver, amount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AssetConfig, ConfirmationConfig, OracleConfig};
    use crate::ledger::LocalLedger;
    use types::ids::AssetId;

    fn config() -> ExchangeConfig {
        let admin = Keypair::from_seed(&[1u8; 32]);
        ExchangeConfig {
            admin_address: admin.address(),
            admin_seed_hex: "01".repeat(32),
            asset: AssetConfig {
                id: 42,
                unit_name: "CHAD".to_string(),
                decimals: 6,
            },
            min_asset_amount: 1_000,
            max_fee: 1_000,
            escrow_min_balance: 250_000,
            validity_rounds: 1_000,
            confirmation: ConfirmationConfig::default(),
            oracle: OracleConfig::default(),
        }
    }

    fn exchange(config: ExchangeConfig) -> Result<Exchange<LocalLedger>, ExchangeError> {
        Exchange::new(Arc::new(config), Arc::new(LocalLedger::new()))
    }

    #[test]
    fn test_escrow_address_is_program_hash() {
        let exchange = exchange(config()).unwrap();
        assert_eq!(exchange.escrow_address(), program_address(exchange.escrow_program()));
        assert_eq!(
            Program::decode(exchange.escrow_program()).unwrap(),
            Program::Escrow(exchange.config().escrow_params())
        );
    }

    #[test]
    fn test_rejects_mismatched_admin_seed() {
        let mut config = config();
        config.admin_seed_hex = "02".repeat(32);
        assert!(matches!(
            exchange(config),
            Err(ExchangeError::Configuration(_))
        ));
    }

    #[test]
    fn test_delegated_authorization_bound_to_exchange() {
        let exchange = exchange(config()).unwrap();
        let auth = exchange.delegated_authorization(SwapDirection::NativeForAsset, 100, 300);
        assert_eq!(auth.escrow, exchange.escrow_address());
        assert_eq!(auth.asset_id, AssetId(42));
        assert_eq!(auth.max_fee, 1_000);
    }

    #[test]
    fn test_transfer_picks_operation_kind() {
        let header = Header::new(Address::from_bytes([3u8; 32]), 1_000, ValidityWindow::new(1, 10));
        let to = Address::from_bytes([4u8; 32]);

        let native = transfer(header.clone(), &Asset::native(), to, 5);
        assert!(native.as_payment().is_some());

        let token = Asset::token(AssetId(42), "CHAD", 6).unwrap();
        let asset = transfer(header, &token, to, 5);
        assert_eq!(asset.as_asset_transfer().map(|t| t.asset_id), Some(AssetId(42)));
    }

    #[tokio::test]
    async fn test_swap_without_escrow_opt_in_refused_by_ledger() {
        let ledger = Arc::new(LocalLedger::new().with_auto_confirm());
        let admin = Keypair::from_seed(&[1u8; 32]);
        ledger.fund(admin.address(), 10_000_000);
        let buyer = Keypair::from_seed(&[3u8; 32]);
        ledger.fund(buyer.address(), 10_000_000);
        let exchange = Exchange::new(Arc::new(config()), ledger.clone()).unwrap();

        let err = exchange
            .swap_native_for_asset(Decimal::ONE, Decimal::from(3), &buyer)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::PolicyRejected { .. }));
        assert_eq!(ledger.native_balance(&buyer.address()), 10_000_000);
    }
}
