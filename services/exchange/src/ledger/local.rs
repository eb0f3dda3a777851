//! In-memory ledger runtime
//!
//! A single-process stand-in for a sandbox network, used by tests and local
//! runs. It does what the real ledger does for the exchange's groups:
//!
//! - verifies key signatures and delegation signatures (ed25519)
//! - checks that a program leg's sender is the program's own address, or
//!   that the sender delegated to the program
//! - evaluates the authorization programs
//! - enforces validity windows, the minimum fee and leases
//! - applies every leg of a group or none
//!
//! Blocks are produced explicitly with [`LocalLedger::produce_block`], or
//! after every accepted group when auto-confirm is on.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use contracts::program::{program_address, Program};
use contracts::security::is_unset;
use signing::{
    verify_delegation, verify_key_signature, Authorization, SignedDelegation, SignedGroup,
    SignedTransaction,
};
use tracing::{debug, warn};
use types::group::TransactionGroup;
use types::ids::{Address, AssetId, Lease, TxId};
use types::operation::{Operation, OperationBody};

use super::{LedgerClient, LedgerError, LedgerStatus, PendingInfo, SuggestedParams};

/// Minimum fee per leg.
pub const MIN_FEE: u64 = 1000;

// ---------------------------------------------------------------------------
// Lease table
// ---------------------------------------------------------------------------

/// Live lease tags per sender.
///
/// A `(sender, tag)` pair stays taken through the `last_valid` round of the
/// leg that acquired it; no other leg from that sender may reuse the tag
/// until then.
#[derive(Debug, Clone, Default)]
pub struct LeaseTable {
    leases: HashMap<(Address, Lease), u64>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `lease` from `sender` is still held at `round`.
    pub fn is_active(&self, sender: &Address, lease: &Lease, round: u64) -> bool {
        self.leases
            .get(&(*sender, *lease))
            .map_or(false, |last_valid| round <= *last_valid)
    }

    /// Take `lease` for `sender` through `last_valid`. Returns `false` if it
    /// is still held at `round` (replay attempt).
    pub fn acquire(&mut self, sender: Address, lease: Lease, last_valid: u64, round: u64) -> bool {
        if self.is_active(&sender, &lease, round) {
            return false;
        }
        self.leases.insert((sender, lease), last_valid);
        true
    }

    /// Forget leases that expired before `round`.
    pub fn prune(&mut self, round: u64) {
        self.leases.retain(|_, last_valid| *last_valid >= round);
    }

    /// Number of tracked leases.
    pub fn count(&self) -> usize {
        self.leases.len()
    }
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
struct Account {
    native: u64,
    /// Asset holdings; presence means the account opted in
    assets: HashMap<AssetId, u64>,
}

type Accounts = HashMap<Address, Account>;

fn debit_native(accounts: &mut Accounts, address: Address, amount: u64) -> Result<(), String> {
    let account = accounts
        .get_mut(&address)
        .ok_or_else(|| format!("account {} does not exist", address))?;
    account.native = account
        .native
        .checked_sub(amount)
        .ok_or_else(|| format!("account {} has insufficient native balance", address))?;
    Ok(())
}

fn credit_native(accounts: &mut Accounts, address: Address, amount: u64) -> Result<(), String> {
    let account = accounts.entry(address).or_default();
    account.native = account
        .native
        .checked_add(amount)
        .ok_or_else(|| format!("native balance overflow for {}", address))?;
    Ok(())
}

fn asset_holding<'a>(
    accounts: &'a mut Accounts,
    address: Address,
    asset_id: AssetId,
) -> Result<&'a mut u64, String> {
    accounts
        .get_mut(&address)
        .and_then(|a| a.assets.get_mut(&asset_id))
        .ok_or_else(|| format!("account {} is not opted into asset {}", address, asset_id))
}

fn move_asset(
    accounts: &mut Accounts,
    from: Address,
    to: Address,
    asset_id: AssetId,
    amount: u64,
) -> Result<(), String> {
    // Receiver must be opted in even for a zero transfer.
    asset_holding(accounts, to, asset_id)?;
    let source = asset_holding(accounts, from, asset_id)?;
    *source = source
        .checked_sub(amount)
        .ok_or_else(|| format!("account {} has insufficient asset {} balance", from, asset_id))?;
    let target = asset_holding(accounts, to, asset_id)?;
    *target = target
        .checked_add(amount)
        .ok_or_else(|| format!("asset {} balance overflow for {}", asset_id, to))?;
    Ok(())
}

fn apply_leg(accounts: &mut Accounts, op: &Operation) -> Result<(), String> {
    let sender = op.sender();
    if !is_unset(op.header.rekey_to) {
        return Err("rekeying is not supported".to_string());
    }
    debit_native(accounts, sender, op.fee())?;

    match &op.body {
        OperationBody::Payment(p) => {
            debit_native(accounts, sender, p.amount)?;
            credit_native(accounts, p.receiver, p.amount)?;
            if let Some(close_to) = p.close_remainder_to.filter(|a| !a.is_zero()) {
                let rest = accounts.get(&sender).map_or(0, |a| a.native);
                debit_native(accounts, sender, rest)?;
                credit_native(accounts, close_to, rest)?;
            }
        }
        OperationBody::AssetTransfer(t) => {
            if !is_unset(t.asset_sender) {
                return Err("revocation transfers are not supported".to_string());
            }
            if t.receiver == sender && t.amount == 0 {
                accounts
                    .entry(sender)
                    .or_default()
                    .assets
                    .entry(t.asset_id)
                    .or_insert(0);
            } else {
                move_asset(accounts, sender, t.receiver, t.asset_id, t.amount)?;
            }
            if let Some(close_to) = t.close_assets_to.filter(|a| !a.is_zero()) {
                let rest = *asset_holding(accounts, sender, t.asset_id)?;
                move_asset(accounts, sender, close_to, t.asset_id, rest)?;
                if let Some(account) = accounts.get_mut(&sender) {
                    account.assets.remove(&t.asset_id);
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxState {
    Pending,
    Confirmed(u64),
}

#[derive(Debug)]
struct LedgerState {
    /// Last produced round
    round: u64,
    min_fee: u64,
    accounts: Accounts,
    leases: LeaseTable,
    /// Every leg txid ever accepted
    transactions: HashMap<TxId, TxState>,
    pending: Vec<TxId>,
    auto_confirm: bool,
    available: bool,
}

impl LedgerState {
    fn produce_block(&mut self) -> u64 {
        self.round += 1;
        let round = self.round;
        for txid in self.pending.drain(..) {
            self.transactions.insert(txid, TxState::Confirmed(round));
        }
        self.leases.prune(round + 1);
        round
    }
}

/// In-memory ledger runtime.
#[derive(Debug)]
pub struct LocalLedger {
    state: Mutex<LedgerState>,
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalLedger {
    /// Empty ledger at round 1 with manual block production.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState {
                round: 1,
                min_fee: MIN_FEE,
                accounts: HashMap::new(),
                leases: LeaseTable::new(),
                transactions: HashMap::new(),
                pending: Vec::new(),
                auto_confirm: false,
                available: true,
            }),
        }
    }

    /// Produce a block after every accepted group.
    pub fn with_auto_confirm(self) -> Self {
        self.state().auto_confirm = true;
        self
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_auto_confirm(&self, enabled: bool) {
        self.state().auto_confirm = enabled;
    }

    /// Simulate a node outage.
    pub fn set_available(&self, available: bool) {
        self.state().available = available;
    }

    /// Credit native currency out of thin air (genesis / faucet).
    pub fn fund(&self, address: Address, amount: u64) {
        let mut state = self.state();
        let account = state.accounts.entry(address).or_default();
        account.native = account.native.saturating_add(amount);
    }

    /// Create an asset whose whole supply is held by `creator`.
    pub fn create_asset(&self, creator: Address, asset_id: AssetId, total: u64) {
        self.state()
            .accounts
            .entry(creator)
            .or_default()
            .assets
            .insert(asset_id, total);
    }

    pub fn native_balance(&self, address: &Address) -> u64 {
        self.state().accounts.get(address).map_or(0, |a| a.native)
    }

    /// Asset balance, `None` when the account is not opted in.
    pub fn asset_balance(&self, address: &Address, asset_id: AssetId) -> Option<u64> {
        self.state()
            .accounts
            .get(address)
            .and_then(|a| a.assets.get(&asset_id).copied())
    }

    pub fn round(&self) -> u64 {
        self.state().round
    }

    /// Close the current block. Returns the new round.
    pub fn produce_block(&self) -> u64 {
        self.state().produce_block()
    }

    pub fn advance_rounds(&self, rounds: u64) -> u64 {
        let mut state = self.state();
        for _ in 0..rounds {
            state.produce_block();
        }
        state.round
    }

    pub fn active_leases(&self) -> usize {
        self.state().leases.count()
    }

    fn check_available(state: &LedgerState) -> Result<(), LedgerError> {
        if !state.available {
            return Err(LedgerError::Unavailable {
                reason: "node is not reachable".to_string(),
            });
        }
        Ok(())
    }

    fn accept(state: &mut LedgerState, signed: &SignedGroup) -> Result<TxId, LedgerError> {
        let group = signed.group().map_err(|e| LedgerError::Rejected {
            reason: e.to_string(),
        })?;
        let next_round = state.round + 1;

        for (index, tx) in signed.transactions().iter().enumerate() {
            let op = &tx.operation;
            if !op.header.validity.contains(next_round) {
                return Err(rejected(index, format!("round {} outside validity window", next_round)));
            }
            if op.fee() < state.min_fee {
                return Err(rejected(index, format!("fee {} below minimum {}", op.fee(), state.min_fee)));
            }
            authorize_leg(&group, index, tx)?;
        }

        let mut claimed = HashSet::new();
        for op in group.legs() {
            if let Some(lease) = op.header.active_lease() {
                let key = (op.sender(), lease);
                if state.leases.is_active(&key.0, &key.1, next_round) || !claimed.insert(key) {
                    return Err(LedgerError::LeaseConflict { sender: op.sender() });
                }
            }
        }

        let txids: Vec<TxId> = group.legs().iter().map(Operation::txid).collect();
        if txids.iter().any(|t| state.transactions.contains_key(t)) {
            return Err(LedgerError::Rejected {
                reason: "transaction already in ledger".to_string(),
            });
        }

        let mut accounts = state.accounts.clone();
        for (index, op) in group.legs().iter().enumerate() {
            apply_leg(&mut accounts, op).map_err(|reason| rejected(index, reason))?;
        }

        // Commit
        state.accounts = accounts;
        for op in group.legs() {
            if let Some(lease) = op.header.active_lease() {
                state
                    .leases
                    .acquire(op.sender(), lease, op.header.validity.last_valid, next_round);
            }
        }
        for txid in &txids {
            state.transactions.insert(*txid, TxState::Pending);
        }
        state.pending.extend(txids.iter().copied());
        Ok(txids[0])
    }
}

fn rejected(index: usize, reason: impl Into<String>) -> LedgerError {
    LedgerError::Rejected {
        reason: format!("leg {}: {}", index, reason.into()),
    }
}

fn authorize_leg(group: &TransactionGroup, index: usize, tx: &SignedTransaction) -> Result<(), LedgerError> {
    match &tx.authorization {
        Authorization::Key { .. } => {
            verify_key_signature(tx).map_err(|e| rejected(index, e.to_string()))
        }
        Authorization::Program { program, delegation } => {
            let sender = tx.operation.sender();
            match delegation {
                None if program_address(program) != sender => {
                    return Err(rejected(index, "program does not control the sender"));
                }
                None => {}
                Some(signature) => {
                    let delegation = SignedDelegation {
                        signer: sender,
                        program: program.clone(),
                        signature: signature.clone(),
                    };
                    verify_delegation(&delegation).map_err(|e| rejected(index, e.to_string()))?;
                }
            }
            let program = Program::decode(program).map_err(|e| rejected(index, e.to_string()))?;
            program
                .evaluate(group, index)
                .map_err(|e| rejected(index, e.to_string()))
        }
    }
}

#[async_trait]
impl LedgerClient for LocalLedger {
    async fn status(&self) -> Result<LedgerStatus, LedgerError> {
        let state = self.state();
        Self::check_available(&state)?;
        Ok(LedgerStatus {
            last_round: state.round,
        })
    }

    async fn suggested_params(&self) -> Result<SuggestedParams, LedgerError> {
        let state = self.state();
        Self::check_available(&state)?;
        Ok(SuggestedParams {
            fee: state.min_fee,
            first_valid: state.round,
        })
    }

    async fn submit(&self, group: &SignedGroup) -> Result<TxId, LedgerError> {
        let mut state = self.state();
        Self::check_available(&state)?;
        match Self::accept(&mut state, group) {
            Ok(txid) => {
                debug!(%txid, legs = group.len(), round = state.round + 1, "Group accepted");
                if state.auto_confirm {
                    state.produce_block();
                }
                Ok(txid)
            }
            Err(err) => {
                warn!(error = %err, "Group refused");
                Err(err)
            }
        }
    }

    async fn pending_info(&self, txid: &TxId) -> Result<PendingInfo, LedgerError> {
        let state = self.state();
        Self::check_available(&state)?;
        Ok(match state.transactions.get(txid) {
            Some(TxState::Pending) => PendingInfo::Pending,
            Some(TxState::Confirmed(round)) => PendingInfo::Confirmed { round: *round },
            None => PendingInfo::Dropped {
                reason: "unknown transaction".to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signing::{sign_operation, Keypair};
    use types::operation::{Header, ValidityWindow};

    fn key(b: u8) -> Keypair {
        Keypair::from_seed(&[b; 32])
    }

    fn payment(from: &Keypair, to: Address, amount: u64, round: u64) -> SignedGroup {
        let op = Operation::payment(
            Header::new(from.address(), MIN_FEE, ValidityWindow::starting_at(round, 100)),
            to,
            amount,
        );
        SignedGroup::new(vec![sign_operation(op, from).unwrap()]).unwrap()
    }

    // --- LeaseTable tests ---

    #[test]
    fn test_lease_table_blocks_until_expiry() {
        let mut table = LeaseTable::new();
        let sender = Address::from_bytes([1u8; 32]);
        let lease = Lease::from_label("x");
        assert!(table.acquire(sender, lease, 10, 5));
        assert!(!table.acquire(sender, lease, 20, 10), "Replay within window must fail");
        assert!(table.acquire(sender, lease, 20, 11));
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn test_lease_table_is_per_sender() {
        let mut table = LeaseTable::new();
        let lease = Lease::from_label("x");
        assert!(table.acquire(Address::from_bytes([1u8; 32]), lease, 10, 5));
        assert!(table.acquire(Address::from_bytes([2u8; 32]), lease, 10, 5));
    }

    #[test]
    fn test_lease_table_prune() {
        let mut table = LeaseTable::new();
        table.acquire(Address::from_bytes([1u8; 32]), Lease::from_label("x"), 10, 5);
        table.prune(10);
        assert_eq!(table.count(), 1);
        table.prune(11);
        assert_eq!(table.count(), 0);
    }

    // --- Ledger tests ---

    #[tokio::test]
    async fn test_payment_applies_and_confirms() {
        let ledger = LocalLedger::new();
        let alice = key(1);
        let bob = key(2).address();
        ledger.fund(alice.address(), 10_000);

        let txid = ledger.submit(&payment(&alice, bob, 5_000, 1)).await.unwrap();
        assert_eq!(ledger.native_balance(&alice.address()), 4_000);
        assert_eq!(ledger.native_balance(&bob), 5_000);
        assert_eq!(ledger.pending_info(&txid).await.unwrap(), PendingInfo::Pending);

        let round = ledger.produce_block();
        assert_eq!(
            ledger.pending_info(&txid).await.unwrap(),
            PendingInfo::Confirmed { round }
        );
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejected_without_effect() {
        let ledger = LocalLedger::new();
        let alice = key(1);
        ledger.fund(alice.address(), 1_500);
        let err = ledger
            .submit(&payment(&alice, key(2).address(), 1_000, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected { .. }));
        assert_eq!(ledger.native_balance(&alice.address()), 1_500);
    }

    #[tokio::test]
    async fn test_duplicate_submission_rejected() {
        let ledger = LocalLedger::new();
        let alice = key(1);
        ledger.fund(alice.address(), 100_000);
        let group = payment(&alice, key(2).address(), 10, 1);
        ledger.submit(&group).await.unwrap();
        assert!(matches!(
            ledger.submit(&group).await,
            Err(LedgerError::Rejected { reason }) if reason.contains("already")
        ));
    }

    #[tokio::test]
    async fn test_leased_replay_conflicts() {
        let ledger = LocalLedger::new();
        let alice = key(1);
        ledger.fund(alice.address(), 100_000);
        let lease = Lease::from_label("once");
        let make = |amount| {
            let op = Operation::payment(
                Header::new(alice.address(), MIN_FEE, ValidityWindow::starting_at(1, 10)),
                key(2).address(),
                amount,
            )
            .with_lease(lease);
            SignedGroup::new(vec![sign_operation(op, &alice).unwrap()]).unwrap()
        };
        ledger.submit(&make(1)).await.unwrap();
        assert_eq!(
            ledger.submit(&make(2)).await,
            Err(LedgerError::LeaseConflict {
                sender: alice.address()
            })
        );
        assert_eq!(ledger.active_leases(), 1);
    }

    #[tokio::test]
    async fn test_expired_window_rejected() {
        let ledger = LocalLedger::new();
        let alice = key(1);
        ledger.fund(alice.address(), 100_000);
        ledger.advance_rounds(200);
        let err = ledger
            .submit(&payment(&alice, key(2).address(), 10, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected { reason } if reason.contains("validity")));
    }

    #[tokio::test]
    async fn test_tampered_signature_rejected() {
        let ledger = LocalLedger::new();
        let alice = key(1);
        ledger.fund(alice.address(), 100_000);
        let mut signed = payment(&alice, key(2).address(), 10, 1).transactions()[0].clone();
        if let OperationBody::Payment(p) = &mut signed.operation.body {
            p.amount = 99;
        }
        let group = SignedGroup::new(vec![signed]).unwrap();
        assert!(matches!(
            ledger.submit(&group).await,
            Err(LedgerError::Rejected { .. })
        ));
    }

    #[tokio::test]
    async fn test_unavailable_node() {
        let ledger = LocalLedger::new();
        ledger.set_available(false);
        assert!(matches!(
            ledger.status().await,
            Err(LedgerError::Unavailable { .. })
        ));
        ledger.set_available(true);
        assert_eq!(ledger.status().await.unwrap().last_round, 1);
    }

    #[tokio::test]
    async fn test_unknown_txid_is_dropped() {
        let ledger = LocalLedger::new();
        let info = ledger.pending_info(&TxId::from_bytes([5u8; 32])).await.unwrap();
        assert!(matches!(info, PendingInfo::Dropped { .. }));
    }

    #[tokio::test]
    async fn test_auto_confirm() {
        let ledger = LocalLedger::new().with_auto_confirm();
        let alice = key(1);
        ledger.fund(alice.address(), 100_000);
        let txid = ledger
            .submit(&payment(&alice, key(2).address(), 10, 1))
            .await
            .unwrap();
        assert_eq!(
            ledger.pending_info(&txid).await.unwrap(),
            PendingInfo::Confirmed { round: 2 }
        );
    }

    #[test]
    fn test_asset_transfer_requires_opt_in() {
        let mut accounts = Accounts::new();
        let a = Address::from_bytes([1u8; 32]);
        let b = Address::from_bytes([2u8; 32]);
        accounts.entry(a).or_default().native = 10_000;
        accounts.entry(a).or_default().assets.insert(AssetId(7), 100);
        let op = Operation::asset_transfer(
            Header::new(a, MIN_FEE, ValidityWindow::starting_at(1, 10)),
            AssetId(7),
            b,
            10,
        );
        assert!(apply_leg(&mut accounts.clone(), &op).is_err());

        accounts.entry(b).or_default().assets.insert(AssetId(7), 0);
        apply_leg(&mut accounts, &op).unwrap();
        assert_eq!(accounts[&b].assets[&AssetId(7)], 10);
        assert_eq!(accounts[&a].assets[&AssetId(7)], 90);
    }
}
