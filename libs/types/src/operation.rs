//! Ledger operations (single legs of a transaction group)
//!
//! Two operation kinds are relevant to the exchange:
//! - `Payment`: native currency transfer
//! - `AssetTransfer`: ledger-asset transfer, including opt-in (zero amount to self)
//!
//! Optional address fields use `None` for "not set"; a `Some(Address::ZERO)`
//! is treated the same way by every check, matching the ledger's semantics.

use serde::{Deserialize, Serialize};

use crate::ids::{tagged_digest, Address, AssetId, GroupId, Lease, TxId};

/// Round range during which a transaction may be included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub first_valid: u64,
    pub last_valid: u64,
}

impl ValidityWindow {
    pub fn new(first_valid: u64, last_valid: u64) -> Self {
        Self {
            first_valid,
            last_valid,
        }
    }

    /// Window of `rounds` rounds starting at `first_valid`.
    pub fn starting_at(first_valid: u64, rounds: u64) -> Self {
        Self::new(first_valid, first_valid.saturating_add(rounds))
    }

    pub fn contains(&self, round: u64) -> bool {
        self.first_valid <= round && round <= self.last_valid
    }

    /// Number of rounds spanned (`last_valid - first_valid`).
    pub fn length(&self) -> u64 {
        self.last_valid.saturating_sub(self.first_valid)
    }
}

/// Fields common to every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub sender: Address,
    /// Fee in native smallest units, paid by `sender`
    pub fee: u64,
    pub validity: ValidityWindow,
    pub lease: Option<Lease>,
    pub rekey_to: Option<Address>,
    pub note: Option<String>,
    /// Set once the leg is bound into an atomic group
    pub group: Option<GroupId>,
}

impl Header {
    pub fn new(sender: Address, fee: u64, validity: ValidityWindow) -> Self {
        Self {
            sender,
            fee,
            validity,
            lease: None,
            rekey_to: None,
            note: None,
            group: None,
        }
    }

    /// Lease tag, with the zero tag folded into `None`.
    pub fn active_lease(&self) -> Option<Lease> {
        self.lease.filter(|l| !l.is_zero())
    }
}

/// Native currency transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub receiver: Address,
    pub amount: u64,
    /// Closes the sender's account, sweeping its remainder to this address
    pub close_remainder_to: Option<Address>,
}

/// Ledger-asset transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetTransfer {
    pub asset_id: AssetId,
    pub receiver: Address,
    pub amount: u64,
    /// Closes the sender's holding of the asset into this address
    pub close_assets_to: Option<Address>,
    /// Revocation (clawback) source; when set, funds move from this address
    /// instead of the signer
    pub asset_sender: Option<Address>,
}

/// Operation body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationBody {
    Payment(Payment),
    AssetTransfer(AssetTransfer),
}

/// A single ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub header: Header,
    pub body: OperationBody,
}

impl Operation {
    /// Native payment with no optional fields set.
    pub fn payment(header: Header, receiver: Address, amount: u64) -> Self {
        Self {
            header,
            body: OperationBody::Payment(Payment {
                receiver,
                amount,
                close_remainder_to: None,
            }),
        }
    }

    /// Asset transfer with no optional fields set.
    pub fn asset_transfer(header: Header, asset_id: AssetId, receiver: Address, amount: u64) -> Self {
        Self {
            header,
            body: OperationBody::AssetTransfer(AssetTransfer {
                asset_id,
                receiver,
                amount,
                close_assets_to: None,
                asset_sender: None,
            }),
        }
    }

    pub fn with_lease(mut self, lease: Lease) -> Self {
        self.header.lease = Some(lease);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.header.note = Some(note.into());
        self
    }

    pub fn sender(&self) -> Address {
        self.header.sender
    }

    pub fn fee(&self) -> u64 {
        self.header.fee
    }

    /// Receiver of the transferred value, whatever the kind.
    pub fn receiver(&self) -> Address {
        match &self.body {
            OperationBody::Payment(p) => p.receiver,
            OperationBody::AssetTransfer(t) => t.receiver,
        }
    }

    /// Transferred amount in the smallest unit of the moved asset.
    pub fn amount(&self) -> u64 {
        match &self.body {
            OperationBody::Payment(p) => p.amount,
            OperationBody::AssetTransfer(t) => t.amount,
        }
    }

    pub fn as_payment(&self) -> Option<&Payment> {
        match &self.body {
            OperationBody::Payment(p) => Some(p),
            OperationBody::AssetTransfer(_) => None,
        }
    }

    pub fn as_asset_transfer(&self) -> Option<&AssetTransfer> {
        match &self.body {
            OperationBody::AssetTransfer(t) => Some(t),
            OperationBody::Payment(_) => None,
        }
    }

    /// Canonical encoding used for identifiers and signatures.
    ///
    /// `serde_json` emits struct fields in declaration order, so equal
    /// operations always produce identical bytes.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("Operation serialization must not fail")
    }

    /// Bytes covered by a key signature: `"TX" || canonical bytes`.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = b"TX".to_vec();
        bytes.extend_from_slice(&self.canonical_bytes());
        bytes
    }

    /// Transaction identifier (includes the group id once assigned).
    pub fn txid(&self) -> TxId {
        TxId::from_bytes(tagged_digest(b"TX", &[self.canonical_bytes().as_slice()]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 32])
    }

    fn header() -> Header {
        Header::new(addr(1), 1000, ValidityWindow::starting_at(10, 1000))
    }

    #[test]
    fn test_validity_window_contains() {
        let w = ValidityWindow::new(10, 20);
        assert!(w.contains(10));
        assert!(w.contains(20));
        assert!(!w.contains(9));
        assert!(!w.contains(21));
        assert_eq!(w.length(), 10);
    }

    #[test]
    fn test_txid_deterministic() {
        let a = Operation::payment(header(), addr(2), 500);
        let b = Operation::payment(header(), addr(2), 500);
        assert_eq!(a.txid(), b.txid());
    }

    #[test]
    fn test_txid_changes_with_content() {
        let a = Operation::payment(header(), addr(2), 500);
        let b = Operation::payment(header(), addr(2), 501);
        assert_ne!(a.txid(), b.txid());
    }

    #[test]
    fn test_txid_covers_lease() {
        let a = Operation::payment(header(), addr(2), 500);
        let b = a.clone().with_lease(Lease::from_label("x"));
        assert_ne!(a.txid(), b.txid());
    }

    #[test]
    fn test_accessors() {
        let op = Operation::asset_transfer(header(), AssetId(9), addr(3), 77);
        assert_eq!(op.sender(), addr(1));
        assert_eq!(op.receiver(), addr(3));
        assert_eq!(op.amount(), 77);
        assert!(op.as_payment().is_none());
        assert_eq!(op.as_asset_transfer().unwrap().asset_id, AssetId(9));
    }

    #[test]
    fn test_zero_lease_is_inactive() {
        let mut h = header();
        h.lease = Some(Lease::ZERO);
        assert_eq!(h.active_lease(), None);
    }

    #[test]
    fn test_operation_serialization_roundtrip() {
        let op = Operation::asset_transfer(header(), AssetId(9), addr(3), 77).with_note("swap");
        let json = serde_json::to_string(&op).unwrap();
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
        assert_eq!(op.txid(), back.txid());
    }
}
