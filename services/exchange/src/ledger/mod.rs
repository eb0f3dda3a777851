//! Ledger runtime seam
//!
//! The exchange talks to the ledger only through [`LedgerClient`]. The ledger
//! verifies signatures, runs authorization programs, enforces leases and
//! applies each group atomically.

pub mod local;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use signing::SignedGroup;
use thiserror::Error;
use types::ids::{Address, TxId};

pub use local::LocalLedger;

/// Ledger client errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The group was refused; no leg was applied
    #[error("group rejected: {reason}")]
    Rejected { reason: String },

    /// A live lease from the same sender blocks the group
    #[error("lease conflict for sender {sender}")]
    LeaseConflict { sender: Address },

    #[error("ledger unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Current chain status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatus {
    pub last_round: u64,
}

/// Parameters for building new legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedParams {
    /// Flat fee per leg
    pub fee: u64,
    /// First round a new leg may be valid in
    pub first_valid: u64,
}

/// Status of a submitted group, looked up by its first leg's txid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingInfo {
    Pending,
    Confirmed { round: u64 },
    Dropped { reason: String },
}

/// Capability interface to the ledger runtime.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn status(&self) -> Result<LedgerStatus, LedgerError>;

    async fn suggested_params(&self) -> Result<SuggestedParams, LedgerError>;

    /// Submit a signed group atomically. Returns the first leg's txid.
    async fn submit(&self, group: &SignedGroup) -> Result<TxId, LedgerError>;

    async fn pending_info(&self, txid: &TxId) -> Result<PendingInfo, LedgerError>;
}
