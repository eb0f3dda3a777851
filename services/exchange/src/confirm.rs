//! Confirmation wait
//!
//! Polls the ledger for a submitted group with exponential backoff, bounded
//! by an overall timeout. Dropping the returned future cancels the wait.

use std::time::Duration;

use tracing::{debug, info, warn};
use types::ids::TxId;

use crate::error::ExchangeError;
use crate::ledger::{LedgerClient, PendingInfo};

/// Bounds for a confirmation wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
        }
    }
}

/// Wait until `txid` is included in a block. Returns the confirmed round.
pub async fn wait_for_confirmation<L: LedgerClient + ?Sized>(
    ledger: &L,
    txid: &TxId,
    policy: &ConfirmationPolicy,
) -> Result<u64, ExchangeError> {
    match tokio::time::timeout(policy.timeout, poll_until_confirmed(ledger, txid, policy)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(%txid, waited_ms = policy.timeout.as_millis() as u64, "Confirmation timed out");
            Err(ExchangeError::ConfirmationTimeout {
                txid: *txid,
                waited: policy.timeout,
            })
        }
    }
}

async fn poll_until_confirmed<L: LedgerClient + ?Sized>(
    ledger: &L,
    txid: &TxId,
    policy: &ConfirmationPolicy,
) -> Result<u64, ExchangeError> {
    let mut backoff = policy.initial_backoff;
    loop {
        match ledger.pending_info(txid).await? {
            PendingInfo::Confirmed { round } => {
                info!(%txid, round, "Transaction confirmed");
                return Ok(round);
            }
            PendingInfo::Dropped { reason } => {
                warn!(%txid, reason = %reason, "Transaction dropped from pool");
                return Err(ExchangeError::PolicyRejected { reason });
            }
            PendingInfo::Pending => {
                debug!(%txid, backoff_ms = backoff.as_millis() as u64, "Waiting for confirmation");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(policy.max_backoff);
            }
        }
    }
}
