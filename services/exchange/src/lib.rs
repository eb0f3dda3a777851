//! Exchange Orchestrator Service
//!
//! Custodial swap desk for a single asset against the native currency.
//! Builds atomic groups, signs each leg with the right authority, submits
//! them to the ledger and waits for confirmation.
//!
//! **Key Invariants:**
//! - Every escrow leg passes the escrow program locally before submission
//! - A swap group is all-or-nothing; no partial fills
//! - A delegated swap executes at most once per lease window
//! - Rejected groups are reported, never retried
//!
//! # Architecture
//!
//! ```text
//!  PriceOracle ──rate──┐
//!                      │
//!               ┌──────▼──────┐    sign     ┌─────────┐
//!  intent ─────►│  Exchange   │───────────► │ signing │
//!               └──────┬──────┘             └─────────┘
//!                      │ submit / poll
//!               ┌──────▼──────┐
//!               │LedgerClient │ ◄── LocalLedger (tests)
//!               └─────────────┘
//! ```

pub mod config;
pub mod confirm;
pub mod error;
pub mod ledger;
pub mod oracle;
pub mod orchestrator;

pub use config::{ConfigError, ExchangeConfig};
pub use confirm::{wait_for_confirmation, ConfirmationPolicy};
pub use error::ExchangeError;
pub use ledger::{LedgerClient, LedgerError, LocalLedger};
pub use oracle::{CachedOracle, CoingeckoOracle, FixedRateOracle, OracleError, PriceOracle, Rate};
pub use orchestrator::{Confirmation, DelegatedQuote, Exchange, SwapReceipt};
