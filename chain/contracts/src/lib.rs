//! Authorization Programs for the Chad Swap Exchange
//!
//! Pure decision functions the ledger runtime evaluates before moving funds
//! out of a program-controlled account.
//!
//! # Modules
//! - `errors`: Policy violation taxonomy
//! - `security`: Shared per-leg guards (fee ceiling, close/rekey, leases)
//! - `escrow`: Escrow account classifier and validator
//! - `delegated`: Per-user delegated swap authorization
//! - `program`: Program encoding, address derivation and dispatch
//!
//! # Version
//! v0.1.0 — Program format version 1

pub mod errors;
pub mod security;
pub mod escrow;
pub mod delegated;
pub mod program;

/// Program ABI version — frozen after release
pub const CONTRACT_ABI_VERSION: &str = "1.0.0";
