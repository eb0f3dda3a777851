//! Signing — Leg Authorization Layer
//!
//! Key material and authorization for ledger legs:
//! - Ed25519 keypairs whose public key is the ledger address
//! - Key signatures over a leg's canonical bytes
//! - Program and delegated-program authorizations
//! - Signed atomic groups ready for submission
//!
//! # Determinism
//! Signing is deterministic: equal operations signed by the same key always
//! produce identical signatures.

pub mod keys;
pub mod signing;

pub use keys::Keypair;
pub use signing::{
    delegate_program, sign_leg, sign_operation, sign_with_delegation, sign_with_program,
    verify_delegation, verify_key_signature, Authorization, LegSigner, SignedDelegation,
    SignedGroup, SignedTransaction, SigningError,
};

/// Crate version constant
pub const SIGNING_VERSION: &str = "1.0.0";
