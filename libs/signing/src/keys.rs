//! Ed25519 key material
//!
//! A ledger account's address is its ed25519 verifying key. Secret seeds are
//! exchanged as hex strings (configuration, test vectors) and never printed.

use ed25519_dalek::{Signature, Signer, SigningKey};
use rand::rngs::OsRng;
use std::fmt;
use types::ids::Address;

use crate::signing::SigningError;

/// A signing keypair whose public half is a ledger address.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a fresh random keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Keypair from a hex-encoded 32-byte seed.
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self, SigningError> {
        let bytes = hex::decode(seed_hex.trim()).map_err(|_| SigningError::InvalidSeed)?;
        let seed: [u8; 32] = bytes.try_into().map_err(|_| SigningError::InvalidSeed)?;
        Ok(Self::from_seed(&seed))
    }

    /// Ledger address (the verifying key bytes).
    pub fn address(&self) -> Address {
        Address::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign raw bytes.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address().to_string())
            .finish_non_exhaustive()
    }
}
