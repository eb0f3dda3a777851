//! Identifier types for ledger entities
//!
//! Addresses are raw 32-byte ed25519 public keys (or program hashes for
//! escrow accounts). Transaction and group identifiers are SHA-512/256
//! digests over domain-separated canonical bytes, so they are fully
//! deterministic and can be recomputed by any party holding the legs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512_256};
use std::fmt;
use std::str::FromStr;

use crate::errors::IdError;

/// Domain prefix for program hashes and program delegation signatures.
pub const PROGRAM_DOMAIN: &[u8] = b"Program";

/// Domain-separated SHA-512/256 digest: `H(tag || part_0 || part_1 || ...)`.
pub fn tagged_digest(tag: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha512_256::new();
    hasher.update(tag);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn decode_32(value: &str) -> Result<[u8; 32], IdError> {
    let bytes = hex::decode(value).map_err(|_| IdError::InvalidHex {
        value: value.to_string(),
    })?;
    bytes.try_into().map_err(|_| IdError::InvalidLength {
        value: value.to_string(),
    })
}

/// Ledger account identity.
///
/// For key-controlled accounts this is the ed25519 public key. For the
/// escrow it is the hash of its authorization program; no private key
/// exists for such an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(#[serde(with = "hex::serde")] [u8; 32]);

impl Address {
    /// The zero address. Used by the ledger to mean "field not set".
    pub const ZERO: Address = Address([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_32(s).map(Self)
    }
}

/// Role an address plays in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Owns the exchange and approves rates
    Admin,
    /// Counterparty to a swap
    User,
    /// Program-controlled pool of liquidity
    Escrow,
}

/// Ledger asset index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(pub u64);

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction identifier: digest of a single leg's canonical bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(#[serde(with = "hex::serde")] [u8; 32]);

impl TxId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for TxId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_32(s).map(Self)
    }
}

/// Atomic group identifier shared by every leg of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(#[serde(with = "hex::serde")] [u8; 32]);

impl GroupId {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Lease tag.
///
/// While a transaction carrying a lease is inside its validity window, the
/// ledger refuses any other transaction from the same sender with the same
/// tag. This is the only replay guard the exchange relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lease(#[serde(with = "hex::serde")] [u8; 32]);

impl Lease {
    /// No lease.
    pub const ZERO: Lease = Lease([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a lease tag from a protocol label (`H("LEASE" || label)`).
    pub fn from_label(label: &str) -> Self {
        Self(tagged_digest(b"LEASE", &[label.as_bytes()]))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_hex_roundtrip() {
        let addr = Address::from_bytes([7u8; 32]);
        let parsed: Address = addr.to_string().parse().unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn test_address_serializes_as_hex_string() {
        let addr = Address::from_bytes([0xAB; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, back);
    }

    #[test]
    fn test_address_zero() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address::from_bytes([1u8; 32]).is_zero());
    }

    #[test]
    fn test_address_parse_rejects_bad_input() {
        assert!(matches!(
            "zz".parse::<Address>(),
            Err(IdError::InvalidHex { .. })
        ));
        assert!(matches!(
            "abcd".parse::<Address>(),
            Err(IdError::InvalidLength { .. })
        ));
    }

    #[test]
    fn test_lease_from_label_is_stable() {
        let a = Lease::from_label("chad-swap/v1");
        let b = Lease::from_label("chad-swap/v1");
        assert_eq!(a, b);
        assert_ne!(a, Lease::from_label("chad-optin/v1"));
        assert!(!a.is_zero());
    }

    #[test]
    fn test_tagged_digest_domain_separation() {
        let tx = tagged_digest(b"TX", &[b"payload".as_slice()]);
        let tg = tagged_digest(b"TG", &[b"payload".as_slice()]);
        assert_ne!(tx, tg);
    }
}
