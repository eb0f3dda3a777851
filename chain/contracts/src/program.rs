//! Program encoding and address derivation
//!
//! A program is compiled to canonical bytes (versioned JSON). The address of
//! a program-controlled account is `SHA-512/256("Program" || bytes)`, so the
//! escrow address follows from its parameters alone and no key exists for it.

use serde::{Deserialize, Serialize};
use types::group::TransactionGroup;
use types::ids::{tagged_digest, Address, PROGRAM_DOMAIN};

use crate::delegated::DelegatedAuthorization;
use crate::errors::PolicyViolation;
use crate::escrow::{self, EscrowParams};

/// Current program format version.
pub const PROGRAM_VERSION: u8 = 1;

/// An authorization program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum Program {
    Escrow(EscrowParams),
    Delegated(DelegatedAuthorization),
}

#[derive(Serialize, Deserialize)]
struct CompiledProgram {
    version: u8,
    program: Program,
}

/// Address of the account controlled by `bytes`.
pub fn program_address(bytes: &[u8]) -> Address {
    Address::from_bytes(tagged_digest(PROGRAM_DOMAIN, &[bytes]))
}

impl Program {
    /// Canonical program bytes.
    pub fn compile(&self) -> Vec<u8> {
        let compiled = CompiledProgram {
            version: PROGRAM_VERSION,
            program: self.clone(),
        };
        serde_json::to_vec(&compiled).expect("Program serialization must not fail")
    }

    /// Parse compiled program bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, PolicyViolation> {
        let compiled: CompiledProgram =
            serde_json::from_slice(bytes).map_err(|e| PolicyViolation::Decode {
                reason: e.to_string(),
            })?;
        if compiled.version != PROGRAM_VERSION {
            return Err(PolicyViolation::UnsupportedVersion {
                version: compiled.version,
            });
        }
        Ok(compiled.program)
    }

    /// Address of the account this program controls.
    pub fn address(&self) -> Address {
        program_address(&self.compile())
    }

    /// Run the program for the leg at `leg_index`.
    pub fn evaluate(&self, group: &TransactionGroup, leg_index: usize) -> Result<(), PolicyViolation> {
        match self {
            Program::Escrow(params) => escrow::evaluate(params, group, leg_index)
                .into_result()
                .map(|_| ()),
            Program::Delegated(auth) => auth.evaluate(group, leg_index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegated::SwapDirection;
    use types::ids::AssetId;

    fn escrow_program(min: u64) -> Program {
        Program::Escrow(EscrowParams {
            admin: Address::from_bytes([1u8; 32]),
            asset_id: AssetId(42),
            min_asset_amount: min,
            max_fee: 1000,
        })
    }

    #[test]
    fn test_compile_decode_roundtrip() {
        let program = escrow_program(10);
        let bytes = program.compile();
        assert_eq!(Program::decode(&bytes).unwrap(), program);

        let delegated = Program::Delegated(DelegatedAuthorization {
            direction: SwapDirection::NativeForAsset,
            escrow: program.address(),
            ceiling: 100,
            counter_amount: 500,
            asset_id: AssetId(42),
            max_fee: 1000,
        });
        assert_eq!(Program::decode(&delegated.compile()).unwrap(), delegated);
    }

    #[test]
    fn test_address_derived_from_parameters() {
        assert_eq!(escrow_program(10).address(), escrow_program(10).address());
        assert_ne!(escrow_program(10).address(), escrow_program(11).address());
        assert_eq!(
            escrow_program(10).address(),
            program_address(&escrow_program(10).compile())
        );
    }

    #[test]
    fn test_decode_garbage_rejected() {
        assert!(matches!(
            Program::decode(b"not a program"),
            Err(PolicyViolation::Decode { .. })
        ));
    }

    #[test]
    fn test_decode_unknown_version_rejected() {
        let mut value: serde_json::Value =
            serde_json::from_slice(&escrow_program(10).compile()).unwrap();
        value["version"] = serde_json::json!(2);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert_eq!(
            Program::decode(&bytes),
            Err(PolicyViolation::UnsupportedVersion { version: 2 })
        );
    }
}
