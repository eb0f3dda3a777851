//! Leg authorization — key signatures, programs, delegated programs
//!
//! Every leg of a group is authorized in exactly one of three ways:
//! - key signature by the sender over `"TX" || canonical bytes`
//! - the escrow's program itself (the sender address is the program hash)
//! - a program the sender delegated to by signing `"Program" || program bytes`
//!
//! Verification of program authorizations beyond the delegation signature
//! (hash matching, program evaluation) is the ledger runtime's job.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use types::errors::GroupError;
use types::group::TransactionGroup;
use types::ids::{Address, GroupId, TxId, PROGRAM_DOMAIN};
use types::operation::Operation;

use crate::keys::Keypair;

// ---------------------------------------------------------------------------
// Delegation
// ---------------------------------------------------------------------------

/// A program signed by a user, authorizing it to approve that user's legs.
///
/// Produced client-side; the exchange only ever holds the signed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedDelegation {
    pub signer: Address,
    #[serde(with = "hex::serde")]
    pub program: Vec<u8>,
    /// Ed25519 signature as hex string
    pub signature: String,
}

fn program_message(program: &[u8]) -> Vec<u8> {
    let mut message = PROGRAM_DOMAIN.to_vec();
    message.extend_from_slice(program);
    message
}

/// Delegate signing authority for `program` from `keypair`.
pub fn delegate_program(keypair: &Keypair, program: &[u8]) -> SignedDelegation {
    let signature = keypair.sign(&program_message(program));
    SignedDelegation {
        signer: keypair.address(),
        program: program.to_vec(),
        signature: hex::encode(signature.to_bytes()),
    }
}

/// Verify that `delegation` was signed by its claimed signer.
pub fn verify_delegation(delegation: &SignedDelegation) -> Result<(), SigningError> {
    verify_bytes(
        &delegation.signer,
        &program_message(&delegation.program),
        &delegation.signature,
    )
}

// ---------------------------------------------------------------------------
// Signed legs
// ---------------------------------------------------------------------------

/// How a leg is authorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Authorization {
    /// Ed25519 signature by the sender, hex encoded
    Key { signature: String },
    /// Program authorization; `delegation` carries the sender's signature
    /// over the program when the sender is a key-controlled account
    Program {
        #[serde(with = "hex::serde")]
        program: Vec<u8>,
        delegation: Option<String>,
    },
}

/// An operation together with its authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub operation: Operation,
    pub authorization: Authorization,
}

impl SignedTransaction {
    pub fn txid(&self) -> TxId {
        self.operation.txid()
    }
}

/// Who authorizes a given leg.
#[derive(Debug, Clone, Copy)]
pub enum LegSigner<'a> {
    Key(&'a Keypair),
    Program(&'a [u8]),
    Delegation(&'a SignedDelegation),
}

/// Sign an operation with the sender's key.
pub fn sign_operation(operation: Operation, keypair: &Keypair) -> Result<SignedTransaction, SigningError> {
    if operation.sender() != keypair.address() {
        return Err(SigningError::SignerMismatch {
            sender: operation.sender().to_string(),
            signer: keypair.address().to_string(),
        });
    }
    let signature = keypair.sign(&operation.signing_bytes());
    Ok(SignedTransaction {
        operation,
        authorization: Authorization::Key {
            signature: hex::encode(signature.to_bytes()),
        },
    })
}

/// Authorize an operation with a program (escrow legs).
pub fn sign_with_program(operation: Operation, program: &[u8]) -> SignedTransaction {
    SignedTransaction {
        operation,
        authorization: Authorization::Program {
            program: program.to_vec(),
            delegation: None,
        },
    }
}

/// Authorize an operation with a program the sender delegated to.
pub fn sign_with_delegation(
    operation: Operation,
    delegation: &SignedDelegation,
) -> Result<SignedTransaction, SigningError> {
    if operation.sender() != delegation.signer {
        return Err(SigningError::SignerMismatch {
            sender: operation.sender().to_string(),
            signer: delegation.signer.to_string(),
        });
    }
    Ok(SignedTransaction {
        operation,
        authorization: Authorization::Program {
            program: delegation.program.clone(),
            delegation: Some(delegation.signature.clone()),
        },
    })
}

/// Authorize one leg with the given signer.
pub fn sign_leg(operation: Operation, signer: LegSigner<'_>) -> Result<SignedTransaction, SigningError> {
    match signer {
        LegSigner::Key(keypair) => sign_operation(operation, keypair),
        LegSigner::Program(program) => Ok(sign_with_program(operation, program)),
        LegSigner::Delegation(delegation) => sign_with_delegation(operation, delegation),
    }
}

/// Verify a key-signed leg against its sender address.
pub fn verify_key_signature(signed: &SignedTransaction) -> Result<(), SigningError> {
    match &signed.authorization {
        Authorization::Key { signature } => verify_bytes(
            &signed.operation.sender(),
            &signed.operation.signing_bytes(),
            signature,
        ),
        Authorization::Program { .. } => Err(SigningError::NotKeySigned),
    }
}

fn verify_bytes(signer: &Address, message: &[u8], signature_hex: &str) -> Result<(), SigningError> {
    let verifying_key =
        VerifyingKey::from_bytes(signer.as_bytes()).map_err(|_| SigningError::InvalidPublicKey)?;
    let sig_bytes = hex::decode(signature_hex).map_err(|_| SigningError::InvalidSignature)?;
    let sig_bytes: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| SigningError::InvalidSignature)?;
    let signature = Signature::from_bytes(&sig_bytes);
    verifying_key
        .verify(message, &signature)
        .map_err(|_| SigningError::VerificationFailed)
}

// ---------------------------------------------------------------------------
// Signed groups
// ---------------------------------------------------------------------------

/// A fully authorized atomic group, legs in group order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedGroup {
    transactions: Vec<SignedTransaction>,
}

impl SignedGroup {
    /// Wrap already-signed legs, checking that they form a consistent group.
    pub fn new(transactions: Vec<SignedTransaction>) -> Result<Self, SigningError> {
        let operations = transactions.iter().map(|t| t.operation.clone()).collect();
        TransactionGroup::from_grouped(operations)?;
        Ok(Self { transactions })
    }

    /// Sign every leg of `group` with the matching entry of `signers`.
    pub fn sign(group: TransactionGroup, signers: &[LegSigner<'_>]) -> Result<Self, SigningError> {
        if group.len() != signers.len() {
            return Err(SigningError::SignerCount {
                legs: group.len(),
                signers: signers.len(),
            });
        }
        let transactions = group
            .into_legs()
            .into_iter()
            .zip(signers.iter())
            .map(|(operation, signer)| sign_leg(operation, *signer))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { transactions })
    }

    pub fn transactions(&self) -> &[SignedTransaction] {
        &self.transactions
    }

    /// The unsigned group.
    pub fn group(&self) -> Result<TransactionGroup, SigningError> {
        let operations = self.transactions.iter().map(|t| t.operation.clone()).collect();
        Ok(TransactionGroup::from_grouped(operations)?)
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.transactions
            .first()
            .and_then(|t| t.operation.header.group)
    }

    /// Identifier the ledger reports for the group: the first leg's txid.
    pub fn txid(&self) -> Option<TxId> {
        self.transactions.first().map(SignedTransaction::txid)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Signing module errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SigningError {
    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Signature verification failed")]
    VerificationFailed,

    #[error("Invalid secret seed")]
    InvalidSeed,

    #[error("Signer {signer} does not match sender {sender}")]
    SignerMismatch { sender: String, signer: String },

    #[error("Leg is not key-signed")]
    NotKeySigned,

    #[error("Signer count mismatch: {legs} legs, {signers} signers")]
    SignerCount { legs: usize, signers: usize },

    #[error("Invalid group: {0}")]
    Group(#[from] GroupError),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
