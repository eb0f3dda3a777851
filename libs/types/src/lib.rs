//! Types library for the chad swap exchange
//!
//! Ledger-facing data model shared by the authorization programs, the signing
//! layer and the exchange orchestrator.
//!
//! # Modules
//! - `ids`: Addresses, asset ids, transaction/group digests, lease tags
//! - `asset`: Assets and smallest-unit amount conversion
//! - `operation`: Payment and asset-transfer legs
//! - `group`: Atomic transaction groups and typed swap views
//! - `errors`: Error taxonomy

pub mod ids;
pub mod asset;
pub mod operation;
pub mod group;
pub mod errors;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ids::*;
    pub use crate::asset::*;
    pub use crate::operation::*;
    pub use crate::group::*;
    pub use crate::errors::*;
}
