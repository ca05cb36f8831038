//! Engine crate for the Lazy Superheroes operator toolkit.
//!
//! Everything the `lotto` binary does flows through here: entity identifier
//! parsing and EVM aliasing, ABI encode/decode against on-disk artifacts,
//! mirror-node reads with retry and pagination, transaction freezing and
//! submission, gas planning, preflight reconciliation of on-chain
//! prerequisites, and threshold multi-sig over frozen transactions.

pub mod abi;
pub mod entity;
pub mod env;
pub mod error;
pub mod gas;
pub mod mirror;
pub mod multisig;
pub mod preflight;
pub mod tx;
pub mod units;

pub use entity::{AccountId, ContractId, EvmAddress, TokenId};
pub use error::{KitError, KitResult};
