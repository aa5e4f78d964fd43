//! Chain interaction layer.
//!
//! This crate provides:
//! - An RPC provider abstraction over the nonblocking Solana client
//! - Token resolution with on-chain decimal lookup and fallback
//! - Address lookup table loading and parsing
//! - Delegation policy enforcement and scoped signing key material
//! - Versioned-transaction assembly under the 1232-byte wire ceiling
//! - Transaction submission with preflight classification and
//!   confirmation polling

mod assembler;
mod lookup;
mod provider;
mod registry;
mod signer;
mod submitter;

pub use assembler::{AssembleError, Assembler, SizeDiagnostic};
pub use lookup::{load_lookup_tables, LookupTable, LOOKUP_ADDRESSES_OFFSET};
pub use provider::{ChainRpc, RpcError, RpcProvider, SendRejection};
pub use registry::{
    KnownToken, RegistryError, TokenInfo, TokenRegistry, KNOWN_TOKENS, WRAPPED_SOL_MINT,
};
pub use signer::{Delegation, DelegationReason, KeyError, ScopedKeypair, ROUTING_PROGRAM_KEY};
pub use submitter::{SubmitConfig, SubmitError, SubmitOutcome, SubmitStatus, Submitter};
