//! Delegated signing.
//!
//! The delegate secret is handed to the core already decrypted and lives in
//! a [`ScopedKeypair`] for the duration of one swap. The backing buffer is
//! zeroized when the scope ends. A [`Delegation`] bounds what that key may
//! sign; every check runs before the signer is ever touched.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::registry::WRAPPED_SOL_MINT;

/// The delegation entry that authorizes this swap path.
pub const ROUTING_PROGRAM_KEY: &str = "Titan";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("delegate secret must be 64 bytes, got {0}")]
    WrongLength(usize),

    #[error("delegate secret is not a valid ed25519 keypair")]
    Malformed,
}

/// A signing key scoped to one swap. The transient copy of the secret is
/// zeroized as soon as the keypair is built; the keypair's own secret half
/// is wiped when the scope drops it.
pub struct ScopedKeypair {
    keypair: Keypair,
}

impl ScopedKeypair {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let secret: [u8; 64] = bytes
            .try_into()
            .map_err(|_| KeyError::WrongLength(bytes.len()))?;
        let secret = Zeroizing::new(secret);
        let keypair = Keypair::from_bytes(secret.as_ref()).map_err(|_| KeyError::Malformed)?;
        Ok(Self { keypair })
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn sign_message(&self, message: &[u8]) -> Signature {
        self.keypair.sign_message(message)
    }
}

impl std::fmt::Debug for ScopedKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret never reaches logs or error messages.
        f.debug_struct("ScopedKeypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}

impl PartialEq for ScopedKeypair {
    fn eq(&self, other: &Self) -> bool {
        self.keypair.to_bytes() == other.keypair.to_bytes()
    }
}

/// Why a delegation refused to sign.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DelegationReason {
    #[error("expired")]
    Expired,

    #[error("program {0:?} is not in the delegation's allowed set")]
    ProgramDisallowed(String),

    #[error("input amount {requested} exceeds the per-transaction cap {cap}")]
    OverCap { requested: u64, cap: u64 },

    #[error("delegate key is not a signer of the assembled message")]
    DelegateNotSigner,
}

/// A time-bounded, capped authorization to sign on the user's behalf.
/// Created outside the core; consumed read-only here.
#[derive(Debug)]
pub struct Delegation {
    pub delegate: ScopedKeypair,
    pub allowed_programs: HashSet<String>,
    /// Cap for wrapped-native SOL inputs, in lamports.
    pub max_sol_per_tx: u64,
    /// Cap for any other input mint, in that token's base units.
    pub max_token_per_tx: u64,
    pub expires_at: DateTime<Utc>,
}

impl Delegation {
    /// Check every precondition for signing a swap of `input_amount` base
    /// units of `input_mint`. The cap is enforced against the input side.
    pub fn authorize(
        &self,
        input_mint: &Pubkey,
        input_amount: u64,
        now: DateTime<Utc>,
    ) -> Result<(), DelegationReason> {
        if now >= self.expires_at {
            return Err(DelegationReason::Expired);
        }
        if !self.allowed_programs.contains(ROUTING_PROGRAM_KEY) {
            return Err(DelegationReason::ProgramDisallowed(
                ROUTING_PROGRAM_KEY.to_string(),
            ));
        }
        let cap = if *input_mint == WRAPPED_SOL_MINT {
            self.max_sol_per_tx
        } else {
            self.max_token_per_tx
        };
        if input_amount > cap {
            return Err(DelegationReason::OverCap {
                requested: input_amount,
                cap,
            });
        }
        Ok(())
    }
}
