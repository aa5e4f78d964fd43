//! User-facing error taxonomy.
//!
//! Every component boundary reports into this one enum; the enclosing CLI
//! maps it straight onto its `error{code, message}` exit shape. Nothing in
//! here retries: transient failures in this domain (blockhash expiry,
//! slippage) are only safe to retry after re-pricing, which means the user
//! re-issues the swap.

use thiserror::Error;
use titanswap_chain::{
    AssembleError, DelegationReason, RegistryError, SizeDiagnostic, SubmitError,
};
use titanswap_wire::WireError;

use crate::amounts::AmountError;

/// Successful exits of one swap invocation.
#[derive(Debug, Clone)]
pub enum SwapOutcome {
    Confirmed {
        signature: String,
        explorer_url: String,
        /// e.g. "0.05 SOL → 9.721400 USDC"
        summary: String,
    },
    /// The user backed out before signing. No chain impact.
    Cancelled,
}

#[derive(Debug, Clone, Error)]
pub enum SwapError {
    #[error("missing configuration: {what}")]
    ConfigMissing { what: String },

    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    #[error("transport broken: {0}")]
    TransportBroken(String),

    #[error("no quotes arrived before the deadline")]
    NoQuotes,

    #[error("cancelled")]
    UserCancelled,

    #[error("delegation invalid: {0}")]
    DelegationInvalid(DelegationReason),

    #[error("transaction too large: {0}")]
    TooLarge(SizeDiagnostic),

    #[error("insufficient {token}")]
    InsufficientFunds { token: String },

    #[error("slippage tolerance exceeded")]
    SlippageExceeded,

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("simulation failed: {0}")]
    SimulationFailed(String),

    #[error("confirmation timed out; status of {signature} is unknown")]
    ConfirmationTimeout { signature: String },

    #[error("transaction {signature} failed on chain: {reason}")]
    ExecutionFailed { signature: String, reason: String },

    #[error("transaction {signature} expired before it landed")]
    TransactionExpired { signature: String },

    #[error("unrecognized token {0:?}")]
    UnknownToken(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(AmountError),

    #[error("quote payload rejected: {0}")]
    MalformedQuote(String),
}

impl SwapError {
    /// Stable machine-readable code for the enclosing CLI.
    pub fn code(&self) -> &'static str {
        match self {
            SwapError::ConfigMissing { .. } => "config_missing",
            SwapError::AuthRejected(_) => "auth_rejected",
            SwapError::TransportBroken(_) => "transport_broken",
            SwapError::NoQuotes => "no_quotes",
            SwapError::UserCancelled => "user_cancelled",
            SwapError::DelegationInvalid(_) => "delegation_invalid",
            SwapError::TooLarge(_) => "too_large",
            SwapError::InsufficientFunds { .. } => "insufficient_funds",
            SwapError::SlippageExceeded => "slippage_exceeded",
            SwapError::AccountNotFound(_) => "account_not_found",
            SwapError::SimulationFailed(_) => "simulation_failed",
            SwapError::ConfirmationTimeout { .. } => "confirmation_timeout",
            SwapError::ExecutionFailed { .. } => "execution_failed",
            SwapError::TransactionExpired { .. } => "transaction_expired",
            SwapError::UnknownToken(_) => "unknown_token",
            SwapError::InvalidAmount(_) => "invalid_amount",
            SwapError::MalformedQuote(_) => "malformed_quote",
        }
    }

    /// What the user can do about it, when there is anything.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            SwapError::ConfigMissing { .. } => {
                Some("set WIRE_AUTH_TOKEN (and optionally WIRE_ENDPOINT, CHAIN_RPC_URL)")
            }
            SwapError::NoQuotes => Some("try again; providers may be repricing this pair"),
            SwapError::SlippageExceeded => {
                Some("re-run the swap, or raise the slippage tolerance")
            }
            SwapError::TransactionExpired { .. } => {
                Some("re-run the swap to re-price against a fresh blockhash")
            }
            SwapError::ConfirmationTimeout { .. } => {
                Some("check the signature on an explorer before retrying")
            }
            _ => None,
        }
    }
}

impl From<WireError> for SwapError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::AuthRejected(detail) => SwapError::AuthRejected(detail),
            WireError::NoQuotes => SwapError::NoQuotes,
            WireError::Server { code, message } if code.contains("auth") => {
                SwapError::AuthRejected(format!("[{code}] {message}"))
            }
            WireError::Server { code, message } => {
                SwapError::TransportBroken(format!("server error [{code}]: {message}"))
            }
            WireError::Transport(detail) | WireError::Codec(detail) => {
                SwapError::TransportBroken(detail)
            }
        }
    }
}

impl From<RegistryError> for SwapError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownToken(input) => SwapError::UnknownToken(input),
        }
    }
}

impl From<AmountError> for SwapError {
    fn from(err: AmountError) -> Self {
        SwapError::InvalidAmount(err)
    }
}

impl From<AssembleError> for SwapError {
    fn from(err: AssembleError) -> Self {
        match err {
            AssembleError::Delegation(reason) => SwapError::DelegationInvalid(reason),
            AssembleError::TooLarge(diagnostic) => SwapError::TooLarge(diagnostic),
            AssembleError::MalformedPayload(detail) => SwapError::MalformedQuote(detail),
            AssembleError::Rpc(err) => SwapError::SimulationFailed(err.to_string()),
        }
    }
}

impl From<SubmitError> for SwapError {
    fn from(err: SubmitError) -> Self {
        match err {
            SubmitError::InsufficientFunds { token } => SwapError::InsufficientFunds { token },
            SubmitError::SlippageExceeded => SwapError::SlippageExceeded,
            SubmitError::AccountNotFound(detail) => SwapError::AccountNotFound(detail),
            SubmitError::SimulationFailed(detail) => SwapError::SimulationFailed(detail),
            SubmitError::ConfirmationTimeout { signature } => SwapError::ConfirmationTimeout {
                signature: signature.to_string(),
            },
            SubmitError::Rpc(err) => SwapError::SimulationFailed(err.to_string()),
        }
    }
}
