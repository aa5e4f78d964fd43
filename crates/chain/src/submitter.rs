//! Transaction submission and confirmation.
//!
//! One send per swap, preflight enabled. Preflight rejections are classified
//! into user-addressable reasons; a transaction that makes it onto the wire
//! is polled until it confirms, fails, or its blockhash expires. There are
//! no transparent retries: re-pricing belongs to the user.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::instruction::InstructionError;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{TransactionError, VersionedTransaction};
use solana_transaction_status::TransactionConfirmationStatus;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::provider::{ChainRpc, RpcError, SendRejection};

const EXPLORER_BASE: &str = "https://explorer.solana.com/tx";

/// Custom program error codes aggregator programs return when the realized
/// output falls below the slippage floor.
const SLIPPAGE_CUSTOM_CODES: &[u32] = &[6001];

#[derive(Debug, Clone)]
pub struct SubmitConfig {
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
    /// Confirmation level that counts as terminal.
    pub commitment: TransactionConfirmationStatus,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            confirmation_timeout: Duration::from_secs(60),
            commitment: TransactionConfirmationStatus::Confirmed,
        }
    }
}

/// Terminal state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitStatus {
    Confirmed,
    /// Landed on chain but the program errored.
    Failed(String),
    /// The blockhash aged out before the transaction landed.
    Expired,
}

#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub signature: Signature,
    pub status: SubmitStatus,
    pub explorer_url: String,
}

#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    #[error("insufficient {token} to cover the swap")]
    InsufficientFunds { token: String },

    #[error("the quoted price moved past the slippage tolerance")]
    SlippageExceeded,

    #[error("a referenced account does not exist: {0}")]
    AccountNotFound(String),

    #[error("preflight simulation failed: {0}")]
    SimulationFailed(String),

    /// The transaction was sent but its fate is unknown. The caller may
    /// re-check the signature later.
    #[error("confirmation timed out; status of {signature} is unknown")]
    ConfirmationTimeout { signature: Signature },

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// Sends a signed transaction and tracks it to a terminal state.
pub struct Submitter<R> {
    rpc: Arc<R>,
    config: SubmitConfig,
}

impl<R: ChainRpc> Submitter<R> {
    pub fn new(rpc: Arc<R>, config: SubmitConfig) -> Self {
        Self { rpc, config }
    }

    /// Submit and poll. `input_token` labels the spendable side in
    /// insufficient-funds reports.
    pub async fn submit(
        &self,
        tx: &VersionedTransaction,
        input_token: &str,
    ) -> Result<SubmitOutcome, SubmitError> {
        let blockhash = *tx.message.recent_blockhash();
        let signature = self
            .rpc
            .send_transaction(tx)
            .await
            .map_err(|rejection| classify_rejection(rejection, input_token))?;
        info!(%signature, "transaction sent; polling for confirmation");

        let started = tokio::time::Instant::now();
        let deadline = started + self.config.confirmation_timeout;
        let mut polls = 0u32;
        loop {
            polls += 1;
            if polls % 10 == 0 {
                debug!(
                    %signature,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "still waiting for confirmation"
                );
            }
            match self.rpc.signature_status(&signature).await? {
                Some(status) => {
                    if let Some(err) = status.err {
                        return Ok(self.outcome(signature, SubmitStatus::Failed(err.to_string())));
                    }
                    if meets(&status.confirmation_status, &self.config.commitment) {
                        debug!(%signature, slot = status.slot, "transaction confirmed");
                        return Ok(self.outcome(signature, SubmitStatus::Confirmed));
                    }
                }
                None => {
                    // Unseen signature plus a dead blockhash means the
                    // transaction can no longer land.
                    match self.rpc.is_blockhash_valid(&blockhash).await {
                        Ok(false) => {
                            warn!(%signature, "blockhash expired before confirmation");
                            return Ok(self.outcome(signature, SubmitStatus::Expired));
                        }
                        Ok(true) => {}
                        Err(err) => {
                            debug!(error = %err, "blockhash validity check failed; continuing to poll");
                        }
                    }
                }
            }
            if tokio::time::Instant::now() + self.config.poll_interval > deadline {
                return Err(SubmitError::ConfirmationTimeout { signature });
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    fn outcome(&self, signature: Signature, status: SubmitStatus) -> SubmitOutcome {
        SubmitOutcome {
            signature,
            status,
            explorer_url: format!("{EXPLORER_BASE}/{signature}"),
        }
    }
}

fn meets(
    status: &Option<TransactionConfirmationStatus>,
    required: &TransactionConfirmationStatus,
) -> bool {
    let rank = |level: &TransactionConfirmationStatus| match level {
        TransactionConfirmationStatus::Processed => 0,
        TransactionConfirmationStatus::Confirmed => 1,
        TransactionConfirmationStatus::Finalized => 2,
    };
    status
        .as_ref()
        .map(|level| rank(level) >= rank(required))
        .unwrap_or(false)
}

/// Map a preflight rejection onto a user-addressable reason.
fn classify_rejection(rejection: SendRejection, input_token: &str) -> SubmitError {
    let logs = rejection.logs.join("\n").to_lowercase();
    let message = rejection.message.to_lowercase();

    if matches!(rejection.err, Some(TransactionError::InsufficientFundsForFee)) {
        return SubmitError::InsufficientFunds {
            token: "SOL".to_string(),
        };
    }
    if logs.contains("insufficient funds") || logs.contains("insufficient lamports") {
        return SubmitError::InsufficientFunds {
            token: input_token.to_string(),
        };
    }
    if logs.contains("slippage") || message.contains("slippage") {
        return SubmitError::SlippageExceeded;
    }
    if let Some(TransactionError::InstructionError(_, InstructionError::Custom(code))) =
        &rejection.err
    {
        if SLIPPAGE_CUSTOM_CODES.contains(code) {
            return SubmitError::SlippageExceeded;
        }
    }
    if matches!(
        rejection.err,
        Some(TransactionError::AccountNotFound | TransactionError::ProgramAccountNotFound)
    ) {
        return SubmitError::AccountNotFound(rejection.message);
    }
    SubmitError::SimulationFailed(rejection.message)
}
