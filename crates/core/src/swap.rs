//! The swap entry point.
//!
//! A single typed async function the enclosing CLI awaits: resolve both
//! sides, stream quotes, confirm, assemble, submit. Components are
//! constructed here and passed down; nothing lives in module-level state.
//! The delegation (and with it the delegate key) is consumed for exactly one
//! swap and dropped on every exit path.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::commitment_config::CommitmentConfig;
use titanswap_chain::{
    Assembler, Delegation, RpcProvider, SubmitConfig, SubmitStatus, Submitter, TokenRegistry,
};
use titanswap_wire::{stream_quotes, QuoteRequest, QuoteStreamConfig, Session};
use tracing::{debug, info, warn};

use crate::amounts;
use crate::config::SwapConfig;
use crate::display::{self, DisplayContext};
use crate::error::{SwapError, SwapOutcome};

/// How long the session probe may take before it is skipped.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Execute one swap: `amount` is in human units of the input token.
pub async fn swap(
    config: &SwapConfig,
    delegation: Delegation,
    input: &str,
    output: &str,
    amount: &str,
) -> Result<SwapOutcome, SwapError> {
    let rpc = Arc::new(RpcProvider::new(
        &config.chain_rpc_url,
        config.rpc_timeout,
        CommitmentConfig::confirmed(),
    ));

    let registry = TokenRegistry::new(Arc::clone(&rpc));
    let input_token = registry.resolve(input).await?;
    let output_token = registry.resolve(output).await?;
    let input_amount = amounts::to_base_units(amount, input_token.decimals)?;
    info!(
        input = %input_token.mint,
        output = %output_token.mint,
        amount = input_amount,
        input_decimals = input_token.decimals,
        output_decimals = output_token.decimals,
        "starting swap"
    );

    let session = Session::connect(&config.wire_endpoint, &config.wire_auth_token).await?;
    match tokio::time::timeout(PROBE_TIMEOUT, session.get_info()).await {
        Ok(Ok(info)) => debug!(?info, "wire session ready"),
        Ok(Err(err)) => return Err(err.into()),
        Err(_) => warn!("session probe timed out; continuing"),
    }

    let request = QuoteRequest::new(
        input_token.mint,
        output_token.mint,
        input_amount,
        delegation.delegate.pubkey(),
    )
    .with_slippage_bps(config.slippage_bps)
    .with_max_quotes(config.max_quotes_per_update)
    .with_update_interval_ms(config.update_interval_ms);

    let mut stream = stream_quotes(
        &session,
        request,
        QuoteStreamConfig {
            first_batch_deadline: config.first_batch_timeout,
        },
    )
    .await?;

    let ctx = DisplayContext {
        input_symbol: input_token.symbol.clone().unwrap_or_else(|| input.to_string()),
        output_symbol: output_token
            .symbol
            .clone()
            .unwrap_or_else(|| output.to_string()),
        input_decimals: input_token.decimals,
        output_decimals: output_token.decimals,
    };

    let Some(winning) = display::confirm_quote(&mut stream, &ctx).await? else {
        info!("swap cancelled before confirmation; no chain impact");
        return Ok(SwapOutcome::Cancelled);
    };
    info!(
        provider = %winning.provider_id,
        out_amount = winning.out_amount,
        "quote confirmed"
    );

    let assembler = Assembler::new(Arc::clone(&rpc));
    let tx = assembler
        .assemble(&winning, &input_token.mint, &delegation)
        .await?;

    let submitter = Submitter::new(
        Arc::clone(&rpc),
        SubmitConfig {
            confirmation_timeout: config.confirmation_timeout,
            ..SubmitConfig::default()
        },
    );
    let outcome = submitter.submit(&tx, &ctx.input_symbol).await?;
    // The delegation, and the delegate secret with it, drops when this
    // function returns.

    let signature = outcome.signature.to_string();
    match outcome.status {
        SubmitStatus::Confirmed => Ok(SwapOutcome::Confirmed {
            summary: display::summary_line(&winning, &ctx),
            explorer_url: outcome.explorer_url,
            signature,
        }),
        SubmitStatus::Failed(reason) if reason.to_lowercase().contains("slippage") => {
            Err(SwapError::SlippageExceeded)
        }
        SubmitStatus::Failed(reason) => Err(SwapError::ExecutionFailed { signature, reason }),
        SubmitStatus::Expired => Err(SwapError::TransactionExpired { signature }),
    }
}
