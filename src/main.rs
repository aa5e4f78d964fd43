//! Titanswap CLI
//!
//! Streaming swap tool for the Titan quote network on Solana:
//! - Live quote aggregation over an authenticated MessagePack WebSocket
//! - In-place terminal table with user confirmation
//! - Delegated signing under per-transaction caps and expiry
//! - Versioned-transaction assembly with address lookup table compression

use std::collections::HashSet;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use titanswap_chain::{Delegation, ScopedKeypair, ROUTING_PROGRAM_KEY};
use titanswap_core::{swap, SwapConfig, SwapError, SwapOutcome};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable names.
mod env {
    /// Base58-encoded 64-byte delegate secret, decrypted by the wallet
    /// manager and handed to this process.
    pub const DELEGATE_KEY: &str = "DELEGATE_KEY";
    pub const DELEGATION_MAX_SOL: &str = "DELEGATION_MAX_SOL";
    pub const DELEGATION_MAX_TOKEN: &str = "DELEGATION_MAX_TOKEN";
    pub const DELEGATION_TTL_SECS: &str = "DELEGATION_TTL_SECS";
    pub const DELEGATION_PROGRAMS: &str = "DELEGATION_PROGRAMS";
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,titanswap_core=debug,titanswap_chain=debug")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [input, output, amount] = args.as_slice() else {
        eprintln!("usage: titanswap <INPUT> <OUTPUT> <AMOUNT>");
        eprintln!("       titanswap SOL USDC 0.05");
        return ExitCode::FAILURE;
    };

    let config = match SwapConfig::from_env() {
        Ok(config) => config,
        Err(err) => return report(err),
    };
    let delegation = match load_delegation() {
        Ok(delegation) => delegation,
        Err(err) => {
            return report(SwapError::ConfigMissing {
                what: err.to_string(),
            })
        }
    };

    info!(
        delegate = %delegation.delegate.pubkey(),
        expires_at = %delegation.expires_at,
        "delegation loaded"
    );

    match swap(&config, delegation, input, output, amount).await {
        Ok(SwapOutcome::Confirmed {
            signature,
            explorer_url,
            summary,
        }) => {
            println!("ok: {summary}");
            println!("signature: {signature}");
            println!("explorer:  {explorer_url}");
            ExitCode::SUCCESS
        }
        Ok(SwapOutcome::Cancelled) => {
            println!("cancelled");
            ExitCode::SUCCESS
        }
        Err(err) => report(err),
    }
}

fn report(err: SwapError) -> ExitCode {
    eprintln!("error[{}]: {err}", err.code());
    if let Some(hint) = err.hint() {
        eprintln!("hint: {hint}");
    }
    ExitCode::FAILURE
}

/// Build the swap delegation from the environment.
///
/// The key arrives already decrypted; the wallet file itself is never read
/// here. The SOL cap is in whole SOL; the token cap is in base units of
/// whatever token is spent (decimals are unknowable at delegation time).
fn load_delegation() -> Result<Delegation> {
    let encoded = std::env::var(env::DELEGATE_KEY)
        .map_err(|_| anyhow!("{} (base58 delegate secret)", env::DELEGATE_KEY))?;
    let secret = bs58::decode(encoded.trim())
        .into_vec()
        .context("delegate secret is not valid base58")?;
    let delegate = ScopedKeypair::from_bytes(&secret)?;

    let max_sol: f64 = parse_env_or(env::DELEGATION_MAX_SOL, 1.0)?;
    let max_token: u64 = parse_env_or(env::DELEGATION_MAX_TOKEN, 1_000_000_000)?;
    let ttl_secs: i64 = parse_env_or(env::DELEGATION_TTL_SECS, 900)?;

    let allowed_programs: HashSet<String> = std::env::var(env::DELEGATION_PROGRAMS)
        .unwrap_or_else(|_| ROUTING_PROGRAM_KEY.to_string())
        .split(',')
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();

    Ok(Delegation {
        delegate,
        allowed_programs,
        max_sol_per_tx: (max_sol * 1e9) as u64,
        max_token_per_tx: max_token,
        expires_at: Utc::now() + Duration::seconds(ttl_secs),
    })
}

fn parse_env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|err| anyhow!("{name} is invalid: {err}")),
        Err(_) => Ok(default),
    }
}
