//! Environment-driven configuration.

use std::time::Duration;

use url::Url;

use crate::error::SwapError;

/// Recognized environment variables.
pub mod env {
    pub const WIRE_ENDPOINT: &str = "WIRE_ENDPOINT";
    pub const WIRE_AUTH_TOKEN: &str = "WIRE_AUTH_TOKEN";
    pub const CHAIN_RPC_URL: &str = "CHAIN_RPC_URL";
}

/// US-region quote-stream endpoint used when `WIRE_ENDPOINT` is unset.
const DEFAULT_WIRE_ENDPOINT: &str = "wss://quotes.us.titandex.io/ws";

const DEFAULT_CHAIN_RPC_URL: &str = "https://api.mainnet-beta.solana.com";

const DEFAULT_SLIPPAGE_BPS: u16 = 50;
const DEFAULT_MAX_QUOTES_PER_UPDATE: u8 = 8;
const DEFAULT_UPDATE_INTERVAL_MS: u16 = 500;
const DEFAULT_FIRST_BATCH_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct SwapConfig {
    pub wire_endpoint: Url,
    pub wire_auth_token: String,
    pub chain_rpc_url: String,
    /// Applied to every quote stream opened for a swap.
    pub slippage_bps: u16,
    pub max_quotes_per_update: u8,
    pub update_interval_ms: u16,
    pub first_batch_timeout: Duration,
    pub rpc_timeout: Duration,
    pub confirmation_timeout: Duration,
}

impl SwapConfig {
    /// Load from the environment. A missing auth token is a refusal, not a
    /// degraded mode: the wire endpoint rejects anonymous sessions anyway.
    pub fn from_env() -> Result<Self, SwapError> {
        let wire_auth_token = std::env::var(env::WIRE_AUTH_TOKEN)
            .ok()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| SwapError::ConfigMissing {
                what: format!("{} (bearer token for the quote stream)", env::WIRE_AUTH_TOKEN),
            })?;

        let endpoint =
            std::env::var(env::WIRE_ENDPOINT).unwrap_or_else(|_| DEFAULT_WIRE_ENDPOINT.to_string());
        let wire_endpoint = Url::parse(&endpoint).map_err(|err| SwapError::ConfigMissing {
            what: format!("{} is not a valid URL: {err}", env::WIRE_ENDPOINT),
        })?;

        let chain_rpc_url =
            std::env::var(env::CHAIN_RPC_URL).unwrap_or_else(|_| DEFAULT_CHAIN_RPC_URL.to_string());

        Ok(Self {
            wire_endpoint,
            wire_auth_token,
            chain_rpc_url,
            slippage_bps: DEFAULT_SLIPPAGE_BPS,
            max_quotes_per_update: DEFAULT_MAX_QUOTES_PER_UPDATE,
            update_interval_ms: DEFAULT_UPDATE_INTERVAL_MS,
            first_batch_timeout: DEFAULT_FIRST_BATCH_TIMEOUT,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        })
    }
}
