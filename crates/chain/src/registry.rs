//! Token resolution.
//!
//! Maps a user-supplied symbol or address to a mint and the mint's on-chain
//! decimal count. Decimals are the single source of truth for human ↔ base
//! unit conversion: a one-off error here silently moves amounts by three
//! orders of magnitude, so they are always queried per-mint rather than
//! assumed.

use std::str::FromStr;
use std::sync::Arc;

use dashmap::DashMap;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use spl_token::state::Mint;
use thiserror::Error;
use tracing::{debug, warn};

use crate::provider::ChainRpc;

/// The wrapped-native SOL mint. Its decimal count is fixed at 9 and never
/// fetched.
pub const WRAPPED_SOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

const WRAPPED_SOL_DECIMALS: u8 = 9;

/// Used when the mint account cannot be read or parsed.
const FALLBACK_DECIMALS: u8 = 6;

const MAX_DECIMALS: u8 = 18;

/// A symbol the registry recognizes without a full address.
pub struct KnownToken {
    pub symbol: &'static str,
    pub mint: Pubkey,
}

/// Canonical mainnet mints for common symbols.
pub static KNOWN_TOKENS: &[KnownToken] = &[
    KnownToken { symbol: "SOL", mint: WRAPPED_SOL_MINT },
    KnownToken { symbol: "USDC", mint: pubkey!("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v") },
    KnownToken { symbol: "USDT", mint: pubkey!("Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB") },
    KnownToken { symbol: "JUP", mint: pubkey!("JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN") },
    KnownToken { symbol: "BONK", mint: pubkey!("DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263") },
    KnownToken { symbol: "WIF", mint: pubkey!("EKpQGSJtjMFqKZ9KQanSqYXRcF8fBopzLHYxdM65zcjm") },
    KnownToken { symbol: "RAY", mint: pubkey!("4k3Dyjzvzp8eMZWUXbBCjEvwSkkk59S5iCNLY3QrkX6R") },
    KnownToken { symbol: "PYTH", mint: pubkey!("HZ1JovNiVvGrGNiiYvEozEVgZ58xaU3RKwX8eACQBCt3") },
    KnownToken { symbol: "JTO", mint: pubkey!("jtojtomepa8beP8AuQc6eXt5FriJwfFMwQx2v2f9mCL") },
];

/// A resolved token. Decimals are immutable on-chain, so entries are cached
/// for the life of the process and never invalidated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub mint: Pubkey,
    pub symbol: Option<String>,
    pub decimals: u8,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unrecognized token {0:?}; pass a full mint address")]
    UnknownToken(String),
}

/// Symbol/address resolution with a per-process decimal cache.
pub struct TokenRegistry<R> {
    rpc: Arc<R>,
    cache: DashMap<Pubkey, TokenInfo>,
}

impl<R: ChainRpc> TokenRegistry<R> {
    pub fn new(rpc: Arc<R>) -> Self {
        Self {
            rpc,
            cache: DashMap::new(),
        }
    }

    /// Resolve a symbol or base58 address to a [`TokenInfo`].
    ///
    /// Decimal lookup degrades rather than fails: an unreachable RPC or an
    /// unparseable mint account falls back to 6 with a warning.
    pub async fn resolve(&self, input: &str) -> Result<TokenInfo, RegistryError> {
        let input = input.trim();
        let (mint, symbol) = if let Ok(key) = Pubkey::from_str(input) {
            (key, symbol_for(&key))
        } else {
            let known = KNOWN_TOKENS
                .iter()
                .find(|token| token.symbol.eq_ignore_ascii_case(input))
                .ok_or_else(|| RegistryError::UnknownToken(input.to_string()))?;
            (known.mint, Some(known.symbol.to_string()))
        };

        if let Some(cached) = self.cache.get(&mint) {
            return Ok(cached.value().clone());
        }

        let decimals = self.fetch_decimals(&mint).await;
        debug!(mint = %mint, decimals, "token resolved");
        let info = TokenInfo {
            mint,
            symbol,
            decimals,
        };
        self.cache.insert(mint, info.clone());
        Ok(info)
    }

    async fn fetch_decimals(&self, mint: &Pubkey) -> u8 {
        if *mint == WRAPPED_SOL_MINT {
            return WRAPPED_SOL_DECIMALS;
        }
        let data = match self.rpc.account_data(mint).await {
            Ok(data) => data,
            Err(err) => {
                warn!(
                    mint = %mint,
                    error = %err,
                    fallback = FALLBACK_DECIMALS,
                    "mint account fetch failed; running with fallback decimals"
                );
                return FALLBACK_DECIMALS;
            }
        };
        // Token-2022 mints append extensions past the base layout; the base
        // fields are enough here.
        if data.len() < Mint::LEN {
            warn!(
                mint = %mint,
                len = data.len(),
                fallback = FALLBACK_DECIMALS,
                "mint account too short; running with fallback decimals"
            );
            return FALLBACK_DECIMALS;
        }
        match Mint::unpack_from_slice(&data[..Mint::LEN]) {
            Ok(state) if state.decimals <= MAX_DECIMALS => state.decimals,
            Ok(state) => {
                warn!(
                    mint = %mint,
                    decimals = state.decimals,
                    fallback = FALLBACK_DECIMALS,
                    "mint decimals out of range; running with fallback decimals"
                );
                FALLBACK_DECIMALS
            }
            Err(err) => {
                warn!(
                    mint = %mint,
                    error = %err,
                    fallback = FALLBACK_DECIMALS,
                    "mint account unparseable; running with fallback decimals"
                );
                FALLBACK_DECIMALS
            }
        }
    }
}

fn symbol_for(mint: &Pubkey) -> Option<String> {
    KNOWN_TOKENS
        .iter()
        .find(|token| token.mint == *mint)
        .map(|token| token.symbol.to_string())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use solana_sdk::hash::Hash;
    use solana_sdk::signature::Signature;
    use solana_sdk::transaction::VersionedTransaction;
    use solana_transaction_status::TransactionStatus;

    use super::*;
    use crate::provider::{RpcError, SendRejection};

    /// Serves mint accounts from a fixed map; everything else errors.
    struct MockRpc {
        mints: Vec<(Pubkey, Vec<u8>)>,
    }

    fn mint_account(decimals: u8) -> Vec<u8> {
        let mut data = vec![0u8; Mint::LEN];
        // COption<Pubkey> mint_authority (36) + supply (8) precede decimals.
        data[44] = decimals;
        // is_initialized
        data[45] = 1;
        data
    }

    #[async_trait]
    impl ChainRpc for MockRpc {
        async fn account_data(&self, key: &Pubkey) -> Result<Vec<u8>, RpcError> {
            self.mints
                .iter()
                .find(|(mint, _)| mint == key)
                .map(|(_, data)| data.clone())
                .ok_or(RpcError::AccountNotFound(*key))
        }

        async fn latest_blockhash(&self) -> Result<Hash, RpcError> {
            Ok(Hash::default())
        }

        async fn send_transaction(
            &self,
            _tx: &VersionedTransaction,
        ) -> Result<Signature, SendRejection> {
            Err(SendRejection::default())
        }

        async fn signature_status(
            &self,
            _signature: &Signature,
        ) -> Result<Option<TransactionStatus>, RpcError> {
            Ok(None)
        }

        async fn is_blockhash_valid(&self, _blockhash: &Hash) -> Result<bool, RpcError> {
            Ok(true)
        }
    }

    fn registry(mints: Vec<(Pubkey, Vec<u8>)>) -> TokenRegistry<MockRpc> {
        TokenRegistry::new(Arc::new(MockRpc { mints }))
    }

    #[tokio::test]
    async fn test_symbols_resolve_to_canonical_mints() {
        let usdc = KNOWN_TOKENS[1].mint;
        let registry = registry(vec![(usdc, mint_account(6))]);

        for symbol in ["USDC", "usdc", "Usdc"] {
            let info = registry.resolve(symbol).await.unwrap();
            assert_eq!(info.mint, usdc);
            assert_eq!(info.decimals, 6);
            assert_eq!(info.symbol.as_deref(), Some("USDC"));
        }
    }

    #[tokio::test]
    async fn test_sol_decimals_are_known_without_rpc() {
        let registry = registry(vec![]);
        let info = registry.resolve("SOL").await.unwrap();
        assert_eq!(info.mint, WRAPPED_SOL_MINT);
        assert_eq!(info.decimals, 9);
    }

    #[tokio::test]
    async fn test_decimals_come_from_the_mint_account() {
        // Not every token is 6 decimals; that assumption is the historical
        // bug this registry exists to kill.
        let mint = Pubkey::new_unique();
        let registry = registry(vec![(mint, mint_account(5))]);
        let info = registry.resolve(&mint.to_string()).await.unwrap();
        assert_eq!(info.decimals, 5);
    }

    #[tokio::test]
    async fn test_rpc_failure_falls_back_to_six() {
        let mint = Pubkey::new_unique();
        let registry = registry(vec![]);
        let info = registry.resolve(&mint.to_string()).await.unwrap();
        assert_eq!(info.decimals, 6);
    }

    #[tokio::test]
    async fn test_garbage_account_data_falls_back_to_six() {
        let mint = Pubkey::new_unique();
        let registry = registry(vec![(mint, vec![0xab; 7])]);
        let info = registry.resolve(&mint.to_string()).await.unwrap();
        assert_eq!(info.decimals, 6);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_an_error() {
        let registry = registry(vec![]);
        assert!(matches!(
            registry.resolve("DOGECOIN").await,
            Err(RegistryError::UnknownToken(_))
        ));
    }

    #[tokio::test]
    async fn test_decimals_are_cached_per_process() {
        let mint = Pubkey::new_unique();
        let registry = registry(vec![(mint, mint_account(8))]);
        let first = registry.resolve(&mint.to_string()).await.unwrap();
        // Re-resolving hits the cache even though the mock would still answer.
        let second = registry.resolve(&mint.to_string()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.cache.len(), 1);
    }
}
