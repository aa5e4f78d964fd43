//! Address lookup table loading.
//!
//! An on-chain table is a header region followed by packed 32-byte
//! addresses. Transactions reference table entries by `(table, index)` to
//! keep serialized size under the wire ceiling.

use solana_sdk::pubkey::Pubkey;

use crate::provider::{ChainRpc, RpcError};

/// Offset of the first address in a lookup table account: the 56-byte fixed
/// header plus the discriminator region.
pub const LOOKUP_ADDRESSES_OFFSET: usize = 61;

/// A table can index at most 256 addresses.
const MAX_TABLE_ADDRESSES: usize = 256;

/// A lookup table fetched from chain.
#[derive(Debug, Clone)]
pub struct LookupTable {
    pub key: Pubkey,
    pub addresses: Vec<Pubkey>,
}

impl LookupTable {
    /// Parse raw account data.
    ///
    /// Data shorter than the header yields an empty (valid, unpopulated)
    /// table; a trailing partial address is truncated.
    pub fn parse(key: Pubkey, data: &[u8]) -> Self {
        let addresses = data
            .get(LOOKUP_ADDRESSES_OFFSET..)
            .unwrap_or(&[])
            .chunks_exact(32)
            .filter_map(|chunk| Pubkey::try_from(chunk).ok())
            .take(MAX_TABLE_ADDRESSES)
            .collect();
        Self { key, addresses }
    }

    /// Index of `key` in this table, if present and addressable.
    pub fn position(&self, key: &Pubkey) -> Option<u8> {
        self.addresses
            .iter()
            .position(|address| address == key)
            .map(|index| index as u8)
    }
}

/// Fetch and parse every table the quote references, in order.
pub async fn load_lookup_tables<R: ChainRpc>(
    rpc: &R,
    keys: &[Pubkey],
) -> Result<Vec<LookupTable>, RpcError> {
    let mut tables = Vec::with_capacity(keys.len());
    for key in keys {
        let data = rpc.account_data(key).await?;
        tables.push(LookupTable::parse(*key, &data));
    }
    Ok(tables)
}
