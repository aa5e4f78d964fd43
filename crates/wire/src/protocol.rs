//! Message types for the quote-stream protocol.
//!
//! Variant tags are case-sensitive on the wire. Variants without associated
//! data encode as bare strings; variants with data encode as `{tag: value}`
//! maps (see the codec module). Pubkeys are raw 32-byte bin values.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Client-chosen id correlating requests with server frames.
pub type CorrelationId = u64;

/// Serde adapters for `Pubkey` as a MessagePack bin value.
pub(crate) mod pubkey_bytes {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;

    pub fn serialize<S: Serializer>(key: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(key.as_ref())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let buf = serde_bytes::ByteBuf::deserialize(deserializer)?;
        let raw: [u8; 32] = buf
            .as_slice()
            .try_into()
            .map_err(|_| D::Error::invalid_length(buf.len(), &"a 32-byte pubkey"))?;
        Ok(Pubkey::new_from_array(raw))
    }
}

/// Same adapter for sequences of pubkeys.
pub(crate) mod pubkey_bytes_vec {
    use serde::de::Error as _;
    use serde::ser::SerializeSeq;
    use serde::{Deserialize, Deserializer, Serializer};
    use solana_sdk::pubkey::Pubkey;

    pub fn serialize<S: Serializer>(keys: &[Pubkey], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(keys.len()))?;
        for key in keys {
            seq.serialize_element(serde_bytes::Bytes::new(key.as_ref()))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Pubkey>, D::Error> {
        let bufs: Vec<serde_bytes::ByteBuf> = Vec::deserialize(deserializer)?;
        bufs.into_iter()
            .map(|buf| {
                let raw: [u8; 32] = buf
                    .as_slice()
                    .try_into()
                    .map_err(|_| D::Error::invalid_length(buf.len(), &"a 32-byte pubkey"))?;
                Ok(Pubkey::new_from_array(raw))
            })
            .collect()
    }
}

/// Messages the client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Session probe; the server answers with a correlation id of 0.
    GetInfo,
    NewSwapQuoteStream {
        correlation_id: CorrelationId,
        #[serde(with = "pubkey_bytes")]
        input_mint: Pubkey,
        #[serde(with = "pubkey_bytes")]
        output_mint: Pubkey,
        amount: u64,
        #[serde(with = "pubkey_bytes")]
        user_pubkey: Pubkey,
        slippage_bps: u16,
        max_quotes: u8,
        interval_ms: u16,
    },
    StopStream { correlation_id: CorrelationId },
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    Response {
        correlation_id: CorrelationId,
        payload: ResponsePayload,
    },
    Error {
        correlation_id: Option<CorrelationId>,
        code: String,
        message: String,
    },
    StreamData {
        correlation_id: CorrelationId,
        payload: SwapQuotes,
    },
    StreamEnd {
        correlation_id: CorrelationId,
        reason: String,
    },
}

/// Payload of a request/response exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ResponsePayload {
    Info(ServerInfo),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

/// One stream update: the complete current candidate set, not a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapQuotes {
    pub quotes: Vec<WireQuote>,
}

/// A single provider quote as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireQuote {
    pub provider_id: String,
    /// Ordered venue names describing the route.
    pub route: Vec<String>,
    pub in_amount: u64,
    pub out_amount: u64,
    pub price_impact_bps: u16,
    pub platform_fee_bps: u16,
    pub compute_units: Option<u32>,
    pub payload: WireQuotePayload,
}

/// How the winning swap is materialized into a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireQuotePayload {
    /// A fully serialized versioned transaction built server-side.
    Prebuilt {
        #[serde(with = "serde_bytes")]
        transaction: Vec<u8>,
    },
    /// Raw instructions plus the lookup tables that compress their accounts.
    Instructions {
        instructions: Vec<WireInstruction>,
        #[serde(with = "pubkey_bytes_vec")]
        lookup_tables: Vec<Pubkey>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireInstruction {
    #[serde(with = "pubkey_bytes")]
    pub program_id: Pubkey,
    pub accounts: Vec<WireAccountMeta>,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireAccountMeta {
    #[serde(with = "pubkey_bytes")]
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}
