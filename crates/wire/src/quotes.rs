//! Domain quote types and ranking.

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use crate::protocol::{
    ClientMessage, CorrelationId, SwapQuotes, WireQuote, WireQuotePayload,
};

/// Parameters of one quote stream. Lifetime is bounded by the stream it
/// opens.
#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    /// Input amount in integer base units.
    pub input_amount: u64,
    pub user_pubkey: Pubkey,
    pub slippage_bps: u16,
    pub max_quotes_per_update: u8,
    pub update_interval_ms: u16,
}

impl QuoteRequest {
    /// Create a request with default stream parameters.
    pub fn new(
        input_mint: Pubkey,
        output_mint: Pubkey,
        input_amount: u64,
        user_pubkey: Pubkey,
    ) -> Self {
        Self {
            input_mint,
            output_mint,
            input_amount,
            user_pubkey,
            slippage_bps: 50,
            max_quotes_per_update: 8,
            update_interval_ms: 500,
        }
    }

    /// Set slippage tolerance, capped at 100%.
    pub fn with_slippage_bps(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = slippage_bps.min(10_000);
        self
    }

    /// Set quotes per update, clamped to the protocol range [1, 16].
    pub fn with_max_quotes(mut self, max_quotes: u8) -> Self {
        self.max_quotes_per_update = max_quotes.clamp(1, 16);
        self
    }

    /// Set the update interval, clamped to the protocol range [100, 5000] ms.
    pub fn with_update_interval_ms(mut self, interval_ms: u16) -> Self {
        self.update_interval_ms = interval_ms.clamp(100, 5000);
        self
    }

    pub(crate) fn to_message(&self, correlation_id: CorrelationId) -> ClientMessage {
        ClientMessage::NewSwapQuoteStream {
            correlation_id,
            input_mint: self.input_mint,
            output_mint: self.output_mint,
            amount: self.input_amount,
            user_pubkey: self.user_pubkey,
            slippage_bps: self.slippage_bps,
            max_quotes: self.max_quotes_per_update,
            interval_ms: self.update_interval_ms,
        }
    }
}

/// A provider's offer to perform the swap.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub provider_id: String,
    pub route: Vec<String>,
    pub in_amount: u64,
    pub out_amount: u64,
    pub price_impact_bps: u16,
    pub platform_fee_bps: u16,
    pub compute_units: Option<u32>,
    pub payload: QuotePayload,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QuotePayload {
    Prebuilt {
        transaction: Vec<u8>,
    },
    Instructions {
        instructions: Vec<Instruction>,
        lookup_tables: Vec<Pubkey>,
    },
}

impl From<WireQuote> for Quote {
    fn from(wire: WireQuote) -> Self {
        let payload = match wire.payload {
            WireQuotePayload::Prebuilt { transaction } => QuotePayload::Prebuilt { transaction },
            WireQuotePayload::Instructions {
                instructions,
                lookup_tables,
            } => QuotePayload::Instructions {
                instructions: instructions
                    .into_iter()
                    .map(|ix| Instruction {
                        program_id: ix.program_id,
                        accounts: ix
                            .accounts
                            .into_iter()
                            .map(|meta| AccountMeta {
                                pubkey: meta.pubkey,
                                is_signer: meta.is_signer,
                                is_writable: meta.is_writable,
                            })
                            .collect(),
                        data: ix.data,
                    })
                    .collect(),
                lookup_tables,
            },
        };
        Quote {
            provider_id: wire.provider_id,
            route: wire.route,
            in_amount: wire.in_amount,
            out_amount: wire.out_amount,
            price_impact_bps: wire.price_impact_bps,
            platform_fee_bps: wire.platform_fee_bps,
            compute_units: wire.compute_units,
            payload,
        }
    }
}

/// One server update. Each batch is the complete current candidate set;
/// ranking ignores the order quotes arrive in.
#[derive(Debug, Clone, Default)]
pub struct QuoteBatch {
    pub quotes: Vec<Quote>,
}

impl QuoteBatch {
    pub(crate) fn from_wire(update: SwapQuotes) -> Self {
        Self {
            quotes: update.quotes.into_iter().map(Quote::from).collect(),
        }
    }

    /// A batch with no quote paying out anything is treated as empty.
    pub fn has_usable_quotes(&self) -> bool {
        self.quotes.iter().any(|quote| quote.out_amount > 0)
    }

    /// The winning quote of this batch, if any quote is usable.
    pub fn best(&self) -> Option<&Quote> {
        best_quote(&self.quotes)
    }
}

/// Select the winning quote: maximal `out_amount`, ties broken by lowest
/// `price_impact_bps`, then lexicographically smallest `provider_id`.
/// Quotes with `out_amount == 0` never win.
pub fn best_quote(quotes: &[Quote]) -> Option<&Quote> {
    quotes
        .iter()
        .filter(|quote| quote.out_amount > 0)
        .reduce(|best, candidate| if beats(candidate, best) { candidate } else { best })
}

fn beats(candidate: &Quote, best: &Quote) -> bool {
    (
        candidate.out_amount,
        std::cmp::Reverse(candidate.price_impact_bps),
        std::cmp::Reverse(candidate.provider_id.as_str()),
    ) > (
        best.out_amount,
        std::cmp::Reverse(best.price_impact_bps),
        std::cmp::Reverse(best.provider_id.as_str()),
    )
}
