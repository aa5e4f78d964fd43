//! Quote-streaming wire client.
//!
//! This crate speaks the Titan quote-stream protocol:
//! - MessagePack frame codec with optional compressed payloads
//! - Authenticated WebSocket session with request/response and stream
//!   multiplexing by correlation id
//! - Quote stream management: batch aggregation, ranking, and a live
//!   "current best" view

pub mod codec;
mod error;
pub mod protocol;
mod quotes;
mod session;
mod stream;

pub use error::WireError;
pub use quotes::{best_quote, Quote, QuoteBatch, QuotePayload, QuoteRequest};
pub use session::{Session, StreamEvent, StreamHandle};
pub use stream::{stream_quotes, QuoteStream, QuoteStreamConfig};
