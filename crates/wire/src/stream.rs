//! Quote stream management.
//!
//! Opens a stream over the session, yields each batch as it arrives, and
//! keeps the current winning quote derived from the most recent batch.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::WireError;
use crate::quotes::{Quote, QuoteBatch, QuoteRequest};
use crate::session::{Session, StreamEvent, StreamHandle};

#[derive(Debug, Clone)]
pub struct QuoteStreamConfig {
    /// How long to wait for the first usable batch before failing the stream.
    pub first_batch_deadline: Duration,
}

impl Default for QuoteStreamConfig {
    fn default() -> Self {
        Self {
            first_batch_deadline: Duration::from_secs(10),
        }
    }
}

/// Open a quote stream for the given request.
pub async fn stream_quotes(
    session: &Session,
    request: QuoteRequest,
    config: QuoteStreamConfig,
) -> Result<QuoteStream, WireError> {
    let handle = session.open_quote_stream(&request).await?;
    debug!(
        input = %request.input_mint,
        output = %request.output_mint,
        amount = request.input_amount,
        interval_ms = request.update_interval_ms,
        "quote stream opened"
    );
    Ok(QuoteStream {
        handle,
        best: None,
        deadline: Instant::now() + config.first_batch_deadline,
        saw_quotes: false,
        ended: false,
    })
}

/// A live quote stream.
///
/// Each yielded batch is the complete current candidate set; the winning
/// quote visible through [`QuoteStream::best`] depends only on the most
/// recent usable batch.
pub struct QuoteStream {
    handle: StreamHandle,
    best: Option<Quote>,
    deadline: Instant,
    saw_quotes: bool,
    ended: bool,
}

impl QuoteStream {
    /// Await the next batch. `Ok(None)` means the server ended the stream.
    ///
    /// Until the first usable batch arrives this races the first-batch
    /// deadline; hitting it cancels the stream and returns
    /// [`WireError::NoQuotes`].
    pub async fn next_batch(&mut self) -> Result<Option<QuoteBatch>, WireError> {
        if self.ended {
            return Ok(None);
        }
        let event = if self.saw_quotes {
            self.handle.next_event().await
        } else {
            match tokio::time::timeout_at(self.deadline, self.handle.next_event()).await {
                Ok(event) => event,
                Err(_) => {
                    self.ended = true;
                    self.handle.cancel().await;
                    return Err(WireError::NoQuotes);
                }
            }
        };
        match event {
            Some(StreamEvent::Data(update)) => {
                let batch = QuoteBatch::from_wire(update);
                if batch.has_usable_quotes() {
                    self.saw_quotes = true;
                    self.best = batch.best().cloned();
                }
                Ok(Some(batch))
            }
            Some(StreamEvent::End { reason }) => {
                debug!(reason, "quote stream ended by server");
                self.ended = true;
                Ok(None)
            }
            Some(StreamEvent::Failed(err)) => {
                self.ended = true;
                Err(err)
            }
            None => {
                self.ended = true;
                Err(WireError::Transport("stream channel closed".into()))
            }
        }
    }

    /// The winning quote of the most recent usable batch.
    pub fn best(&self) -> Option<&Quote> {
        self.best.as_ref()
    }

    /// Cancel the stream. Sends `StopStream`; once this returns no further
    /// batch is observable.
    pub async fn cancel(&mut self) {
        self.ended = true;
        self.handle.cancel().await;
    }
}
