//! Authenticated WebSocket session.
//!
//! One session owns one socket. The read and write halves run as two
//! cooperative tasks; inbound frames are routed to pending request futures
//! and active stream channels by correlation id. A session that loses its
//! socket fails every pending consumer and is not reused.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, warn};
use url::Url;

use crate::codec;
use crate::error::WireError;
use crate::protocol::{ClientMessage, CorrelationId, ResponsePayload, ServerMessage, SwapQuotes};
use crate::quotes::QuoteRequest;

/// `GetInfo` carries no id of its own; the server answers it on id 0.
/// Stream correlation ids start at 1.
const PROBE_CORRELATION_ID: CorrelationId = 0;

const CHANNEL_CAPACITY: usize = 32;

/// Where inbound frames for a correlation id are delivered.
enum Route {
    Request(oneshot::Sender<Result<ResponsePayload, WireError>>),
    Stream(mpsc::Sender<StreamEvent>),
}

/// Events delivered to a stream consumer.
#[derive(Debug)]
pub enum StreamEvent {
    Data(SwapQuotes),
    End { reason: String },
    Failed(WireError),
}

type Routes = Arc<DashMap<CorrelationId, Route>>;

/// An authenticated session over one WebSocket.
pub struct Session {
    outbound: mpsc::Sender<Message>,
    routes: Routes,
    next_id: AtomicU64,
}

impl Session {
    /// Open the socket and authenticate with a bearer credential in the
    /// upgrade request headers.
    pub async fn connect(endpoint: &Url, auth_token: &str) -> Result<Self, WireError> {
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|err| WireError::Transport(err.to_string()))?;
        let bearer: HeaderValue = format!("Bearer {auth_token}")
            .parse()
            .map_err(|_| WireError::AuthRejected("credential is not a valid header value".into()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, _response) = connect_async(request).await.map_err(|err| match err {
            tungstenite::Error::Http(response)
                if response.status().as_u16() == 401 || response.status().as_u16() == 403 =>
            {
                WireError::AuthRejected(format!("upgrade refused with {}", response.status()))
            }
            other => WireError::Transport(other.to_string()),
        })?;
        debug!(endpoint = %endpoint, "wire session established");

        let (write, read) = socket.split();
        Ok(Self::spawn(write, read))
    }

    /// Wire the read/write tasks over an already-open transport.
    pub(crate) fn spawn<W, R>(write: W, read: R) -> Self
    where
        W: Sink<Message> + Send + Unpin + 'static,
        W::Error: std::fmt::Display,
        R: Stream<Item = Result<Message, tungstenite::Error>> + Send + Unpin + 'static,
    {
        let routes: Routes = Arc::new(DashMap::new());
        let (outbound, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(write_loop(write, outbound_rx));
        tokio::spawn(read_loop(read, Arc::clone(&routes)));
        Self {
            outbound,
            routes,
            next_id: AtomicU64::new(PROBE_CORRELATION_ID + 1),
        }
    }

    /// Probe the server. Synchronous request/response on the shared socket.
    pub async fn get_info(&self) -> Result<ResponsePayload, WireError> {
        let (tx, rx) = oneshot::channel();
        self.routes.insert(PROBE_CORRELATION_ID, Route::Request(tx));
        if let Err(err) = self.send(&ClientMessage::GetInfo).await {
            self.routes.remove(&PROBE_CORRELATION_ID);
            return Err(err);
        }
        rx.await
            .map_err(|_| WireError::Transport("session closed before the response".into()))?
    }

    /// Open a quote stream and return a handle delivering its events.
    pub async fn open_quote_stream(
        &self,
        request: &QuoteRequest,
    ) -> Result<StreamHandle, WireError> {
        let correlation_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.routes.insert(correlation_id, Route::Stream(tx));
        if let Err(err) = self.send(&request.to_message(correlation_id)).await {
            self.routes.remove(&correlation_id);
            return Err(err);
        }
        Ok(StreamHandle {
            correlation_id,
            events: rx,
            outbound: self.outbound.clone(),
            routes: Arc::clone(&self.routes),
            cancelled: false,
        })
    }

    async fn send(&self, message: &ClientMessage) -> Result<(), WireError> {
        let bytes = codec::encode_message(message)?;
        self.outbound
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|_| WireError::Transport("session write task is gone".into()))
    }
}

/// Consumer side of one quote stream.
///
/// Dropping or cancelling the handle unroutes the correlation id first and
/// then sends `StopStream`, so no event for this stream is observable after
/// `cancel` returns.
pub struct StreamHandle {
    correlation_id: CorrelationId,
    events: mpsc::Receiver<StreamEvent>,
    outbound: mpsc::Sender<Message>,
    routes: Routes,
    cancelled: bool,
}

impl StreamHandle {
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    pub async fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.routes.remove(&self.correlation_id);
        self.events.close();
        while self.events.try_recv().is_ok() {}
        if let Ok(bytes) =
            codec::encode_message(&ClientMessage::StopStream { correlation_id: self.correlation_id })
        {
            let _ = self.outbound.send(Message::Binary(bytes.into())).await;
        }
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        if self.cancelled {
            return;
        }
        self.routes.remove(&self.correlation_id);
        if let Ok(bytes) =
            codec::encode_message(&ClientMessage::StopStream { correlation_id: self.correlation_id })
        {
            let _ = self.outbound.try_send(Message::Binary(bytes.into()));
        }
    }
}

async fn write_loop<W>(mut write: W, mut outbound: mpsc::Receiver<Message>)
where
    W: Sink<Message> + Unpin,
    W::Error: std::fmt::Display,
{
    while let Some(message) = outbound.recv().await {
        if let Err(err) = write.send(message).await {
            warn!(error = %err, "wire write failed; dropping session");
            break;
        }
    }
    let _ = write.close().await;
}

async fn read_loop<R>(mut read: R, routes: Routes)
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let failure = loop {
        match read.next().await {
            Some(Ok(Message::Binary(payload))) => {
                match codec::decode_message::<ServerMessage>(&payload) {
                    Ok(message) => {
                        if let Some(fatal) = dispatch(&routes, message).await {
                            break fatal;
                        }
                    }
                    // Malformed frames tear the session down.
                    Err(err) => break WireError::from(err),
                }
            }
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                break WireError::Transport(format!("socket closed by server: {reason}"));
            }
            // Ping/pong answered by the transport; text frames are not part
            // of this protocol.
            Some(Ok(_)) => continue,
            Some(Err(err)) => break WireError::Transport(err.to_string()),
            None => break WireError::Transport("socket closed".into()),
        }
    };
    fail_all(&routes, failure).await;
}

/// Route one server message. Returns a fatal error for frames that cannot be
/// attributed to a single consumer.
async fn dispatch(routes: &DashMap<CorrelationId, Route>, message: ServerMessage) -> Option<WireError> {
    match message {
        ServerMessage::Response {
            correlation_id,
            payload,
        } => {
            if let Some((_, Route::Request(tx))) = routes.remove(&correlation_id) {
                let _ = tx.send(Ok(payload));
            }
            None
        }
        ServerMessage::Error {
            correlation_id: Some(correlation_id),
            code,
            message,
        } => {
            if let Some((_, route)) = routes.remove(&correlation_id) {
                let err = WireError::Server { code, message };
                match route {
                    Route::Request(tx) => {
                        let _ = tx.send(Err(err));
                    }
                    Route::Stream(tx) => {
                        let _ = tx.send(StreamEvent::Failed(err)).await;
                    }
                }
            }
            None
        }
        // An error the server could not correlate poisons the whole session.
        ServerMessage::Error {
            correlation_id: None,
            code,
            message,
        } => Some(WireError::Server { code, message }),
        ServerMessage::StreamData {
            correlation_id,
            payload,
        } => {
            let sender = routes.get(&correlation_id).and_then(|route| match route.value() {
                Route::Stream(tx) => Some(tx.clone()),
                Route::Request(_) => None,
            });
            if let Some(tx) = sender {
                // Await here so socket reads slow down with a slow consumer.
                if tx.send(StreamEvent::Data(payload)).await.is_err() {
                    routes.remove(&correlation_id);
                }
            }
            None
        }
        ServerMessage::StreamEnd {
            correlation_id,
            reason,
        } => {
            if let Some((_, Route::Stream(tx))) = routes.remove(&correlation_id) {
                let _ = tx.send(StreamEvent::End { reason }).await;
            }
            None
        }
    }
}

async fn fail_all(routes: &DashMap<CorrelationId, Route>, failure: WireError) {
    let ids: Vec<CorrelationId> = routes.iter().map(|entry| *entry.key()).collect();
    for id in ids {
        if let Some((_, route)) = routes.remove(&id) {
            match route {
                Route::Request(tx) => {
                    let _ = tx.send(Err(failure.clone()));
                }
                Route::Stream(tx) => {
                    let _ = tx.send(StreamEvent::Failed(failure.clone())).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use solana_sdk::pubkey::Pubkey;

    use super::*;
    use crate::protocol::{ServerInfo, WireQuote, WireQuotePayload};

    /// A fake socket: the session writes into `sent` and reads from `inbound`.
    struct Harness {
        session: Session,
        inbound: futures::channel::mpsc::UnboundedSender<Result<Message, tungstenite::Error>>,
        sent: mpsc::UnboundedReceiver<Message>,
    }

    fn harness() -> Harness {
        let (inbound, read) = futures::channel::mpsc::unbounded();
        let (sent_tx, sent) = mpsc::unbounded_channel();
        let write = futures::sink::unfold(sent_tx, |sent_tx, message: Message| async move {
            sent_tx
                .send(message)
                .map_err(|_| tungstenite::Error::ConnectionClosed)?;
            Ok::<_, tungstenite::Error>(sent_tx)
        });
        let session = Session::spawn(Box::pin(write), read);
        Harness {
            session,
            inbound,
            sent,
        }
    }

    fn push(harness: &Harness, message: &ServerMessage) {
        let bytes = codec::encode_message(message).unwrap();
        harness
            .inbound
            .unbounded_send(Ok(Message::Binary(bytes.into())))
            .unwrap();
    }

    fn sent_message(message: Message) -> ClientMessage {
        match message {
            Message::Binary(bytes) => codec::decode_message(&bytes).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    fn request() -> QuoteRequest {
        QuoteRequest::new(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            50_000_000,
            Pubkey::new_unique(),
        )
    }

    fn update(out_amount: u64) -> SwapQuotes {
        SwapQuotes {
            quotes: vec![WireQuote {
                provider_id: "A".to_string(),
                route: vec!["Orca".to_string()],
                in_amount: 50_000_000,
                out_amount,
                price_impact_bps: 3,
                platform_fee_bps: 0,
                compute_units: Some(200_000),
                payload: WireQuotePayload::Prebuilt { transaction: vec![] },
            }],
        }
    }

    #[tokio::test]
    async fn test_request_response_round_trip() {
        let Harness {
            session,
            inbound,
            mut sent,
        } = harness();
        let probe = tokio::spawn(async move { session.get_info().await });

        // The probe goes out before the server answers on id 0.
        let outbound = sent.recv().await.unwrap();
        assert_eq!(sent_message(outbound), ClientMessage::GetInfo);

        let frame = codec::encode_message(&ServerMessage::Response {
            correlation_id: 0,
            payload: ResponsePayload::Info(ServerInfo {
                name: "titan".to_string(),
                version: "1".to_string(),
            }),
        })
        .unwrap();
        inbound
            .unbounded_send(Ok(Message::Binary(frame.into())))
            .unwrap();

        let payload = probe.await.unwrap().unwrap();
        assert!(matches!(payload, ResponsePayload::Info(info) if info.name == "titan"));
    }

    #[tokio::test]
    async fn test_stream_data_routed_by_correlation_id() {
        let mut harness = harness();
        let mut stream = harness.session.open_quote_stream(&request()).await.unwrap();

        let opened = sent_message(harness.sent.recv().await.unwrap());
        let id = match opened {
            ClientMessage::NewSwapQuoteStream { correlation_id, .. } => correlation_id,
            other => panic!("unexpected message: {other:?}"),
        };

        push(
            &harness,
            &ServerMessage::StreamData {
                correlation_id: id,
                payload: update(9_721_400),
            },
        );
        // Data for someone else never reaches this consumer.
        push(
            &harness,
            &ServerMessage::StreamData {
                correlation_id: id + 100,
                payload: update(1),
            },
        );
        push(
            &harness,
            &ServerMessage::StreamEnd {
                correlation_id: id,
                reason: "complete".to_string(),
            },
        );

        match stream.next_event().await {
            Some(StreamEvent::Data(quotes)) => assert_eq!(quotes.quotes[0].out_amount, 9_721_400),
            other => panic!("unexpected event: {other:?}"),
        }
        match stream.next_event().await {
            Some(StreamEvent::End { reason }) => assert_eq!(reason, "complete"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_sends_stop_stream_and_goes_quiet() {
        let mut harness = harness();
        let mut stream = harness.session.open_quote_stream(&request()).await.unwrap();
        let id = match sent_message(harness.sent.recv().await.unwrap()) {
            ClientMessage::NewSwapQuoteStream { correlation_id, .. } => correlation_id,
            other => panic!("unexpected message: {other:?}"),
        };

        push(
            &harness,
            &ServerMessage::StreamData {
                correlation_id: id,
                payload: update(100),
            },
        );
        tokio::task::yield_now().await;

        stream.cancel().await;

        // StopStream hits the wire immediately.
        match sent_message(harness.sent.recv().await.unwrap()) {
            ClientMessage::StopStream { correlation_id } => assert_eq!(correlation_id, id),
            other => panic!("unexpected message: {other:?}"),
        }

        // A straggling server frame after cancellation is never observable.
        push(
            &harness,
            &ServerMessage::StreamData {
                correlation_id: id,
                payload: update(200),
            },
        );
        tokio::task::yield_now().await;
        assert!(stream.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_socket_loss_fails_active_consumers() {
        let mut harness = harness();
        let mut stream = harness.session.open_quote_stream(&request()).await.unwrap();
        let _ = harness.sent.recv().await.unwrap();

        // Server goes away without a close frame.
        drop(harness.inbound);

        match stream.next_event().await {
            Some(StreamEvent::Failed(WireError::Transport(_))) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_uncorrelated_error_poisons_the_session() {
        let mut harness = harness();
        let mut stream = harness.session.open_quote_stream(&request()).await.unwrap();
        let _ = harness.sent.recv().await.unwrap();

        push(
            &harness,
            &ServerMessage::Error {
                correlation_id: None,
                code: "internal".to_string(),
                message: "router restarting".to_string(),
            },
        );

        match stream.next_event().await {
            Some(StreamEvent::Failed(WireError::Server { code, .. })) => {
                assert_eq!(code, "internal");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_frame_tears_the_session_down() {
        let mut harness = harness();
        let mut stream = harness.session.open_quote_stream(&request()).await.unwrap();
        let _ = harness.sent.recv().await.unwrap();

        harness
            .inbound
            .unbounded_send(Ok(Message::Binary(vec![0xff, 0x13].into())))
            .unwrap();

        match stream.next_event().await {
            Some(StreamEvent::Failed(WireError::Codec(_))) => {}
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
