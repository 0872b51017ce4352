//! Transport seam between the connection manager and the network.
//!
//! DESIGN
//! ======
//! A [`Transport`] allocates one [`Socket`] per connect attempt and reports
//! what happens to it through an [`EventSink`] tagged with the attempt's
//! generation. The manager never touches the network directly, so tests can
//! script every transport signal by hand.
//!
//! [`WsTransport`] is the production implementation on `tokio-tungstenite`.
//! Each socket runs as a local task: the handshake, then a `select!` loop
//! relaying caller writes to the stream and stream frames to the sink.
//!
//! Implementations must deliver events from their own task, never
//! synchronously from `open`, `send` or `close`.

use std::rc::Rc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::machine::Generation;

/// Signal raised by a socket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The socket failed. A close follows.
    Error(String),
    /// The socket is gone.
    Closed,
}

type Deliver = dyn Fn(Generation, TransportEvent);

/// Where a socket reports its events.
#[derive(Clone)]
pub struct EventSink {
    generation: Generation,
    deliver: Rc<Deliver>,
}

impl EventSink {
    pub fn new(generation: Generation, deliver: impl Fn(Generation, TransportEvent) + 'static) -> Self {
        Self { generation, deliver: Rc::new(deliver) }
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.deliver)(self.generation, event);
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Opened);
    }

    pub fn message(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Message(text.into()));
    }

    pub fn error(&self, detail: impl Into<String>) {
        self.emit(TransportEvent::Error(detail.into()));
    }

    pub fn closed(&self) {
        self.emit(TransportEvent::Closed);
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink").field("generation", &self.generation).finish_non_exhaustive()
    }
}

/// Write half of one connect attempt, owned by the connection manager.
pub trait Socket {
    /// Queue a text frame. Fire-and-forget.
    fn send(&mut self, text: String);
    /// Start closing the socket.
    fn close(&mut self);
}

/// Opens sockets to an endpoint.
pub trait Transport {
    fn open(&self, endpoint: &str, events: EventSink) -> Box<dyn Socket>;
}

// =============================================================================
// TOKIO-TUNGSTENITE
// =============================================================================

/// WebSocket transport running on the current `LocalSet`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsTransport;

enum Outgoing {
    Text(String),
    Close,
}

struct WsSocket {
    tx: mpsc::UnboundedSender<Outgoing>,
}

impl Socket for WsSocket {
    fn send(&mut self, text: String) {
        if self.tx.send(Outgoing::Text(text)).is_err() {
            debug!("websocket writer already gone; frame dropped");
        }
    }

    fn close(&mut self) {
        if self.tx.send(Outgoing::Close).is_err() {
            debug!("websocket writer already gone");
        }
    }
}

impl Transport for WsTransport {
    /// # Panics
    ///
    /// Panics when called outside a `tokio::task::LocalSet`.
    fn open(&self, endpoint: &str, events: EventSink) -> Box<dyn Socket> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::task::spawn_local(run_socket(endpoint.to_owned(), events, rx));
        Box::new(WsSocket { tx })
    }
}

async fn run_socket(endpoint: String, events: EventSink, mut rx: mpsc::UnboundedReceiver<Outgoing>) {
    let stream = match connect_async(endpoint.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            events.error(e.to_string());
            events.closed();
            return;
        }
    };
    events.opened();

    let (mut ws_write, mut ws_read) = stream.split();

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = ws_write.send(Message::text(text)).await {
                        events.error(e.to_string());
                        break;
                    }
                }
                // Caller closed or dropped the socket.
                Some(Outgoing::Close) | None => {
                    if let Err(e) = ws_write.close().await {
                        debug!(error = %e, "websocket close handshake failed");
                    }
                    break;
                }
            },
            incoming = ws_read.next() => match incoming {
                Some(Ok(Message::Text(text))) => events.message(text.as_str()),
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "websocket recv error");
                    events.error(e.to_string());
                    break;
                }
            },
        }
    }

    events.closed();
}
