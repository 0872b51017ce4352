//! Connection manager: one self-healing WebSocket channel to a fixed endpoint.
//!
//! DESIGN
//! ======
//! `Connection` is a cheap `Rc` handle over shared single-threaded state.
//! The [`Machine`] decides every transition; this module executes its
//! commands (open a socket, close it, arm or abort the retry timer) and
//! routes inbound frames to the three handler slots.
//!
//! Everything runs on one `tokio::task::LocalSet`, so there are no locks.
//! Handlers are cloned out of their slot before being called and no
//! `RefCell` borrow is held across a call, which lets a handler call back
//! into `send`, `connect` or `disconnect`.
//!
//! FAILURES
//! ========
//! No method returns an error. Decode failures, transport failures and
//! sends outside the open state go to the error handler as a
//! [`ConnectionError`]; without a handler they are logged and dropped.
//! Running out of reconnect attempts is only logged; the connection stays
//! `Closed` until the caller connects again.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use frames::{ChatUpdate, InboundFrame, OutboundFrame, StepProgress};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::ConnectionError;
use crate::machine::{Command, ConnectionState, Generation, Machine};
use crate::transport::{EventSink, Socket, Transport, TransportEvent, WsTransport};

type MessageHandler = Rc<dyn Fn(ChatUpdate)>;
type StepHandler = Rc<dyn Fn(StepProgress)>;
type ErrorHandler = Rc<dyn Fn(ConnectionError)>;

/// One slot per event class; registering replaces the previous handler.
#[derive(Default)]
struct Handlers {
    message: RefCell<Option<MessageHandler>>,
    step: RefCell<Option<StepHandler>>,
    error: RefCell<Option<ErrorHandler>>,
}

struct Inner {
    endpoint: String,
    transport: Box<dyn Transport>,
    machine: RefCell<Machine>,
    socket: RefCell<Option<Box<dyn Socket>>>,
    retry: RefCell<Option<JoinHandle<()>>>,
    handlers: Handlers,
}

/// Handle to a persistent chat channel.
///
/// Clones share the same connection. Must be driven from inside a
/// `tokio::task::LocalSet`.
#[derive(Clone)]
pub struct Connection {
    inner: Rc<Inner>,
}

impl Connection {
    /// Connection over the tokio-tungstenite transport. Nothing is opened
    /// until [`Connection::connect`].
    #[must_use]
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_transport(config, WsTransport)
    }

    #[must_use]
    pub fn with_transport(config: ConnectionConfig, transport: impl Transport + 'static) -> Self {
        Self {
            inner: Rc::new(Inner {
                endpoint: config.endpoint,
                transport: Box::new(transport),
                machine: RefCell::new(Machine::new(config.reconnect)),
                socket: RefCell::new(None),
                retry: RefCell::new(None),
                handlers: Handlers::default(),
            }),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.machine.borrow().state()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.machine.borrow().is_open()
    }

    /// Consecutive automatic reconnects since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.machine.borrow().reconnect_attempts()
    }

    /// Start opening the channel. Does nothing while a socket is connecting
    /// or open. The outcome arrives later through the handlers.
    pub fn connect(&self) {
        let commands = self.inner.machine.borrow_mut().connect();
        if commands.is_empty() {
            debug!(endpoint = %self.inner.endpoint, "connect ignored; socket already active");
            return;
        }
        self.inner.execute(commands);
    }

    /// Close the channel and stop all automatic reconnection, including a
    /// retry that is already scheduled.
    pub fn disconnect(&self) {
        let commands = self.inner.machine.borrow_mut().disconnect();
        info!(endpoint = %self.inner.endpoint, "websocket disconnect requested");
        self.inner.execute(commands);
    }

    /// Write `frame` now if the channel is open.
    ///
    /// Otherwise reports [`ConnectionError::NotConnected`] and drops the
    /// frame; nothing is queued for a later open.
    pub fn send(&self, frame: &OutboundFrame) {
        if !self.is_open() {
            warn!(endpoint = %self.inner.endpoint, "websocket not connected, message not sent");
            self.inner.report(ConnectionError::NotConnected);
            return;
        }
        let text = frames::encode_outbound(frame);
        if let Some(socket) = self.inner.socket.borrow_mut().as_mut() {
            socket.send(text);
        }
    }

    pub fn send_message(&self, message: impl Into<String>) {
        self.send(&OutboundFrame::new(message));
    }

    /// Handle chat updates received from now on.
    pub fn on_message(&self, handler: impl Fn(ChatUpdate) + 'static) {
        *self.inner.handlers.message.borrow_mut() = Some(Rc::new(handler));
    }

    /// Handle step-progress notices received from now on.
    pub fn on_step(&self, handler: impl Fn(StepProgress) + 'static) {
        *self.inner.handlers.step.borrow_mut() = Some(Rc::new(handler));
    }

    /// Handle failures raised from now on.
    pub fn on_error(&self, handler: impl Fn(ConnectionError) + 'static) {
        *self.inner.handlers.error.borrow_mut() = Some(Rc::new(handler));
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// COMMANDS
// =============================================================================

impl Inner {
    fn execute(self: &Rc<Self>, commands: impl IntoIterator<Item = Command>) {
        for command in commands {
            match command {
                Command::Open { generation } => self.open_socket(generation),
                Command::Close => {
                    let socket = self.socket.borrow_mut().take();
                    if let Some(mut socket) = socket {
                        socket.close();
                    }
                }
                Command::ScheduleRetry { delay, attempt } => self.schedule_retry(delay, attempt),
                Command::CancelRetry => {
                    let pending = self.retry.borrow_mut().take();
                    if let Some(handle) = pending {
                        debug!(endpoint = %self.endpoint, "pending reconnect cancelled");
                        handle.abort();
                    }
                }
            }
        }
    }

    fn open_socket(self: &Rc<Self>, generation: Generation) {
        debug!(endpoint = %self.endpoint, generation, "opening websocket");
        let weak = Rc::downgrade(self);
        let events = EventSink::new(generation, move |generation, event| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(generation, event);
            }
        });
        let socket = self.transport.open(&self.endpoint, events);
        let replaced = self.socket.borrow_mut().replace(socket);
        if let Some(mut replaced) = replaced {
            replaced.close();
        }
    }

    fn schedule_retry(self: &Rc<Self>, delay: Duration, attempt: u32) {
        debug!(endpoint = %self.endpoint, attempt, ?delay, "scheduling reconnect");
        let weak = Rc::downgrade(self);
        let handle = tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.retry_due();
            }
        });
        let stale = self.retry.borrow_mut().replace(handle);
        if let Some(stale) = stale {
            stale.abort();
        }
    }

    fn retry_due(self: &Rc<Self>) {
        // This timer has fired; forget its handle.
        drop(self.retry.borrow_mut().take());
        let command = self.machine.borrow_mut().retry_due();
        if let Some(command) = command {
            info!(
                endpoint = %self.endpoint,
                attempt = self.machine.borrow().reconnect_attempts(),
                "reconnecting websocket"
            );
            self.execute([command]);
        }
    }

    // =========================================================================
    // TRANSPORT EVENTS
    // =========================================================================

    fn handle_event(self: &Rc<Self>, generation: Generation, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.machine.borrow_mut().opened(generation) {
                    info!(endpoint = %self.endpoint, "websocket connected");
                }
            }
            TransportEvent::Message(text) => {
                if self.machine.borrow().is_current(generation) {
                    self.dispatch(&text);
                }
            }
            TransportEvent::Error(detail) => {
                let report = self.machine.borrow().failed(generation);
                if report {
                    warn!(endpoint = %self.endpoint, %detail, "websocket error");
                    self.report(ConnectionError::Transport { detail });
                }
            }
            TransportEvent::Closed => self.handle_closed(generation),
        }
    }

    fn handle_closed(self: &Rc<Self>, generation: Generation) {
        if !self.machine.borrow().is_current(generation) {
            return;
        }
        drop(self.socket.borrow_mut().take());
        info!(endpoint = %self.endpoint, "websocket disconnected");

        let command = self.machine.borrow_mut().closed(generation);
        match command {
            Some(command) => self.execute([command]),
            None => {
                let machine = self.machine.borrow();
                if !machine.is_intentional() {
                    warn!(
                        endpoint = %self.endpoint,
                        attempts = machine.reconnect_attempts(),
                        "reconnect attempts exhausted; staying closed"
                    );
                }
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match frames::decode_inbound(text) {
            Ok(InboundFrame::Step(step)) => {
                let handler = self.handlers.step.borrow().clone();
                match handler {
                    Some(handler) => handler(step),
                    None => debug!(step = step.step_index, "no step handler; frame dropped"),
                }
            }
            Ok(InboundFrame::Chat(update)) => {
                let handler = self.handlers.message.borrow().clone();
                match handler {
                    Some(handler) => handler(update),
                    None => debug!("no message handler; frame dropped"),
                }
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "failed to parse websocket message");
                self.report(ConnectionError::from(e));
            }
        }
    }

    fn report(&self, error: ConnectionError) {
        let handler = self.handlers.error.borrow().clone();
        match handler {
            Some(handler) => handler(error),
            None => debug!(kind = error.kind(), "no error handler; failure dropped"),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(handle) = self.retry.get_mut().take() {
            handle.abort();
        }
        if let Some(mut socket) = self.socket.get_mut().take() {
            socket.close();
        }
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
