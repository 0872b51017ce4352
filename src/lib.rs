//! Real-time chat channel for the care dashboard.
//!
//! A [`Connection`] keeps one WebSocket open to the chat backend, reconnects
//! with a constant delay after unexpected drops, and hands inbound frames to
//! at most one handler per event class:
//!
//! - chat updates go to [`Connection::on_message`]
//! - step-progress notices go to [`Connection::on_step`]
//! - every failure goes to [`Connection::on_error`]
//!
//! The wire model lives in the `frames` crate and is re-exported here.

pub mod config;
pub mod connection;
pub mod error;
pub mod machine;
pub mod transport;

pub use config::{ConfigError, ConnectionConfig, ReconnectPolicy};
pub use connection::Connection;
pub use error::ConnectionError;
pub use frames::{ChatUpdate, CodecError, HistoryEntry, InboundFrame, OutboundFrame, StepProgress};
pub use machine::ConnectionState;
pub use transport::{EventSink, Socket, Transport, TransportEvent, WsTransport};
