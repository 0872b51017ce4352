//! Connection state machine, free of I/O.
//!
//! DESIGN
//! ======
//! `Machine` holds every piece of mutable connection bookkeeping: lifecycle
//! state, the consecutive reconnect counter, the intentional-close flag and
//! whether a retry timer is armed. Inputs are method calls; outputs are
//! [`Command`]s the driver in `connection.rs` executes against the real
//! transport and timer.
//!
//! Each socket the machine asks for is tagged with a generation. Transport
//! events carry the generation of the socket that produced them, so late
//! events from a socket that was already discarded (closed by `disconnect`,
//! or replaced) cannot disturb the current one.
//!
//! TRANSITIONS
//! ===========
//! - `connect`      Idle/Closed -> Connecting (no-op while Connecting/Open)
//! - `opened`       Connecting  -> Open, reconnect counter reset, intentional cleared
//! - `closed`       Connecting/Open -> Closed, retry armed while under budget
//! - `retry_due`    Closed -> Connecting when the armed retry is still wanted
//! - `disconnect`   any -> Closed, intentional, retry disarmed

use std::time::Duration;

use crate::config::ReconnectPolicy;

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never connected; no socket.
    #[default]
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Ready to send and receive.
    Open,
    /// Socket gone, either retrying later or stopped.
    Closed,
}

/// Identifies one socket allocation.
pub type Generation = u64;

/// Work the driver must perform after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Open a new socket tagged with `generation`.
    Open { generation: Generation },
    /// Close and drop the active socket.
    Close,
    /// Arm the retry timer.
    ScheduleRetry { delay: Duration, attempt: u32 },
    /// Abort the armed retry timer.
    CancelRetry,
}

#[derive(Debug)]
pub struct Machine {
    policy: ReconnectPolicy,
    state: ConnectionState,
    generation: Generation,
    reconnect_attempts: u32,
    intentional: bool,
    retry_armed: bool,
}

impl Machine {
    #[must_use]
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Idle,
            generation: 0,
            reconnect_attempts: 0,
            intentional: false,
            retry_armed: false,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    #[must_use]
    pub fn is_intentional(&self) -> bool {
        self.intentional
    }

    #[must_use]
    pub fn retry_armed(&self) -> bool {
        self.retry_armed
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Caller-initiated connect.
    ///
    /// Disarms any pending retry since a fresh socket is requested now. The
    /// intentional flag survives until the handshake succeeds, so a failed
    /// connect after `disconnect` is not retried.
    pub fn connect(&mut self) -> Vec<Command> {
        if !self.can_open() {
            return Vec::new();
        }
        let mut commands = Vec::with_capacity(2);
        if self.retry_armed {
            self.retry_armed = false;
            commands.push(Command::CancelRetry);
        }
        commands.push(self.begin_open());
        commands
    }

    /// The armed retry timer fired.
    pub fn retry_due(&mut self) -> Option<Command> {
        if !self.retry_armed {
            return None;
        }
        self.retry_armed = false;
        if self.intentional || !self.can_open() {
            return None;
        }
        Some(self.begin_open())
    }

    /// The socket of `generation` finished its handshake.
    ///
    /// Returns `false` when the event came from a retired socket.
    pub fn opened(&mut self, generation: Generation) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.state = ConnectionState::Open;
        self.reconnect_attempts = 0;
        self.intentional = false;
        true
    }

    /// The socket of `generation` reported a failure.
    ///
    /// State is left alone; a close signal follows. Returns whether the
    /// failure should be reported.
    #[must_use]
    pub fn failed(&self, generation: Generation) -> bool {
        self.is_current(generation)
    }

    /// The socket of `generation` closed.
    pub fn closed(&mut self, generation: Generation) -> Option<Command> {
        if !self.is_current(generation) {
            return None;
        }
        self.state = ConnectionState::Closed;
        if self.intentional || self.reconnect_attempts >= self.policy.max_attempts {
            return None;
        }
        self.reconnect_attempts += 1;
        self.retry_armed = true;
        Some(Command::ScheduleRetry {
            delay: self.policy.delay,
            attempt: self.reconnect_attempts,
        })
    }

    /// Caller-initiated close. No automatic retry follows.
    pub fn disconnect(&mut self) -> Vec<Command> {
        self.intentional = true;
        let mut commands = Vec::with_capacity(2);
        if self.retry_armed {
            self.retry_armed = false;
            commands.push(Command::CancelRetry);
        }
        if matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            commands.push(Command::Close);
        }
        self.state = ConnectionState::Closed;
        // Retire the socket's generation so its late events are ignored.
        self.generation += 1;
        commands
    }

    /// True when `generation` names the socket the machine is waiting on.
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        generation == self.generation
            && matches!(self.state, ConnectionState::Connecting | ConnectionState::Open)
    }

    fn can_open(&self) -> bool {
        matches!(self.state, ConnectionState::Idle | ConnectionState::Closed)
    }

    fn begin_open(&mut self) -> Command {
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        Command::Open { generation: self.generation }
    }
}

#[cfg(test)]
#[path = "machine_test.rs"]
mod tests;
