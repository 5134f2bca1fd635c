//! Modem session state machine
//!
//! Owns the lifecycle of one GPS subscription on the modem:
//!
//! ```text
//! Idle -> Starting -> IdAcquiring -> Streaming -> Stopping -> Stopped
//! ```
//!
//! The machine performs no I/O. Every operation returns the [`Effect`]s the
//! caller must carry out (commands for the modem, events for the
//! controller), so it can be driven by the async session loop or stepped
//! directly in tests.

use super::error::ErrorKind;
use super::event::{Message, MessageId, ModemEvent, Severity};
use super::protocol::xlcs::{self, Response, START_COMMAND};
use super::protocol::ProtocolError;
use super::session::SessionConfig;
use super::transport::TransportError;
use super::watchdog::Watchdog;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::time::Instant;

/// Prefix of every message text
const NAME: &str = "EM7345";

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Not started
    Idle,
    /// Port open, subscribe command issued
    Starting,
    /// Waiting for the modem to assign a command id
    IdAcquiring,
    /// Command id known, position reports expected
    Streaming,
    /// Stop command issued, waiting for confirmation
    Stopping,
    /// Finished, by handshake or fatal error
    Stopped,
}

impl SessionState {
    /// Check if state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Check if the session is between start and stop
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Self::Starting | Self::IdAcquiring | Self::Streaming | Self::Stopping
        )
    }

    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::IdAcquiring => "acquiring id",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Side effect requested by the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write a command to the modem
    Send(Bytes),
    /// Deliver an event to the controller
    Emit(ModemEvent),
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Previous state
    pub from: SessionState,
    /// New state
    pub to: SessionState,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Reason for transition
    pub reason: Option<String>,
}

/// Rejected state change
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Invalid transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    /// Current state
    pub from: SessionState,
    /// Requested state
    pub to: SessionState,
}

/// State machine for one modem session
#[derive(Debug)]
pub struct ModemSession {
    /// Serial port name, for messages
    port: String,
    /// Current state
    state: SessionState,
    /// Id the modem assigned to the subscription
    command_id: Option<u32>,
    /// Data watchdog
    watchdog: Watchdog,
    /// State history
    history: Vec<StateTransition>,
    /// Maximum history size
    max_history: usize,
}

impl ModemSession {
    /// Create a new state machine
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            port: config.port.clone(),
            state: SessionState::Idle,
            command_id: None,
            watchdog: Watchdog::new(config.watchdog_timeout),
            history: Vec::new(),
            max_history: 100,
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Get the command id, once acquired
    pub fn command_id(&self) -> Option<u32> {
        self.command_id
    }

    /// Get the watchdog
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Deadline the driver must wake up at, if the watchdog is armed
    pub fn watchdog_deadline(&self) -> Option<Instant> {
        self.watchdog.deadline()
    }

    /// Get state history
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Issue the subscribe command. Only valid from `Idle`.
    pub fn start(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.state != SessionState::Idle {
            tracing::debug!(state = %self.state, "start ignored");
            return fx;
        }

        self.message(
            &mut fx,
            MessageId::USING_PORT,
            Severity::Info,
            format!("{NAME} using port {}", self.port),
        );
        self.transition(&mut fx, SessionState::Starting, "start requested");
        fx.push(Effect::Send(Bytes::from_static(START_COMMAND)));
        fx
    }

    /// Cancel the subscription.
    ///
    /// With a command id held, the stop command is sent and the session waits
    /// for confirmation. Without one there is nothing to cancel and the session
    /// finishes immediately.
    pub fn stop(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        match self.state {
            SessionState::Idle | SessionState::Stopping | SessionState::Stopped => {
                tracing::debug!(state = %self.state, "stop ignored");
            }
            _ => {
                self.watchdog.disarm();
                match self.command_id {
                    Some(id) => {
                        fx.push(Effect::Send(xlcs::stop_command(id)));
                        self.message(
                            &mut fx,
                            MessageId::STOPPING,
                            Severity::Debug,
                            format!("{NAME} stopping GPS"),
                        );
                        self.transition(&mut fx, SessionState::Stopping, "stop requested");
                    }
                    None => {
                        self.transition(&mut fx, SessionState::Stopped, "stop without command id");
                        fx.push(Effect::Emit(ModemEvent::Finished));
                    }
                }
            }
        }
        fx
    }

    /// Feed one received line
    pub fn handle_incoming(&mut self, line: &str) -> Vec<Effect> {
        let mut fx = Vec::new();
        if !self.state.is_running() {
            tracing::debug!(state = %self.state, line, "data outside of a session ignored");
            return fx;
        }

        let line = xlcs::simplify(line);
        if line.is_empty() {
            return fx;
        }

        // Any traffic proves the modem is alive
        if self.state == SessionState::Streaming {
            self.watchdog.arm();
        }

        let parsed = xlcs::parse_line(&line, self.command_id.is_some());
        if matches!(parsed, Ok(Response::Noise)) {
            return fx;
        }

        self.message(
            &mut fx,
            MessageId::DATA_RECEIVED,
            Severity::Debug,
            format!("{NAME} data received: {line}"),
        );

        if self.state == SessionState::Starting && !matches!(parsed, Ok(Response::IdAcquired(_))) {
            self.transition(&mut fx, SessionState::IdAcquiring, "awaiting command id");
        }

        match parsed {
            Ok(Response::Noise) => {}
            Ok(Response::Unrecognized(text)) => self.message(
                &mut fx,
                MessageId::UNEXPECTED_DATA,
                Severity::Warning,
                format!("{NAME} unexpected data: {text}"),
            ),
            Ok(Response::IdAcquired(id)) => self.acquire_id(&mut fx, id),
            Ok(Response::StopConfirmed) => {
                self.command_id = None;
                self.watchdog.disarm();
                self.message(
                    &mut fx,
                    MessageId::STOPPED,
                    Severity::Debug,
                    format!("{NAME} GPS stopped"),
                );
                self.transition(&mut fx, SessionState::Stopped, "stop confirmed");
                fx.push(Effect::Emit(ModemEvent::Finished));
            }
            Ok(Response::ModemError(text)) => self.message(
                &mut fx,
                MessageId::MODEM_ERROR,
                Severity::Error,
                format!("{NAME} reports an error: {text}"),
            ),
            Ok(Response::PositionFields(_)) if self.state == SessionState::Stopping => self.message(
                &mut fx,
                MessageId::IGNORED,
                Severity::Debug,
                format!("{NAME} position report ignored while stopping"),
            ),
            Ok(Response::PositionFields(report)) => match report.to_fix() {
                Ok(fix) => fx.push(Effect::Emit(ModemEvent::Fix(fix))),
                Err(e) => self.drop_report(&mut fx, &e),
            },
            Err(e @ (ProtocolError::MissingCommandId(_) | ProtocolError::InvalidCommandId(_))) => {
                self.message(
                    &mut fx,
                    MessageId::NO_COMMAND_ID,
                    Severity::Critical,
                    format!("{NAME} could not obtain a command id: {e}"),
                );
            }
            Err(e) => self.drop_report(&mut fx, &e),
        }

        fx
    }

    /// The watchdog deadline passed without traffic
    pub fn on_watchdog_timeout(&mut self) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.watchdog.fire() {
            self.message(
                &mut fx,
                MessageId::NO_DATA,
                ErrorKind::WatchdogTimeout.severity(),
                format!("{NAME} no data received"),
            );
        }
        fx
    }

    /// Abort on a transport failure
    pub fn on_transport_error(&mut self, error: &TransportError) -> Vec<Effect> {
        self.on_fatal_error(error.message_id(), error)
    }

    /// Abort on a transport or configuration failure. No retry is attempted.
    pub fn on_fatal_error(&mut self, id: MessageId, text: impl fmt::Display) -> Vec<Effect> {
        let mut fx = Vec::new();
        if self.state.is_terminal() {
            return fx;
        }

        self.watchdog.disarm();
        self.command_id = None;
        self.message(
            &mut fx,
            id,
            ErrorKind::Configuration.severity(),
            format!("{NAME} {text}"),
        );
        self.transition(&mut fx, SessionState::Stopped, "fatal error");
        fx
    }

    fn acquire_id(&mut self, fx: &mut Vec<Effect>, id: u32) {
        self.command_id = Some(id);
        self.message(
            fx,
            MessageId::COMMAND_ID,
            Severity::Debug,
            format!("{NAME} command id: {id}"),
        );
        if self.state == SessionState::Starting {
            self.transition(fx, SessionState::IdAcquiring, "awaiting command id");
        }
        self.transition(fx, SessionState::Streaming, "command id acquired");
        self.watchdog.arm();
    }

    fn drop_report(&self, fx: &mut Vec<Effect>, error: &ProtocolError) {
        self.message(
            fx,
            MessageId::REPORT_DROPPED,
            error.kind().severity(),
            format!("{NAME} position report dropped: {error}"),
        );
    }

    fn message(&self, fx: &mut Vec<Effect>, id: MessageId, severity: Severity, text: String) {
        let message = Message::new(id, severity, text);
        message.trace();
        fx.push(Effect::Emit(ModemEvent::Message(message)));
    }

    fn transition(&mut self, fx: &mut Vec<Effect>, new_state: SessionState, reason: &str) {
        if new_state == self.state {
            return;
        }
        if let Err(e) = self.try_transition(new_state, reason) {
            tracing::error!("{e}");
            return;
        }
        fx.push(Effect::Emit(ModemEvent::StateChanged { state: new_state }));
    }

    fn try_transition(
        &mut self,
        new_state: SessionState,
        reason: &str,
    ) -> Result<(), InvalidTransition> {
        if !self.is_valid_transition(new_state) {
            return Err(InvalidTransition {
                from: self.state,
                to: new_state,
            });
        }

        tracing::info!(from = %self.state, to = %new_state, reason, "session state changed");

        self.history.push(StateTransition {
            from: self.state,
            to: new_state,
            timestamp: Utc::now(),
            reason: Some(reason.to_string()),
        });
        if self.history.len() > self.max_history {
            self.history.remove(0);
        }

        self.state = new_state;
        Ok(())
    }

    /// Check if transition is valid
    fn is_valid_transition(&self, new_state: SessionState) -> bool {
        use SessionState::*;

        match (self.state, new_state) {
            // From Idle
            (Idle, Starting) => true,

            // From Starting
            (Starting, IdAcquiring) => true,

            // From IdAcquiring
            (IdAcquiring, Streaming) => true,

            // From Streaming
            (Streaming, Stopping) => true,

            // Stop without command id, stop confirmation, fatal errors
            (Idle | Starting | IdAcquiring | Streaming | Stopping, Stopped) => true,

            _ => false,
        }
    }
}
