//! Events pushed from a modem session to its controller
//!
//! The controller receives three kinds of events: severity-tagged messages,
//! resolved position fixes and the final `Finished` notice after the stop
//! handshake. Lifecycle changes are published as well.

use super::protocol::nmea::ParsedFix;
use super::state_machine::SessionState;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::{uuid, Uuid};

/// Message severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Traffic and protocol detail
    Debug,
    /// Lifecycle information
    Info,
    /// Unexpected but harmless input
    Warning,
    /// Recoverable failure, the session continues
    Error,
    /// Fatal failure, the session is over
    Critical,
}

impl Severity {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stable tag identifying the site a message was raised from.
///
/// Controllers use it for deduplication and translation lookup. The values
/// carry no meaning beyond being unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Port in use
    pub const USING_PORT: Self = Self(uuid!("5b0f2c6e-8d1a-4f37-9c2e-1a7d3e9b4c01"));
    /// Baud rate rejected by the port
    pub const BAUD_RATE_REJECTED: Self = Self(uuid!("c3e81f40-27b9-4a65-8f0d-6e2a91b7d502"));
    /// Serial port could not be opened
    pub const PORT_OPEN_FAILED: Self = Self(uuid!("9a4d7b12-e5c3-4d08-b1f6-3c8e20a5f703"));
    /// Serial port does not exist
    pub const PORT_NOT_FOUND: Self = Self(uuid!("b62f0d19-7a4e-4c35-8e91-3f5a2c8d6b18"));
    /// Access to the serial port was denied
    pub const PERMISSION_DENIED: Self = Self(uuid!("4c7e2a90-b3d5-4f18-9e6a-0d2b7c5f1e17"));
    /// Write to the transport failed
    pub const WRITE_FAILED: Self = Self(uuid!("2f6c9e83-4a1d-4b7e-a35c-d0b8e6f19204"));
    /// Transport closed or failed while reading
    pub const TRANSPORT_LOST: Self = Self(uuid!("e7b25a9c-1f4e-4c63-8d2a-5b9f07c3e605"));
    /// Raw line received
    pub const DATA_RECEIVED: Self = Self(uuid!("41d8f3a7-6c2b-4e9f-b05d-8a1e7c4d2906"));
    /// Line with an unknown prefix
    pub const UNEXPECTED_DATA: Self = Self(uuid!("b83e0c5d-9a7f-4216-8e4b-2d6f1a9c3707"));
    /// No command id in the first response
    pub const NO_COMMAND_ID: Self = Self(uuid!("0d5a1e8f-3b6c-4f92-a7e1-c49b8d2f6a08"));
    /// Command id obtained
    pub const COMMAND_ID: Self = Self(uuid!("6f2b8d4e-c1a9-4735-9b0e-7e3c5a1d8f09"));
    /// Stop command issued
    pub const STOPPING: Self = Self(uuid!("a19c5f3b-7e2d-4c81-86fa-0b4d9e2c7a10"));
    /// Stop confirmed by the modem
    pub const STOPPED: Self = Self(uuid!("d4f07b2a-5c8e-4a19-b36d-9e1a2c7f5b11"));
    /// Modem reported an error
    pub const MODEM_ERROR: Self = Self(uuid!("38a6e1d9-0b4f-4e72-9c5a-f2d7b8e1c312"));
    /// Position report could not be used
    pub const REPORT_DROPPED: Self = Self(uuid!("f5c2a8e7-4d1b-4f06-a9e3-1b6c0d7e4a13"));
    /// Watchdog expired without traffic
    pub const NO_DATA: Self = Self(uuid!("1e4b7d0a-8f3c-4a2e-b59d-6c2f8a0e3d15"));
    /// Line ignored in the current state
    pub const IGNORED: Self = Self(uuid!("8b0d6f2c-3e9a-4b17-a4c8-5f1e7d3b9a16"));
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// A severity-tagged message for the controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Site tag
    pub id: MessageId,
    /// Human readable text
    pub text: String,
    /// Severity
    pub severity: Severity,
}

impl Message {
    /// Create a new message
    pub fn new(id: MessageId, severity: Severity, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            severity,
        }
    }

    /// Mirror the message into the tracing log at the matching level
    pub fn trace(&self) {
        match self.severity {
            Severity::Debug => tracing::debug!(id = %self.id, "{}", self.text),
            Severity::Info => tracing::info!(id = %self.id, "{}", self.text),
            Severity::Warning => tracing::warn!(id = %self.id, "{}", self.text),
            Severity::Error | Severity::Critical => {
                tracing::error!(id = %self.id, severity = %self.severity, "{}", self.text);
            }
        }
    }
}

/// Events delivered to the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModemEvent {
    /// Diagnostic or failure message
    Message(Message),
    /// A resolved position
    Fix(ParsedFix),
    /// The modem confirmed the stop, or there was nothing to stop
    Finished,
    /// Lifecycle state changed
    StateChanged {
        /// New state
        state: SessionState,
    },
}

impl ModemEvent {
    /// Get the message, if this is a message event
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(m) => Some(m),
            _ => None,
        }
    }

    /// Get the fix, if this is a fix event
    pub fn as_fix(&self) -> Option<&ParsedFix> {
        match self {
            Self::Fix(fix) => Some(fix),
            _ => None,
        }
    }
}
