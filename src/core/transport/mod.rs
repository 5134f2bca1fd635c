//! Transport layer for the modem connection
//!
//! Provides:
//! - Serial port configuration and opening (tokio-serial)
//! - Line framing of modem output with whitespace normalization

mod line;
mod serial;

pub use line::ModemLineCodec;
pub use serial::{list_ports, open, SerialConfig, SerialFlowControl, SerialParity, DEFAULT_BAUD_RATE};

use super::event::MessageId;
use thiserror::Error;

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The port refused the baud rate
    #[error("Baud rate {baud_rate} rejected: {reason}")]
    BaudRateRejected {
        /// Requested baud rate
        baud_rate: u32,
        /// Reason given by the driver
        reason: String,
    },

    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Disconnected
    #[error("Disconnected")]
    Disconnected,

    /// Send error
    #[error("Send error: {0}")]
    SendError(String),
}

impl TransportError {
    /// Message site used when reporting this error to the controller
    pub fn message_id(&self) -> MessageId {
        match self {
            Self::BaudRateRejected { .. } => MessageId::BAUD_RATE_REJECTED,
            Self::PortNotFound(_) => MessageId::PORT_NOT_FOUND,
            Self::ConnectionFailed(_) => MessageId::PORT_OPEN_FAILED,
            Self::PermissionDenied(_) => MessageId::PERMISSION_DENIED,
            Self::SendError(_) => MessageId::WRITE_FAILED,
            Self::IoError(_) | Self::Disconnected => MessageId::TRANSPORT_LOST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids() {
        assert_eq!(
            TransportError::PortNotFound("/dev/ttyACM9".into()).message_id(),
            MessageId::PORT_NOT_FOUND
        );
        assert_eq!(
            TransportError::ConnectionFailed("busy".into()).message_id(),
            MessageId::PORT_OPEN_FAILED
        );
        assert_eq!(
            TransportError::PermissionDenied("/dev/ttyACM0".into()).message_id(),
            MessageId::PERMISSION_DENIED
        );
        assert_eq!(
            TransportError::SendError("broken pipe".into()).message_id(),
            MessageId::WRITE_FAILED
        );
        assert_eq!(TransportError::Disconnected.message_id(), MessageId::TRANSPORT_LOST);
    }
}
