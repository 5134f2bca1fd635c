//! Modem protocol
//!
//! Provides parsers and helpers for the EM7345 AT command interface:
//! - Location service responses (`+XLCSLSR`, `+XLSRSTOP`)
//! - Conversion of report coordinates into NMEA representation

pub mod nmea;
pub mod xlcs;

pub use nmea::{parse_timestamp, Coordinate, Hemisphere, ParsedFix};
pub use xlcs::{parse_command_id, parse_line, simplify, stop_command, PositionReport, Response, START_COMMAND};

use super::error::ErrorKind;
use thiserror::Error;

/// Errors raised while interpreting modem output
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The first response did not carry a command id
    #[error("No command id in response: {0}")]
    MissingCommandId(String),

    /// The command id was not a valid number
    #[error("Invalid command id: {0:?}")]
    InvalidCommandId(String),

    /// Position report shorter than the fixed format
    #[error("Position report has {found} fields, expected at least {expected}")]
    TooFewFields {
        /// Fields found
        found: usize,
        /// Fields required
        expected: usize,
    },

    /// Coordinate field could not be converted
    #[error("Malformed coordinate: {0:?}")]
    MalformedCoordinate(String),

    /// Date or time field could not be parsed
    #[error("Malformed timestamp: {date:?} {time:?}")]
    MalformedTimestamp {
        /// Date field
        date: String,
        /// Time field
        time: String,
    },
}

impl ProtocolError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedCoordinate(_) => ErrorKind::MalformedCoordinate,
            _ => ErrorKind::Protocol,
        }
    }
}
