//! CLI Exit Codes
//!
//! Standard exit codes for CLI operations and automation.

use crate::config::ConfigError;
use crate::core::event::{Message, MessageId};
use crate::core::transport::TransportError;
use std::process::ExitCode;

/// Exit code constants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCodes;

impl ExitCodes {
    /// Success
    pub const SUCCESS: u8 = 0;

    /// General error
    pub const ERROR: u8 = 1;

    /// Invalid arguments
    pub const INVALID_ARGS: u8 = 2;

    /// Serial port not found
    pub const PORT_NOT_FOUND: u8 = 3;

    /// Permission denied
    pub const PERMISSION_DENIED: u8 = 4;

    /// Configuration error
    pub const CONFIG_ERROR: u8 = 5;

    /// Stop handshake timed out
    pub const TIMEOUT: u8 = 6;
}

/// Every defined code, in table order
const ALL_CODES: [u8; 7] = [
    ExitCodes::SUCCESS,
    ExitCodes::ERROR,
    ExitCodes::INVALID_ARGS,
    ExitCodes::PORT_NOT_FOUND,
    ExitCodes::PERMISSION_DENIED,
    ExitCodes::CONFIG_ERROR,
    ExitCodes::TIMEOUT,
];

/// CLI operation result
#[derive(Debug)]
pub enum CliResult {
    /// Success with optional message
    Success(Option<String>),

    /// Error with code and message
    Error(u8, String),
}

impl CliResult {
    /// Plain success
    pub fn success() -> Self {
        Self::Success(None)
    }

    /// Success with a message for the user
    pub fn success_with_message(msg: impl Into<String>) -> Self {
        Self::Success(Some(msg.into()))
    }

    /// Failure with an explicit code
    pub fn error(code: u8, msg: impl Into<String>) -> Self {
        Self::Error(code, msg.into())
    }

    /// Invalid command line input
    pub fn invalid_args(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::INVALID_ARGS, msg.into())
    }

    /// Stop handshake did not complete in time
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Error(ExitCodes::TIMEOUT, msg.into())
    }

    /// Get exit code
    pub fn code(&self) -> u8 {
        match self {
            Self::Success(_) => ExitCodes::SUCCESS,
            Self::Error(code, _) => *code,
        }
    }

    /// Get message
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success(Some(msg)) | Self::Error(_, msg) => Some(msg),
            Self::Success(None) => None,
        }
    }

    /// Convert to `ExitCode`
    pub fn to_exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }

    /// Is success?
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&TransportError> for CliResult {
    fn from(err: &TransportError) -> Self {
        let code = match err {
            TransportError::PortNotFound(_) => ExitCodes::PORT_NOT_FOUND,
            TransportError::PermissionDenied(_) => ExitCodes::PERMISSION_DENIED,
            TransportError::BaudRateRejected { .. } => ExitCodes::CONFIG_ERROR,
            _ => ExitCodes::ERROR,
        };
        Self::Error(code, err.to_string())
    }
}

impl From<&ConfigError> for CliResult {
    fn from(err: &ConfigError) -> Self {
        Self::Error(ExitCodes::CONFIG_ERROR, err.to_string())
    }
}

impl From<&Message> for CliResult {
    /// Map the critical message that ended a session to an exit code
    fn from(message: &Message) -> Self {
        let code = if message.id == MessageId::PORT_NOT_FOUND {
            ExitCodes::PORT_NOT_FOUND
        } else if message.id == MessageId::PERMISSION_DENIED {
            ExitCodes::PERMISSION_DENIED
        } else if message.id == MessageId::BAUD_RATE_REJECTED {
            ExitCodes::CONFIG_ERROR
        } else {
            ExitCodes::ERROR
        };
        Self::Error(code, message.text.clone())
    }
}

/// Exit code description
pub fn exit_code_description(code: u8) -> &'static str {
    match code {
        ExitCodes::SUCCESS => "Success",
        ExitCodes::ERROR => "General error",
        ExitCodes::INVALID_ARGS => "Invalid arguments",
        ExitCodes::PORT_NOT_FOUND => "Port not found",
        ExitCodes::PERMISSION_DENIED => "Permission denied",
        ExitCodes::CONFIG_ERROR => "Configuration error",
        ExitCodes::TIMEOUT => "Stop handshake timed out",
        _ => "Unknown error",
    }
}

/// Print exit code table
pub fn print_exit_codes() {
    println!("Exit Codes:");
    for code in ALL_CODES {
        println!("  {:>3}  {}", code, exit_code_description(code));
    }
}
