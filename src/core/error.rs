//! Failure taxonomy
//!
//! Every failure reaches the controller as a message; the kind decides its
//! severity and whether the session survives.

use super::event::Severity;
use std::fmt;

/// Failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Port cannot be opened or configured. Ends the session.
    Configuration,
    /// Unexpected or malformed modem output. The line is dropped.
    Protocol,
    /// No traffic within the watchdog deadline
    WatchdogTimeout,
    /// Coordinate field could not be converted. The report is dropped.
    MalformedCoordinate,
}

impl ErrorKind {
    /// Severity used when reporting this kind of failure
    pub fn severity(&self) -> Severity {
        match self {
            Self::Configuration => Severity::Critical,
            Self::Protocol | Self::WatchdogTimeout | Self::MalformedCoordinate => Severity::Error,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "configuration error"),
            Self::Protocol => write!(f, "protocol error"),
            Self::WatchdogTimeout => write!(f, "watchdog timeout"),
            Self::MalformedCoordinate => write!(f, "malformed coordinate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_is_critical() {
        assert_eq!(ErrorKind::Configuration.severity(), Severity::Critical);

        for kind in [
            ErrorKind::Protocol,
            ErrorKind::WatchdogTimeout,
            ErrorKind::MalformedCoordinate,
        ] {
            assert_eq!(kind.severity(), Severity::Error);
        }
    }
}
