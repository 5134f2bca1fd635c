//! Serial port transport implementation

use super::TransportError;
use serde::{Deserialize, Serialize};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

/// Baud rate the modem's AT port runs at
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Serial port flow control type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialFlowControl {
    /// No flow control
    #[default]
    None,
    /// Hardware flow control (RTS/CTS)
    Hardware,
    /// Software flow control (XON/XOFF)
    Software,
}

/// Serial port parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Serial port configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Port name (e.g., /dev/ttyACM0, COM3)
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Flow control
    pub flow_control: SerialFlowControl,
}

impl SerialConfig {
    /// Create a new serial configuration with default settings (8N1, no flow control)
    pub fn new(port: &str, baud_rate: u32) -> Self {
        Self {
            port: port.to_string(),
            baud_rate,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: SerialFlowControl::None,
        }
    }

    /// Get connection info string
    pub fn connection_info(&self) -> String {
        format!(
            "{} @ {} baud ({}{}{})",
            self.port,
            self.baud_rate,
            self.data_bits,
            match self.parity {
                SerialParity::None => "N",
                SerialParity::Odd => "O",
                SerialParity::Even => "E",
            },
            self.stop_bits,
        )
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self::new("/dev/ttyACM0", DEFAULT_BAUD_RATE)
    }
}

/// Open the serial port for async I/O
pub fn open(config: &SerialConfig) -> Result<SerialStream, TransportError> {
    if config.baud_rate == 0 {
        return Err(TransportError::BaudRateRejected {
            baud_rate: config.baud_rate,
            reason: "baud rate must be positive".to_string(),
        });
    }

    let data_bits = match config.data_bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    };

    let stop_bits = match config.stop_bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    };

    let parity = match config.parity {
        SerialParity::Odd => Parity::Odd,
        SerialParity::Even => Parity::Even,
        SerialParity::None => Parity::None,
    };

    let flow_control = match config.flow_control {
        SerialFlowControl::Hardware => FlowControl::Hardware,
        SerialFlowControl::Software => FlowControl::Software,
        SerialFlowControl::None => FlowControl::None,
    };

    tracing::debug!(port = %config.connection_info(), "opening serial port");

    tokio_serial::new(&config.port, config.baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity)
        .flow_control(flow_control)
        .open_native_async()
        .map_err(|e| match e.kind() {
            tokio_serial::ErrorKind::NoDevice => TransportError::PortNotFound(config.port.clone()),
            tokio_serial::ErrorKind::InvalidInput => TransportError::BaudRateRejected {
                baud_rate: config.baud_rate,
                reason: e.to_string(),
            },
            tokio_serial::ErrorKind::Io(io_kind) => match io_kind {
                std::io::ErrorKind::NotFound => TransportError::PortNotFound(config.port.clone()),
                std::io::ErrorKind::PermissionDenied => {
                    TransportError::PermissionDenied(config.port.clone())
                }
                _ => TransportError::ConnectionFailed(e.to_string()),
            },
            _ => TransportError::ConnectionFailed(e.to_string()),
        })
}

/// List available serial ports
pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>, TransportError> {
    serialport::available_ports().map_err(|e| TransportError::IoError(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.connection_info(), "/dev/ttyACM0 @ 115200 baud (8N1)");
    }

    #[tokio::test]
    async fn test_zero_baud_rejected() {
        let config = SerialConfig::new("/dev/ttyACM0", 0);
        assert!(matches!(
            open(&config),
            Err(TransportError::BaudRateRejected { baud_rate: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_port() {
        let config = SerialConfig::new("/dev/em7345-does-not-exist", DEFAULT_BAUD_RATE);
        assert!(open(&config).is_err());
    }
}
