//! # EM7345 GPS Core Library
//!
//! Drives the GPS receiver of an EM7345 LTE modem over its AT command port:
//! - Subscribes to position reports and tracks the modem's command id
//! - Converts report coordinates into NMEA degrees/minutes form
//! - Supervises the modem with a data watchdog
//! - Performs the stop handshake on shutdown
//!
//! ## Example
//!
//! ```rust,no_run
//! use em7345_core::{ModemEvent, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut session = Session::new(SessionConfig::new("/dev/ttyACM0"));
//!     let mut rx = session.subscribe();
//!     session.start();
//!
//!     while let Ok(event) = rx.recv().await {
//!         match event {
//!             ModemEvent::Fix(fix) => println!("{fix}"),
//!             ModemEvent::Finished => break,
//!             _ => {}
//!         }
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;

// Re-exports for convenience
pub use crate::cli::{CliResult, ExitCodes, OutputFormat};
pub use crate::config::{AppConfig, ConfigError, LoggingConfig, ModemConfig};
pub use crate::core::error::ErrorKind;
pub use crate::core::event::{Message, MessageId, ModemEvent, Severity};
pub use crate::core::logger::{FixLogger, LogFormat};
pub use crate::core::protocol::{Coordinate, Hemisphere, ParsedFix, ProtocolError};
pub use crate::core::session::{Session, SessionConfig};
pub use crate::core::state_machine::{Effect, ModemSession, SessionState};
pub use crate::core::transport::{SerialConfig, TransportError};
pub use crate::core::watchdog::Watchdog;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
