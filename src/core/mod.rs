//! Core module containing the modem driver
//!
//! This module provides:
//! - Transport layer (serial port, line framing)
//! - Protocol parsing for the location service responses
//! - Coordinate conversion into NMEA representation
//! - The session state machine and its async driver
//! - The data watchdog
//! - Fix logging

pub mod error;
pub mod event;
pub mod logger;
pub mod protocol;
pub mod session;
pub mod state_machine;
pub mod transport;
pub mod watchdog;
