//! EM7345 location service (`+XLCSLSR`) responses
//!
//! The modem answers the subscribe command with a request id, then streams
//! position reports of the fixed form
//!
//! ```text
//! +XLCSLSR: <status>,<lat>,<lon>,<alt>,...,<date>,<time>,<tail> <status-word>
//! ```
//!
//! and confirms `AT+XLSRSTOP` with `+XLSRSTOP: OK`.

use super::nmea::{parse_timestamp, Coordinate, ParsedFix};
use super::ProtocolError;
use bytes::Bytes;

/// Prefix of location service responses and position reports
pub const REPORT_PREFIX: &str = "+XLCSLSR:";
/// Prefix of stop responses
pub const STOP_PREFIX: &str = "+XLSRSTOP:";
/// Prefix of modem errors
pub const ERROR_PREFIX: &str = "ERROR";

const REQUEST_ID_MARKER: &str = "+XLCSLSR: request id";
const STOP_CONFIRMATION: &str = "+XLSRSTOP: OK";
const ERROR_MARKER: &str = "ERROR";
const OK_MARKER: &str = "OK";

/// Minimum number of fields in a position report
pub const MIN_REPORT_FIELDS: usize = 11;

/// Field indices of a position report
pub mod field {
    /// Modem status
    pub const STATUS: usize = 0;
    /// Latitude
    pub const LATITUDE: usize = 1;
    /// Longitude
    pub const LONGITUDE: usize = 2;
    /// Date
    pub const DATE: usize = 9;
    /// Time
    pub const TIME: usize = 10;
}

/// Subscribe to periodic position reports
pub const START_COMMAND: &[u8] = b"AT+XLCSLSR=1,1,,,,,1,,,,,\r";

/// Command that cancels the position subscription with the given id
pub fn stop_command(command_id: u32) -> Bytes {
    Bytes::from(format!("AT+XLSRSTOP=0,{command_id}\r"))
}

/// Classified modem response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Bare acknowledgement, ignored
    Noise,
    /// Unknown prefix
    Unrecognized(String),
    /// The subscribe request was assigned this id
    IdAcquired(u32),
    /// The modem stopped the subscription
    StopConfirmed,
    /// The modem reported an error
    ModemError(String),
    /// A position report, split into normalized fields
    PositionFields(PositionReport),
}

/// Collapse runs of whitespace (including line breaks) into single spaces and trim
pub fn simplify(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Classify one normalized line.
///
/// `id_held` tells whether the session already owns a command id; before
/// that, every known response must be the request id acknowledgement.
pub fn parse_line(line: &str, id_held: bool) -> Result<Response, ProtocolError> {
    // The modem sometimes repeats a bare acknowledgement
    if line.starts_with(OK_MARKER) {
        return Ok(Response::Noise);
    }

    if ![REPORT_PREFIX, ERROR_PREFIX, STOP_PREFIX]
        .iter()
        .any(|prefix| line.starts_with(prefix))
    {
        return Ok(Response::Unrecognized(line.to_string()));
    }

    if !id_held {
        return parse_command_id(line).map(Response::IdAcquired);
    }

    if line.contains(STOP_CONFIRMATION) {
        return Ok(Response::StopConfirmed);
    }

    if line.contains(ERROR_MARKER) {
        return Ok(Response::ModemError(line.to_string()));
    }

    PositionReport::parse(line).map(Response::PositionFields)
}

/// Extract the id from `+XLCSLSR: request id <id> [OK]`
pub fn parse_command_id(line: &str) -> Result<u32, ProtocolError> {
    let start = line
        .find(REQUEST_ID_MARKER)
        .ok_or_else(|| ProtocolError::MissingCommandId(line.to_string()))?;
    let rest = &line[start + REQUEST_ID_MARKER.len()..];

    let mut tokens = rest.split_whitespace();
    let id = tokens
        .next()
        .ok_or_else(|| ProtocolError::InvalidCommandId(rest.trim().to_string()))?;

    // Only a trailing acknowledgement may follow the id
    let trailing: Vec<&str> = tokens.collect();
    if !(trailing.is_empty() || trailing == [OK_MARKER]) {
        return Err(ProtocolError::InvalidCommandId(rest.trim().to_string()));
    }

    if !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ProtocolError::InvalidCommandId(id.to_string()));
    }
    id.parse()
        .map_err(|_| ProtocolError::InvalidCommandId(id.to_string()))
}

/// A position report split into its normalized fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionReport {
    fields: Vec<String>,
}

impl PositionReport {
    /// Split a report line into fields, stripping the response envelope
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut fields: Vec<String> = line.split(',').map(simplify).collect();

        if let Some(first) = fields.first_mut() {
            *first = strip_envelope(first).to_string();
        }
        if let Some(last) = fields.last_mut() {
            // Drop the status word appended after the final field
            *last = last.split(' ').next().unwrap_or_default().to_string();
        }

        if fields.len() < MIN_REPORT_FIELDS {
            return Err(ProtocolError::TooFewFields {
                found: fields.len(),
                expected: MIN_REPORT_FIELDS,
            });
        }

        Ok(Self { fields })
    }

    /// All fields
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Get one field
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Modem status field
    pub fn status(&self) -> &str {
        &self.fields[field::STATUS]
    }

    /// Convert into a fix
    pub fn to_fix(&self) -> Result<ParsedFix, ProtocolError> {
        Ok(ParsedFix {
            latitude: Coordinate::parse_latitude(&self.fields[field::LATITUDE])?,
            longitude: Coordinate::parse_longitude(&self.fields[field::LONGITUDE])?,
            timestamp: parse_timestamp(&self.fields[field::DATE], &self.fields[field::TIME])?,
        })
    }
}

fn strip_envelope(first: &str) -> &str {
    match first.strip_prefix(REPORT_PREFIX) {
        Some(rest) => rest.trim(),
        None => first.rsplit(' ').next().unwrap_or(first),
    }
}
