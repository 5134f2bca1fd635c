//! NMEA-style coordinates and fixes
//!
//! Converts the coordinate fields of the modem's position report into
//! degrees, whole minutes and a minute fraction, the representation NMEA
//! 0183 sentences use (`ddmm.mmmm` / `dddmm.mmmm`).
//!
//! Two field layouts are accepted:
//! - `49.262746 N`: decimal degrees, a separator byte, then the hemisphere
//!   letter. This is what the modem emits.
//! - `4915.7833N`: already packed as `(d)ddmm.mmmm` with the hemisphere
//!   letter attached directly to the last digit.

use super::ProtocolError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest latitude, in degrees
pub const MAX_LATITUDE: u16 = 90;

/// Largest longitude, in degrees
pub const MAX_LONGITUDE: u16 = 180;

/// Hemisphere of a coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Hemisphere {
    /// North
    #[serde(rename = "N")]
    North,
    /// South
    #[serde(rename = "S")]
    South,
    /// East
    #[serde(rename = "E")]
    East,
    /// West
    #[serde(rename = "W")]
    West,
}

impl Hemisphere {
    /// Parse from the NMEA letter
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'N' => Some(Self::North),
            'S' => Some(Self::South),
            'E' => Some(Self::East),
            'W' => Some(Self::West),
            _ => None,
        }
    }

    /// Get the NMEA letter
    pub fn as_char(&self) -> char {
        match self {
            Self::North => 'N',
            Self::South => 'S',
            Self::East => 'E',
            Self::West => 'W',
        }
    }

    /// Whether this hemisphere qualifies a latitude
    pub fn is_latitude(&self) -> bool {
        matches!(self, Self::North | Self::South)
    }

    /// Sign applied to decimal degrees
    pub fn sign(&self) -> f64 {
        match self {
            Self::South | Self::West => -1.0,
            Self::North | Self::East => 1.0,
        }
    }
}

/// Geographic coordinate as degrees, minutes and minute fraction
///
/// `minutes` is always below 60 and `fraction` lies in `[0, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Whole degrees
    pub degrees: u16,
    /// Whole minutes
    pub minutes: u8,
    /// Fraction of the next minute
    pub fraction: f64,
    /// Hemisphere
    pub hemisphere: Hemisphere,
}

impl Coordinate {
    /// Parse a raw coordinate field of the position report
    pub fn parse(field: &str) -> Result<Self, ProtocolError> {
        let field = field.trim();
        let malformed = || ProtocolError::MalformedCoordinate(field.to_string());

        let mut chars = field.chars();
        let hemisphere = chars
            .next_back()
            .and_then(Hemisphere::from_char)
            .ok_or_else(malformed)?;
        let body = chars.as_str();

        let packed = match body.chars().last() {
            Some(c) => c.is_ascii_digit() || c == '.',
            None => return Err(malformed()),
        };

        let value = if packed {
            body
        } else {
            // Drop the separator between the number and the hemisphere letter
            let mut chars = body.chars();
            chars.next_back();
            chars.as_str()
        };

        let value: f64 = value.trim().parse().map_err(|_| malformed())?;
        if !value.is_finite() || value < 0.0 {
            return Err(malformed());
        }

        if packed {
            Self::from_packed(value, hemisphere).ok_or_else(malformed)
        } else {
            Self::from_decimal_degrees(value, hemisphere).ok_or_else(malformed)
        }
    }

    /// Parse a latitude field (hemisphere N or S, at most 90 degrees)
    pub fn parse_latitude(field: &str) -> Result<Self, ProtocolError> {
        Self::parse_axis(field, true)
    }

    /// Parse a longitude field (hemisphere E or W, at most 180 degrees)
    pub fn parse_longitude(field: &str) -> Result<Self, ProtocolError> {
        Self::parse_axis(field, false)
    }

    fn parse_axis(field: &str, latitude: bool) -> Result<Self, ProtocolError> {
        let coord = Self::parse(field)?;
        let max = if latitude { MAX_LATITUDE } else { MAX_LONGITUDE };
        // Compare the whole angle, so 90°30' is out of range as well
        if coord.hemisphere.is_latitude() != latitude || coord.magnitude() > f64::from(max) {
            return Err(ProtocolError::MalformedCoordinate(field.trim().to_string()));
        }
        Ok(coord)
    }

    /// Split non-negative decimal degrees into degrees, minutes and fraction
    pub fn from_decimal_degrees(value: f64, hemisphere: Hemisphere) -> Option<Self> {
        if !value.is_finite() || value < 0.0 || value > f64::from(MAX_LONGITUDE) {
            return None;
        }

        let mut degrees = value.floor();
        let mut remainder = (value - degrees) * 60.0;
        if remainder >= 60.0 {
            degrees += 1.0;
            remainder = 0.0;
        }
        let minutes = remainder.floor();

        Some(Self {
            degrees: degrees as u16,
            minutes: minutes as u8,
            fraction: remainder - minutes,
            hemisphere,
        })
    }

    /// Split a packed `(d)ddmm.mmmm` value
    pub fn from_packed(value: f64, hemisphere: Hemisphere) -> Option<Self> {
        if !value.is_finite() || value < 0.0 {
            return None;
        }

        let degrees = (value / 100.0).floor();
        let total_minutes = value - degrees * 100.0;
        if degrees > f64::from(MAX_LONGITUDE) || total_minutes >= 60.0 {
            return None;
        }
        let minutes = total_minutes.floor();

        Some(Self {
            degrees: degrees as u16,
            minutes: minutes as u8,
            fraction: total_minutes - minutes,
            hemisphere,
        })
    }

    /// Unsigned angle in decimal degrees
    pub fn magnitude(&self) -> f64 {
        f64::from(self.degrees) + (f64::from(self.minutes) + self.fraction) / 60.0
    }

    /// Signed decimal degrees (south and west negative)
    pub fn to_decimal(&self) -> f64 {
        self.magnitude() * self.hemisphere.sign()
    }

    /// Degrees and minutes in ten-thousandths, with rounding carried into degrees
    fn scaled_minutes(&self) -> (u16, u32) {
        let scaled = ((f64::from(self.minutes) + self.fraction) * 10_000.0).round() as u32;
        if scaled >= 600_000 {
            (self.degrees + 1, scaled - 600_000)
        } else {
            (self.degrees, scaled)
        }
    }

    /// Format as the two NMEA fields `ddmm.mmmm,H` (three degree digits for longitude)
    pub fn to_nmea(&self) -> String {
        let (degrees, scaled) = self.scaled_minutes();
        let width = if self.hemisphere.is_latitude() { 2 } else { 3 };
        format!(
            "{:0width$}{:02}.{:04},{}",
            degrees,
            scaled / 10_000,
            scaled % 10_000,
            self.hemisphere.as_char(),
            width = width
        )
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (degrees, scaled) = self.scaled_minutes();
        write!(
            f,
            "{}°{:02}.{:04}'{}",
            degrees,
            scaled / 10_000,
            scaled % 10_000,
            self.hemisphere.as_char()
        )
    }
}

/// A resolved position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedFix {
    /// Latitude
    pub latitude: Coordinate,
    /// Longitude
    pub longitude: Coordinate,
    /// Time of the fix
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for ParsedFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
            self.latitude,
            self.longitude
        )
    }
}

/// Parse the report's date and time fields into a UTC timestamp.
///
/// Dates are `yyyy/MM/dd` or `yyyyMMdd`, times `hh:mm:ss` or `hhmmss`.
pub fn parse_timestamp(date: &str, time: &str) -> Result<DateTime<Utc>, ProtocolError> {
    let malformed = || ProtocolError::MalformedTimestamp {
        date: date.to_string(),
        time: time.to_string(),
    };

    let date = parse_date(date.trim()).ok_or_else(malformed)?;
    let time = parse_time(time.trim()).ok_or_else(malformed)?;

    Ok(NaiveDateTime::new(date, time).and_utc())
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    if s.contains('/') {
        return NaiveDate::parse_from_str(s, "%Y/%m/%d").ok();
    }
    if s.len() != 8 || !all_digits(s) {
        return None;
    }

    let year: i32 = s[0..4].parse().ok()?;
    let month: u32 = s[4..6].parse().ok()?;
    let day: u32 = s[6..8].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    if s.contains(':') {
        return NaiveTime::parse_from_str(s, "%H:%M:%S").ok();
    }
    if s.len() != 6 || !all_digits(s) {
        return None;
    }

    let hours: u32 = s[0..2].parse().ok()?;
    let minutes: u32 = s[2..4].parse().ok()?;
    let seconds: u32 = s[4..6].parse().ok()?;

    NaiveTime::from_hms_opt(hours, minutes, seconds)
}
