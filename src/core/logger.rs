//! Fix logging
//!
//! Appends every resolved position to a file in one of several formats.

use super::protocol::nmea::ParsedFix;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Log format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Plain text
    #[default]
    Text,
    /// CSV with header
    Csv,
    /// JSON lines
    #[serde(rename = "jsonl")]
    #[value(name = "jsonl")]
    JsonLines,
}

impl LogFormat {
    /// Get file extension for format
    pub fn extension(&self) -> &'static str {
        match self {
            LogFormat::Text => "txt",
            LogFormat::Csv => "csv",
            LogFormat::JsonLines => "jsonl",
        }
    }
}

const CSV_HEADER: &str = "logged_at,fix_time,latitude,longitude,lat_decimal,lon_decimal";

/// One logged fix
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry<'a> {
    /// When the fix was logged
    pub logged_at: DateTime<Local>,
    /// The fix
    #[serde(flatten)]
    pub fix: &'a ParsedFix,
}

impl<'a> LogEntry<'a> {
    /// Create new entry stamped now
    pub fn new(fix: &'a ParsedFix) -> Self {
        Self {
            logged_at: Local::now(),
            fix,
        }
    }

    /// Format as text
    pub fn to_text(&self) -> String {
        format!(
            "[{}] {}",
            self.logged_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.fix
        )
    }

    /// Format as CSV
    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{:.7},{:.7}",
            self.logged_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.fix.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
            self.fix.latitude.to_nmea().replace(',', ""),
            self.fix.longitude.to_nmea().replace(',', ""),
            self.fix.latitude.to_decimal(),
            self.fix.longitude.to_decimal(),
        )
    }

    /// Format as JSON line
    pub fn to_json(&self) -> io::Result<String> {
        serde_json::to_string(self).map_err(io::Error::from)
    }
}

/// Appends fixes to a file
pub struct FixLogger {
    file: BufWriter<File>,
    format: LogFormat,
    path: PathBuf,
    lines_logged: usize,
}

impl FixLogger {
    /// Open (or create) the log file for appending
    pub fn open(path: &Path, format: LogFormat) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let fresh = file.metadata()?.len() == 0;
        let mut file = BufWriter::new(file);

        if fresh && format == LogFormat::Csv {
            writeln!(file, "{CSV_HEADER}")?;
        }

        Ok(Self {
            file,
            format,
            path: path.to_path_buf(),
            lines_logged: 0,
        })
    }

    /// Get log path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of fixes logged
    pub fn lines_logged(&self) -> usize {
        self.lines_logged
    }

    /// Log one fix and flush it to disk
    pub fn log(&mut self, fix: &ParsedFix) -> io::Result<()> {
        let entry = LogEntry::new(fix);
        let line = match self.format {
            LogFormat::Text => entry.to_text(),
            LogFormat::Csv => entry.to_csv(),
            LogFormat::JsonLines => entry.to_json()?,
        };

        writeln!(self.file, "{line}")?;
        self.file.flush()?;
        self.lines_logged += 1;
        Ok(())
    }
}

/// Generate log filename with timestamp
pub fn generate_log_filename(prefix: &str, format: LogFormat) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    format!("{}_{}.{}", prefix, timestamp, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::protocol::nmea::Coordinate;
    use chrono::{TimeZone, Utc};

    fn sample_fix() -> ParsedFix {
        ParsedFix {
            latitude: Coordinate::parse_latitude("4915.7833N").unwrap(),
            longitude: Coordinate::parse_longitude("01134.3386E").unwrap(),
            timestamp: Utc.with_ymd_and_hms(2015, 4, 1, 12, 34, 56).unwrap(),
        }
    }

    #[test]
    fn test_csv_log_has_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixes.csv");

        let mut logger = FixLogger::open(&path, LogFormat::Csv).unwrap();
        logger.log(&sample_fix()).unwrap();
        drop(logger);

        let mut logger = FixLogger::open(&path, LogFormat::Csv).unwrap();
        logger.log(&sample_fix()).unwrap();
        assert_eq!(logger.lines_logged(), 1);
        drop(logger);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].contains(",2015-04-01T12:34:56Z,4915.7833N,01134.3386E,49.2630550,"));
    }

    #[test]
    fn test_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixes.jsonl");

        let mut logger = FixLogger::open(&path, LogFormat::JsonLines).unwrap();
        logger.log(&sample_fix()).unwrap();
        drop(logger);

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(value["latitude"]["degrees"], 49);
        assert_eq!(value["longitude"]["hemisphere"], "E");
        assert_eq!(value["timestamp"], "2015-04-01T12:34:56Z");
    }

    #[test]
    fn test_text_line() {
        let fix = sample_fix();
        let line = LogEntry::new(&fix).to_text();
        assert!(line.ends_with("2015-04-01T12:34:56Z 49°15.7833'N 11°34.3386'E"));
    }

    #[test]
    fn test_filename() {
        let name = generate_log_filename("fixes", LogFormat::JsonLines);
        assert!(name.starts_with("fixes_"));
        assert!(name.ends_with(".jsonl"));
    }
}
