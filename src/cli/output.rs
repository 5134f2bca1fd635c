//! Event rendering for stdout

use crate::core::event::ModemEvent;

/// Output format for printed events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Render one event as a single line
pub fn format_event(event: &ModemEvent, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => text_format(event),
        OutputFormat::Json => json_format(event),
    }
}

fn text_format(event: &ModemEvent) -> String {
    match event {
        ModemEvent::Message(m) => format!("[{:<8}] {}", m.severity.name(), m.text),
        ModemEvent::Fix(fix) => format!("fix {fix}"),
        ModemEvent::Finished => "finished".to_string(),
        ModemEvent::StateChanged { state } => format!("state {state}"),
    }
}

fn json_format(event: &ModemEvent) -> String {
    serde_json::to_string(event)
        .unwrap_or_else(|e| serde_json::json!({ "event": "error", "reason": e.to_string() }).to_string())
}
