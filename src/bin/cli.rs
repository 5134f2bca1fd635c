//! EM7345 GPS CLI
//!
//! Headless front end: runs a session against the modem and prints the
//! positions and diagnostics it produces.

use anyhow::Context;
use clap::{Parser, Subcommand};
use em7345_core::cli::{format_event, print_exit_codes, CliResult, ExitCodes, OutputFormat};
use em7345_core::core::protocol::xlcs::{self, Response};
use em7345_core::core::transport;
use em7345_core::{
    AppConfig, Coordinate, FixLogger, LogFormat, Message, ModemEvent, Session,
    SessionState, Severity,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

/// Time allowed for the modem to confirm a stop
const STOP_GRACE: Duration = Duration::from_secs(5);

/// EM7345 GPS CLI
#[derive(Parser, Debug)]
#[command(
    name = "em7345-gps",
    version,
    about = "Position reports from an EM7345 LTE modem",
    long_about = None
)]
struct Cli {
    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit diagnostics as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stream positions from the modem
    Run {
        /// Serial port name (e.g., /dev/ttyACM0, COM3)
        #[arg(short, long, env = "EM7345_PORT")]
        port: Option<String>,

        /// Baud rate
        #[arg(short, long)]
        baud: Option<u32>,

        /// Seconds without data before an error is reported
        #[arg(short, long)]
        watchdog: Option<u64>,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Append fixes to this file, or to a new file in this directory
        #[arg(short, long)]
        log: Option<PathBuf>,

        /// Fix log format
        #[arg(long, value_enum)]
        log_format: Option<LogFormat>,

        /// Stop after this many seconds
        #[arg(short, long)]
        duration: Option<u64>,
    },

    /// List available serial ports
    ListPorts,

    /// Convert one coordinate field
    Convert {
        /// Field as sent by the modem (e.g. "49.262746 N", "4915.7833N")
        field: String,

        /// Parse as longitude
        #[arg(long)]
        longitude: bool,
    },

    /// Classify one line of modem output
    Parse {
        /// Line as received
        line: String,

        /// Parse as if a command id were already held
        #[arg(long)]
        id_held: bool,
    },

    /// Print the exit code table
    ExitCodes,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match dispatch(&cli).await {
        Ok(result) => result,
        Err(e) => CliResult::error(ExitCodes::ERROR, format!("{e:#}")),
    };

    match &result {
        CliResult::Success(Some(msg)) if !cli.quiet => eprintln!("{msg}"),
        CliResult::Error(_, msg) => eprintln!("error: {msg}"),
        _ => {}
    }
    result.to_exit_code()
}

async fn dispatch(cli: &Cli) -> anyhow::Result<CliResult> {
    match &cli.command {
        Commands::Run {
            port,
            baud,
            watchdog,
            config,
            log,
            log_format,
            duration,
        } => {
            let loaded = match config {
                Some(path) => AppConfig::load_from(path),
                None => AppConfig::load(),
            };
            let mut config = match loaded {
                Ok(config) => config,
                Err(e) => return Ok(CliResult::from(&e)),
            };

            if let Some(port) = port {
                config.modem.port.clone_from(port);
            }
            if let Some(baud) = baud {
                config.modem.baud_rate = *baud;
            }
            if let Some(secs) = watchdog {
                config.modem.watchdog_secs = *secs;
            }
            if let Some(path) = log {
                config.logging.fix_log = Some(path.clone());
            }
            if let Some(format) = log_format {
                config.logging.format = *format;
            }
            if let Err(e) = config.validate() {
                return Ok(CliResult::from(&e));
            }

            init_tracing(cli, &config.logging.level);
            run(cli, &config, duration.map(Duration::from_secs)).await
        }
        Commands::ListPorts => {
            init_tracing(cli, "info");
            list_ports(cli)
        }
        Commands::Convert { field, longitude } => {
            init_tracing(cli, "info");
            convert(cli, field, *longitude)
        }
        Commands::Parse { line, id_held } => {
            init_tracing(cli, "info");
            parse(cli, line, *id_held)
        }
        Commands::ExitCodes => {
            print_exit_codes();
            Ok(CliResult::success())
        }
    }
}

fn init_tracing(cli: &Cli, default_level: &str) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        default_level
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: &Cli, config: &AppConfig, duration: Option<Duration>) -> anyhow::Result<CliResult> {
    let mut fix_log = match config.logging.fix_log_path() {
        Some(path) => Some(
            FixLogger::open(&path, config.logging.format)
                .with_context(|| format!("cannot open fix log {}", path.display()))?,
        ),
        None => None,
    };

    let mut session = Session::new(config.modem.session());
    let mut events = session.subscribe();
    tracing::info!(session = %session.id(), "Starting em7345-gps v{}", em7345_core::VERSION);
    session.start();

    let run_deadline = duration.map(|d| Instant::now() + d);
    let mut stop_deadline: Option<Instant> = None;
    let mut fatal: Option<Message> = None;
    let mut fixes = 0usize;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!("dropped {n} events");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                print_event(cli, &event);
                match &event {
                    ModemEvent::Fix(fix) => {
                        fixes += 1;
                        if let Some(logger) = fix_log.as_mut() {
                            logger.log(fix).context("cannot write fix log")?;
                        }
                    }
                    ModemEvent::Message(m) if m.severity == Severity::Critical => {
                        fatal = Some(m.clone());
                    }
                    ModemEvent::Finished => {
                        session.wait().await;
                        return Ok(CliResult::success_with_message(format!(
                            "stopped after {fixes} fixes"
                        )));
                    }
                    ModemEvent::StateChanged { state: SessionState::Stopped } => {
                        // Finished, if any, is already queued behind this event
                        session.wait().await;
                        if drain_finished(cli, &mut events) {
                            return Ok(CliResult::success_with_message(format!(
                                "stopped after {fixes} fixes"
                            )));
                        }
                        return Ok(fatal_result(fatal.as_ref()));
                    }
                    _ => {}
                }
            }
            res = &mut ctrl_c, if stop_deadline.is_none() => {
                if let Err(e) = res {
                    tracing::warn!("cannot listen for Ctrl-C: {e}");
                }
                tracing::info!("interrupted, stopping");
                session.stop().await;
                stop_deadline = Some(Instant::now() + STOP_GRACE);
            }
            () = expiry(run_deadline), if stop_deadline.is_none() => {
                tracing::info!("duration elapsed, stopping");
                session.stop().await;
                stop_deadline = Some(Instant::now() + STOP_GRACE);
            }
            () = expiry(stop_deadline) => {
                return Ok(CliResult::timeout(format!(
                    "modem did not confirm the stop within {}s",
                    STOP_GRACE.as_secs()
                )));
            }
        }
    }

    Ok(CliResult::success())
}

/// Print remaining events and report whether the session finished cleanly
fn drain_finished(cli: &Cli, events: &mut tokio::sync::broadcast::Receiver<ModemEvent>) -> bool {
    let mut finished = false;
    while let Ok(event) = events.try_recv() {
        print_event(cli, &event);
        finished |= matches!(event, ModemEvent::Finished);
    }
    finished
}

fn fatal_result(message: Option<&Message>) -> CliResult {
    match message {
        Some(message) => CliResult::from(message),
        None => CliResult::error(ExitCodes::ERROR, "session ended unexpectedly"),
    }
}

fn print_event(cli: &Cli, event: &ModemEvent) {
    let visible = match event {
        ModemEvent::Message(m) => match m.severity {
            Severity::Debug => cli.verbose,
            Severity::Info | Severity::Warning => !cli.quiet,
            Severity::Error | Severity::Critical => true,
        },
        ModemEvent::StateChanged { .. } => cli.verbose,
        ModemEvent::Fix(_) | ModemEvent::Finished => true,
    };
    if visible {
        println!("{}", format_event(event, cli.format));
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn list_ports(cli: &Cli) -> anyhow::Result<CliResult> {
    let ports = match transport::list_ports() {
        Ok(ports) => ports,
        Err(e) => return Ok(CliResult::from(&e)),
    };

    if ports.is_empty() {
        if !cli.quiet {
            println!("No serial ports found.");
        }
        return Ok(CliResult::success());
    }

    match cli.format {
        OutputFormat::Json => {
            let json: Vec<serde_json::Value> = ports
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.port_name,
                        "type": format!("{:?}", p.port_type)
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        OutputFormat::Text => {
            for port in &ports {
                println!("{} [{:?}]", port.port_name, port.port_type);
            }
        }
    }

    Ok(CliResult::success())
}

fn convert(cli: &Cli, field: &str, longitude: bool) -> anyhow::Result<CliResult> {
    let parsed = if longitude {
        Coordinate::parse_longitude(field)
    } else {
        Coordinate::parse_latitude(field)
    };
    let coordinate = match parsed {
        Ok(coordinate) => coordinate,
        Err(e) => return Ok(CliResult::invalid_args(e.to_string())),
    };

    match cli.format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "coordinate": coordinate,
                "nmea": coordinate.to_nmea(),
                "decimal": coordinate.to_decimal(),
            });
            println!("{json}");
        }
        OutputFormat::Text => {
            println!("{coordinate}");
            println!("nmea:    {}", coordinate.to_nmea());
            println!("decimal: {:.7}", coordinate.to_decimal());
        }
    }
    Ok(CliResult::success())
}

fn parse(cli: &Cli, line: &str, id_held: bool) -> anyhow::Result<CliResult> {
    let line = xlcs::simplify(line);
    let (kind, detail) = match xlcs::parse_line(&line, id_held) {
        Ok(Response::Noise) => ("noise", serde_json::Value::Null),
        Ok(Response::Unrecognized(text)) => ("unrecognized", text.into()),
        Ok(Response::IdAcquired(id)) => ("command_id", id.into()),
        Ok(Response::StopConfirmed) => ("stop_confirmed", serde_json::Value::Null),
        Ok(Response::ModemError(text)) => ("modem_error", text.into()),
        Ok(Response::PositionFields(report)) => match report.to_fix() {
            Ok(fix) => ("fix", serde_json::to_value(&fix)?),
            Err(e) => ("dropped", e.to_string().into()),
        },
        Err(e) => ("error", e.to_string().into()),
    };

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::json!({ "kind": kind, "detail": detail })),
        OutputFormat::Text => match detail {
            serde_json::Value::Null => println!("{kind}"),
            serde_json::Value::String(text) => println!("{kind}: {text}"),
            other => println!("{kind}: {other}"),
        },
    }

    if kind == "error" {
        return Ok(CliResult::error(ExitCodes::ERROR, "line rejected"));
    }
    Ok(CliResult::success())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn run_help(arg: &str) -> String {
        let cli = Cli::command();
        let run = cli.find_subcommand("run").unwrap();
        let arg = run.get_arguments().find(|a| a.get_id() == arg).unwrap();
        arg.get_help().unwrap().to_string()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_help() {
        // Silence is reported, the session keeps running
        assert_eq!(run_help("watchdog"), "Seconds without data before an error is reported");
        assert!(run_help("log").contains("directory"));
    }
}
