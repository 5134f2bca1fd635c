//! Session management for one modem
//!
//! A [`Session`] owns a background task that serializes everything touching
//! the state machine: lines arriving from the modem, watchdog expiry and stop
//! requests from the controller. Events are published on a broadcast
//! channel; subscribe before calling [`Session::start`] to see them all.

use super::event::ModemEvent;
use super::state_machine::{Effect, ModemSession, SessionState};
use super::transport::{self, ModemLineCodec, SerialConfig, TransportError, DEFAULT_BAUD_RATE};
use super::watchdog::DEFAULT_TIMEOUT_SECS;
use futures::StreamExt;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::codec::FramedRead;
use uuid::Uuid;

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Serial port name
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Watchdog deadline
    pub watchdog_timeout: Duration,
}

impl SessionConfig {
    /// Create a new session configuration
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            watchdog_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Set baud rate
    #[must_use]
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set watchdog deadline
    #[must_use]
    pub fn watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    /// Serial settings for the modem port
    pub fn serial(&self) -> SerialConfig {
        SerialConfig::new(&self.port, self.baud_rate)
    }
}

/// Internal commands for session control
enum SessionCommand {
    Stop,
}

/// Modem session handle
pub struct Session {
    /// Unique session ID
    id: Uuid,
    /// Configuration
    config: SessionConfig,
    /// Current state, mirrored from the state machine
    state: Arc<RwLock<SessionState>>,
    /// Event broadcaster
    event_tx: broadcast::Sender<ModemEvent>,
    /// Command sender
    cmd_tx: mpsc::Sender<SessionCommand>,
    /// Command receiver, moved into the task on start
    cmd_rx: Option<mpsc::Receiver<SessionCommand>>,
    /// Background task
    task: Option<JoinHandle<()>>,
}

impl Session {
    /// Create a session that has not started yet
    pub fn new(config: SessionConfig) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);

        Self {
            id: Uuid::new_v4(),
            config,
            state: Arc::new(RwLock::new(SessionState::Idle)),
            event_tx,
            cmd_tx,
            cmd_rx: Some(cmd_rx),
            task: None,
        }
    }

    /// Get session ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get configuration
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Subscribe to session events
    pub fn subscribe(&self) -> broadcast::Receiver<ModemEvent> {
        self.event_tx.subscribe()
    }

    /// Open the configured serial port and start streaming positions.
    ///
    /// Failing to open the port is reported as a critical message and ends the
    /// session. Calling this more than once has no effect.
    pub fn start(&mut self) {
        let Some(cmd_rx) = self.cmd_rx.take() else {
            tracing::debug!(session = %self.id, "session already started");
            return;
        };

        let driver = self.driver();
        let serial = self.config.serial();
        self.task = Some(tokio::spawn(async move {
            match transport::open(&serial) {
                Ok(stream) => driver.run(stream, cmd_rx).await,
                Err(e) => {
                    let mut driver = driver;
                    let fx = driver.machine.on_transport_error(&e);
                    driver.publish(fx);
                }
            }
        }));
    }

    /// Start the session over an already open byte stream
    pub fn start_with_stream<S>(&mut self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let Some(cmd_rx) = self.cmd_rx.take() else {
            tracing::debug!(session = %self.id, "session already started");
            return;
        };

        let driver = self.driver();
        self.task = Some(tokio::spawn(driver.run(stream, cmd_rx)));
    }

    /// Ask the modem to stop. Completion is signalled by [`ModemEvent::Finished`].
    pub async fn stop(&self) {
        if self.task.is_none() {
            return;
        }
        if self.cmd_tx.send(SessionCommand::Stop).await.is_err() {
            tracing::debug!(session = %self.id, "stop after session ended");
        }
    }

    /// Wait for the background task to end
    pub async fn wait(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(session = %self.id, "session task failed: {e}");
            }
        }
    }

    fn driver(&self) -> Driver {
        Driver {
            machine: ModemSession::new(&self.config),
            state: self.state.clone(),
            event_tx: self.event_tx.clone(),
        }
    }
}

/// Runs the state machine against a byte stream
struct Driver {
    machine: ModemSession,
    state: Arc<RwLock<SessionState>>,
    event_tx: broadcast::Sender<ModemEvent>,
}

impl Driver {
    async fn run<S>(mut self, stream: S, mut cmd_rx: mpsc::Receiver<SessionCommand>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut lines = FramedRead::new(reader, ModemLineCodec::new());
        let mut commands_open = true;

        let fx = self.machine.start();
        self.apply(&mut writer, fx).await;

        while !self.machine.state().is_terminal() {
            let deadline = self.machine.watchdog_deadline();

            let fx = tokio::select! {
                cmd = cmd_rx.recv(), if commands_open => match cmd {
                    Some(SessionCommand::Stop) => self.machine.stop(),
                    None => {
                        // Handle dropped; finish the subscription cleanly
                        commands_open = false;
                        self.machine.stop()
                    }
                },
                line = lines.next() => match line {
                    Some(Ok(line)) => self.machine.handle_incoming(&line),
                    Some(Err(e)) => self.machine.on_transport_error(&e),
                    None => self
                        .machine
                        .on_transport_error(&TransportError::Disconnected),
                },
                () = expiry(deadline) => self.machine.on_watchdog_timeout(),
            };

            self.apply(&mut writer, fx).await;
        }

        if let Err(e) = writer.shutdown().await {
            tracing::debug!("shutdown failed: {e}");
        }
    }

    /// Carry out effects in order. A failed write is fatal.
    async fn apply<W>(&mut self, writer: &mut W, fx: Vec<Effect>)
    where
        W: AsyncWrite + Unpin,
    {
        let mut queue: VecDeque<Effect> = fx.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Send(command) => {
                    tracing::debug!(
                        command = %String::from_utf8_lossy(&command).trim_end(),
                        "sending command"
                    );
                    let written = async {
                        writer.write_all(&command).await?;
                        writer.flush().await
                    }
                    .await;
                    if let Err(e) = written {
                        let error = TransportError::SendError(e.to_string());
                        queue.extend(self.machine.on_transport_error(&error));
                    }
                }
                Effect::Emit(event) => self.emit(event),
            }
        }
    }

    /// Publish effects that carry no commands
    fn publish(&mut self, fx: Vec<Effect>) {
        for effect in fx {
            if let Effect::Emit(event) = effect {
                self.emit(event);
            }
        }
    }

    fn emit(&mut self, event: ModemEvent) {
        if let ModemEvent::StateChanged { state } = event {
            *self.state.write() = state;
        }
        // No subscribers is not an error
        let _ = self.event_tx.send(event);
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
