//! End-to-end session tests against a scripted modem on an in-memory pipe

use em7345_core::{MessageId, ModemEvent, Session, SessionConfig, SessionState, Severity};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream, ReadBuf,
    ReadHalf, WriteHalf,
};
use tokio::sync::broadcast;

const SAMPLE: &str = "+XLCSLSR:  0,4915.7833N,01134.3386E,,,,,,,20150401,123456,0";

struct FakeModem {
    rx: BufReader<ReadHalf<DuplexStream>>,
    tx: WriteHalf<DuplexStream>,
}

impl FakeModem {
    /// Read one command, including its CR terminator. Empty at end of stream.
    async fn command(&mut self) -> String {
        let mut buf = Vec::new();
        self.rx.read_until(b'\r', &mut buf).await.unwrap();
        String::from_utf8(buf).unwrap()
    }

    async fn send(&mut self, text: &str) {
        self.tx.write_all(text.as_bytes()).await.unwrap();
        self.tx.flush().await.unwrap();
    }
}

/// Pipe end whose writes fail once `broken` is set, like an unplugged port
struct BrokenWrites {
    inner: DuplexStream,
    broken: Arc<AtomicBool>,
}

impl BrokenWrites {
    fn check(&self) -> io::Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "port unplugged"))
        } else {
            Ok(())
        }
    }
}

impl AsyncRead for BrokenWrites {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for BrokenWrites {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        if let Err(e) = self.check() {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Err(e) = self.check() {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

fn start(config: SessionConfig) -> (Session, broadcast::Receiver<ModemEvent>, FakeModem) {
    let (client, modem) = tokio::io::duplex(4096);
    let mut session = Session::new(config);
    let events = session.subscribe();
    session.start_with_stream(client);
    (session, events, fake_modem(modem))
}

fn fake_modem(modem: DuplexStream) -> FakeModem {
    let (rx, tx) = tokio::io::split(modem);
    FakeModem {
        rx: BufReader::new(rx),
        tx,
    }
}

/// Wait for the first event accepted by `pick`, collecting everything seen
async fn wait_for<T>(
    events: &mut broadcast::Receiver<ModemEvent>,
    seen: &mut Vec<ModemEvent>,
    pick: impl Fn(&ModemEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(Duration::from_secs(120), async {
        loop {
            let event = events.recv().await.unwrap();
            let picked = pick(&event);
            seen.push(event);
            if let Some(value) = picked {
                return value;
            }
        }
    })
    .await
    .unwrap()
}

fn drain(events: &mut broadcast::Receiver<ModemEvent>, seen: &mut Vec<ModemEvent>) {
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
}

fn count_messages(seen: &[ModemEvent], id: MessageId) -> usize {
    seen.iter()
        .filter_map(ModemEvent::as_message)
        .filter(|m| m.id == id)
        .count()
}

fn count_finished(seen: &[ModemEvent]) -> usize {
    seen.iter()
        .filter(|e| matches!(e, ModemEvent::Finished))
        .count()
}

fn is_state(state: SessionState) -> impl Fn(&ModemEvent) -> Option<()> {
    move |e| matches!(e, ModemEvent::StateChanged { state: s } if *s == state).then_some(())
}

#[tokio::test]
async fn streams_fixes_and_completes_stop_handshake() {
    let (mut session, mut events, mut modem) = start(SessionConfig::new("pipe"));
    let mut seen = Vec::new();

    assert_eq!(modem.command().await, "AT+XLCSLSR=1,1,,,,,1,,,,,\r");
    modem.send("\r\n+XLCSLSR: request id 42\r\nOK\r\n").await;
    modem.send(&format!("{SAMPLE}\r\n")).await;

    let fix = wait_for(&mut events, &mut seen, |e| e.as_fix().cloned()).await;
    assert_eq!(fix.latitude.to_string(), "49°15.7833'N");
    assert_eq!(fix.longitude.to_string(), "11°34.3386'E");
    assert_eq!(fix.timestamp.to_rfc3339(), "2015-04-01T12:34:56+00:00");
    assert_eq!(session.state(), SessionState::Streaming);

    session.stop().await;
    assert_eq!(modem.command().await, "AT+XLSRSTOP=0,42\r");
    wait_for(&mut events, &mut seen, is_state(SessionState::Stopping)).await;

    modem.send("+XLSRSTOP: OK\r\n").await;
    wait_for(&mut events, &mut seen, |e| matches!(e, ModemEvent::Finished).then_some(())).await;
    session.wait().await;
    drain(&mut events, &mut seen);

    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(count_finished(&seen), 1);
    assert_eq!(seen.iter().filter_map(ModemEvent::as_fix).count(), 1);
    assert!(!seen
        .iter()
        .filter_map(ModemEvent::as_message)
        .any(|m| m.severity >= Severity::Error));
}

#[tokio::test]
async fn stop_without_command_id_finishes_immediately() {
    let (mut session, mut events, mut modem) = start(SessionConfig::new("pipe"));
    let mut seen = Vec::new();

    assert_eq!(modem.command().await, "AT+XLCSLSR=1,1,,,,,1,,,,,\r");
    wait_for(&mut events, &mut seen, is_state(SessionState::Starting)).await;

    session.stop().await;
    wait_for(&mut events, &mut seen, |e| matches!(e, ModemEvent::Finished).then_some(())).await;
    session.wait().await;

    assert_eq!(session.state(), SessionState::Stopped);
    // No stop command, just the end of the stream
    assert_eq!(modem.command().await, "");
}

#[tokio::test]
async fn modem_hangup_is_fatal() {
    let (mut session, mut events, mut modem) = start(SessionConfig::new("pipe"));
    let mut seen = Vec::new();

    assert_eq!(modem.command().await, "AT+XLCSLSR=1,1,,,,,1,,,,,\r");
    modem.send("+XLCSLSR: request id 7 OK\r\n").await;
    wait_for(&mut events, &mut seen, is_state(SessionState::Streaming)).await;

    drop(modem);
    wait_for(&mut events, &mut seen, is_state(SessionState::Stopped)).await;
    session.wait().await;
    drain(&mut events, &mut seen);

    let critical: Vec<_> = seen
        .iter()
        .filter_map(ModemEvent::as_message)
        .filter(|m| m.severity == Severity::Critical)
        .collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].id, MessageId::TRANSPORT_LOST);
    assert_eq!(count_finished(&seen), 0);
}

#[tokio::test]
async fn failed_stop_write_is_fatal() {
    let (client, modem) = tokio::io::duplex(4096);
    let broken = Arc::new(AtomicBool::new(false));
    let mut session = Session::new(SessionConfig::new("pipe"));
    let mut events = session.subscribe();
    session.start_with_stream(BrokenWrites {
        inner: client,
        broken: broken.clone(),
    });
    let mut modem = fake_modem(modem);
    let mut seen = Vec::new();

    assert_eq!(modem.command().await, "AT+XLCSLSR=1,1,,,,,1,,,,,\r");
    modem.send("+XLCSLSR: request id 42 OK\r\n").await;
    wait_for(&mut events, &mut seen, is_state(SessionState::Streaming)).await;

    broken.store(true, Ordering::SeqCst);
    session.stop().await;
    wait_for(&mut events, &mut seen, is_state(SessionState::Stopped)).await;
    session.wait().await;
    drain(&mut events, &mut seen);

    let critical: Vec<_> = seen
        .iter()
        .filter_map(ModemEvent::as_message)
        .filter(|m| m.severity == Severity::Critical)
        .collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].id, MessageId::WRITE_FAILED);
    assert_eq!(count_finished(&seen), 0);
    assert_eq!(session.state(), SessionState::Stopped);
    // The stop command never reached the modem
    assert_eq!(modem.command().await, "");
}

#[tokio::test(start_paused = true)]
async fn watchdog_reports_silence_once() {
    let config = SessionConfig::new("pipe").watchdog_timeout(Duration::from_secs(10));
    let (session, mut events, mut modem) = start(config);
    let mut seen = Vec::new();

    modem.command().await;
    modem.send("+XLCSLSR: request id 3 OK\r\n").await;
    wait_for(&mut events, &mut seen, is_state(SessionState::Streaming)).await;

    tokio::time::sleep(Duration::from_secs(35)).await;
    drain(&mut events, &mut seen);

    assert_eq!(count_messages(&seen, MessageId::NO_DATA), 1);
    assert_eq!(session.state(), SessionState::Streaming);

    // The next line re-arms it
    modem.send("OK\r\n").await;
    tokio::time::sleep(Duration::from_secs(11)).await;
    drain(&mut events, &mut seen);
    assert_eq!(count_messages(&seen, MessageId::NO_DATA), 2);
}

#[tokio::test(start_paused = true)]
async fn traffic_keeps_watchdog_quiet() {
    let config = SessionConfig::new("pipe").watchdog_timeout(Duration::from_secs(10));
    let (session, mut events, mut modem) = start(config);
    let mut seen = Vec::new();

    modem.command().await;
    modem.send("+XLCSLSR: request id 3 OK\r\n").await;
    wait_for(&mut events, &mut seen, is_state(SessionState::Streaming)).await;

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(6)).await;
        modem.send(&format!("{SAMPLE}\r\n")).await;
    }
    tokio::time::sleep(Duration::from_secs(6)).await;
    drain(&mut events, &mut seen);

    assert_eq!(count_messages(&seen, MessageId::NO_DATA), 0);
    assert_eq!(seen.iter().filter_map(ModemEvent::as_fix).count(), 5);
    assert_eq!(session.state(), SessionState::Streaming);
}
