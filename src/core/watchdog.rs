//! Data watchdog
//!
//! Tracks the deadline by which the modem must have sent something. The
//! session arms it once position reports are expected and pushes the deadline
//! forward on every received line. The session driver sleeps until
//! [`Watchdog::deadline`] and reports expiry back through the state machine.

use std::time::Duration;
use tokio::time::Instant;

/// Default deadline in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Single deadline timer
#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

impl Watchdog {
    /// Create a disarmed watchdog
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
        }
    }

    /// Configured timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arm, or push an armed deadline forward, counting from now
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.timeout);
    }

    /// Disarm
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    /// Check if armed
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Current deadline, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Consume a firing. Returns false if the watchdog was not armed.
    ///
    /// The watchdog stays disarmed until the next [`arm`](Self::arm).
    pub fn fire(&mut self) -> bool {
        self.deadline.take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_disarmed() {
        let mut wd = Watchdog::default();
        assert!(!wd.is_armed());
        assert_eq!(wd.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        assert!(!wd.fire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_pushes_deadline() {
        let mut wd = Watchdog::new(Duration::from_secs(5));
        wd.arm();
        let first = wd.deadline().unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        wd.arm();
        assert_eq!(wd.deadline(), Some(first + Duration::from_secs(4)));

        assert!(wd.fire());
        assert!(!wd.is_armed());
        assert!(!wd.fire());
    }

    #[test]
    fn test_disarm() {
        let mut wd = Watchdog::new(Duration::from_secs(1));
        wd.arm();
        wd.disarm();
        assert!(wd.deadline().is_none());
    }
}
