//! The ARTIM (Association Request/Reject/Release Timer) timer.
//!
//! Bounds how long the DUL provider will wait in a transient state for a
//! peer response before aborting the association. See PS3.8 Section 9.1.5.

use std::time::{Duration, Instant};

/// A one-shot, restartable interval timer.
///
/// Unlike the stateful `Start`/`Stop`/`Check` triad found in other
/// implementations, [`is_expired`](ArtimTimer::is_expired) reads as a direct
/// boolean rather than the inverted "still running" sense.
#[derive(Debug, Clone)]
pub struct ArtimTimer {
    timeout: Duration,
    started_at: Option<Instant>,
}

impl ArtimTimer {
    /// Create a timer with the given timeout, initially stopped.
    pub fn new(timeout: Duration) -> Self {
        ArtimTimer {
            timeout,
            started_at: None,
        }
    }

    /// Start (or resume) counting down from now.
    pub fn start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Stop the timer. While stopped, [`is_expired`](Self::is_expired) always
    /// returns `false`.
    pub fn stop(&mut self) {
        self.started_at = None;
    }

    /// Stop and immediately start again.
    pub fn restart(&mut self) {
        self.start();
    }

    /// Whether the timer is currently counting down.
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Whether the timer has been running and has exceeded its timeout.
    pub fn is_expired(&self) -> bool {
        match self.started_at {
            Some(started_at) => started_at.elapsed() > self.timeout,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn timer_starts_stopped_and_not_expired() {
        let timer = ArtimTimer::new(Duration::from_millis(50));
        assert!(!timer.is_running());
        assert!(!timer.is_expired());
    }

    #[test]
    fn timer_expires_after_timeout() {
        let mut timer = ArtimTimer::new(Duration::from_millis(20));
        timer.start();
        assert!(!timer.is_expired());
        sleep(Duration::from_millis(40));
        assert!(timer.is_expired());
    }

    #[test]
    fn stopping_clears_expiry() {
        let mut timer = ArtimTimer::new(Duration::from_millis(10));
        timer.start();
        sleep(Duration::from_millis(20));
        assert!(timer.is_expired());
        timer.stop();
        assert!(!timer.is_expired());
    }

    #[test]
    fn restart_resets_the_clock() {
        let mut timer = ArtimTimer::new(Duration::from_millis(30));
        timer.start();
        sleep(Duration::from_millis(20));
        timer.restart();
        sleep(Duration::from_millis(20));
        assert!(!timer.is_expired());
    }
}
