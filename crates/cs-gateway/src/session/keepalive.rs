//! Keepalive deadline tracking

use std::time::Duration;

use tokio::time::Instant;

/// Tracks when the peer was last heard answering a ping
///
/// Pings go out every `timeout / 2`. The session expires once `timeout`
/// has passed since the last pong, or since activation if no pong has
/// arrived yet.
#[derive(Debug, Clone)]
pub struct Keepalive {
    timeout: Duration,
    last_pong: Instant,
    pings_sent: u64,
}

impl Keepalive {
    /// Start tracking from `now`
    pub fn new(timeout: Duration, now: Instant) -> Self {
        Self {
            timeout,
            last_pong: now,
            pings_sent: 0,
        }
    }

    /// Interval between pings
    pub fn interval(&self) -> Duration {
        (self.timeout / 2).max(Duration::from_millis(1))
    }

    /// Instant at which the session expires without another pong
    pub fn deadline(&self) -> Instant {
        self.last_pong + self.timeout
    }

    /// Record a pong received at `at`
    pub fn pong(&mut self, at: Instant) {
        if at > self.last_pong {
            self.last_pong = at;
        }
    }

    /// Payload for the next ping (a big-endian sequence number)
    pub fn next_ping_payload(&mut self) -> [u8; 8] {
        self.pings_sent += 1;
        self.pings_sent.to_be_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_is_half_timeout() {
        let keepalive = Keepalive::new(Duration::from_secs(20), Instant::now());
        assert_eq!(keepalive.interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_expires_without_pong() {
        let start = Instant::now();
        let keepalive = Keepalive::new(Duration::from_secs(5), start);

        assert_eq!(keepalive.deadline(), start + Duration::from_secs(5));
        assert!(keepalive.deadline() < start + Duration::from_secs(6));
    }

    #[test]
    fn test_pong_extends_deadline() {
        let start = Instant::now();
        let mut keepalive = Keepalive::new(Duration::from_secs(5), start);

        keepalive.pong(start + Duration::from_secs(4));
        assert!(keepalive.deadline() > start + Duration::from_secs(6));
        assert_eq!(keepalive.deadline(), start + Duration::from_secs(9));

        // A stale timestamp never moves the deadline back
        keepalive.pong(start + Duration::from_secs(1));
        assert_eq!(keepalive.deadline(), start + Duration::from_secs(9));
    }

    #[test]
    fn test_ping_payload_sequence() {
        let mut keepalive = Keepalive::new(Duration::from_secs(5), Instant::now());
        assert_eq!(keepalive.next_ping_payload(), 1u64.to_be_bytes());
        assert_eq!(keepalive.next_ping_payload(), 2u64.to_be_bytes());
    }
}
