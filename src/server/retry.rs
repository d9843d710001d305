//! Server-side response retry set.
//!
//! Mirrors the client's retry engine from the other direction: once a
//! response is sent, it's kept here and re-sent on the same jittered
//! schedule until the client ACKs it or the deadline passes. A periodic
//! scan (driven by [`Self::due`] from the dispatch loop's `select!`) is
//! what actually performs the resends.

use rand::Rng;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::Instant;

struct Outstanding {
    payload: Vec<u8>,
    next_retry_at: Instant,
    deadline: Instant,
}

/// Responses awaiting acknowledgement, keyed by `(client address, seq)`.
pub struct RetrySet {
    entries: HashMap<(SocketAddr, u32), Outstanding>,
    timeout: Duration,
}

fn jitter() -> Duration {
    rand::thread_rng().gen_range(crate::RETRY_DELAY_MIN..crate::RETRY_DELAY_MAX)
}

impl RetrySet {
    pub fn new(timeout: Duration) -> Self {
        RetrySet { entries: HashMap::new(), timeout }
    }

    /// Registers a just-sent response for possible resending.
    pub fn track(&mut self, addr: SocketAddr, seq: u32, payload: Vec<u8>) {
        let now = Instant::now();
        self.entries.insert(
            (addr, seq),
            Outstanding { payload, next_retry_at: now + jitter(), deadline: now + self.timeout },
        );
    }

    /// Cancels retries for a response the client has ACKed.
    pub fn ack(&mut self, addr: SocketAddr, seq: u32) {
        self.entries.remove(&(addr, seq));
    }

    /// Returns every entry due for resend right now, rescheduling each
    /// one's next attempt, and drops entries whose deadline has passed.
    pub fn due(&mut self) -> Vec<(SocketAddr, Vec<u8>)> {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.deadline > now);

        let mut due = Vec::new();
        for (&(addr, _seq), entry) in self.entries.iter_mut() {
            if entry.next_retry_at <= now {
                due.push((addr, entry.payload.clone()));
                entry.next_retry_at = now + jitter();
            }
        }
        due
    }

    /// The earliest time any entry next needs attention, for scheduling
    /// the dispatch loop's next wakeup. `None` if the set is empty.
    pub fn next_wake(&self) -> Option<Instant> {
        self.entries.values().map(|e| e.next_retry_at.min(e.deadline)).min()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)), 5647)
    }

    #[tokio::test(start_paused = true)]
    async fn ack_cancels_a_tracked_response() {
        let mut retries = RetrySet::new(Duration::from_secs(5));
        retries.track(addr(), 1, b"1 OK\n".to_vec());
        retries.ack(addr(), 1);
        assert!(retries.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn due_resends_after_the_jitter_window_and_reschedules() {
        let mut retries = RetrySet::new(Duration::from_secs(5));
        retries.track(addr(), 1, b"1 OK\n".to_vec());

        assert!(retries.due().is_empty(), "nothing is due immediately after tracking");

        tokio::time::advance(crate::RETRY_DELAY_MAX).await;
        let due = retries.due();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].0, addr());

        assert!(retries.due().is_empty(), "resend reschedules the next attempt");
    }

    #[tokio::test(start_paused = true)]
    async fn entries_past_their_deadline_are_dropped() {
        let mut retries = RetrySet::new(Duration::from_millis(500));
        retries.track(addr(), 1, b"1 OK\n".to_vec());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(retries.due().is_empty());
        assert!(retries.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn next_wake_reflects_the_earliest_outstanding_entry() {
        let mut retries = RetrySet::new(Duration::from_secs(5));
        assert!(retries.next_wake().is_none());
        retries.track(addr(), 1, b"1 OK\n".to_vec());
        assert!(retries.next_wake().is_some());
    }
}
