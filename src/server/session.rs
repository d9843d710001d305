//! Per-client session state: sequence de-duplication with cached-response
//! resending, and HELLO-guarded session resets.
//!
//! A session only resets on a HELLO whose timestamp is strictly greater
//! than the last one this address's session accepted — an out-of-order or
//! replayed HELLO is rejected rather than clobbering live sequence state.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// How many of the most recent responses a session keeps cached for
/// duplicate-request resending. Bounded so a long-running session doesn't
/// grow without limit.
const RESPONSE_CACHE_CAPACITY: usize = 64;

pub struct Session {
    pub hello_ts: f64,
    responses: HashMap<u32, Vec<u8>>,
    order: Vec<u32>,
}

impl Session {
    fn new(hello_ts: f64) -> Self {
        Session { hello_ts, responses: HashMap::new(), order: Vec::new() }
    }

    /// Caches an encoded response so a duplicate request with the same seq
    /// can be answered without re-running the command.
    pub fn cache_response(&mut self, seq: u32, encoded: Vec<u8>) {
        if !self.responses.contains_key(&seq) {
            self.order.push(seq);
            if self.order.len() > RESPONSE_CACHE_CAPACITY {
                let evicted = self.order.remove(0);
                self.responses.remove(&evicted);
            }
        }
        self.responses.insert(seq, encoded);
    }

    pub fn cached_response(&self, seq: u32) -> Option<&[u8]> {
        self.responses.get(&seq).map(Vec::as_slice)
    }

    pub fn has_seen(&self, seq: u32) -> bool {
        self.responses.contains_key(&seq)
    }
}

/// All known client sessions, keyed by source address. Idle sessions are
/// evicted so a long-running server doesn't accumulate state for clients
/// that have gone away.
pub struct SessionTable {
    sessions: HashMap<IpAddr, Session>,
    last_activity: HashMap<IpAddr, Instant>,
    idle_timeout: Duration,
}

impl SessionTable {
    pub fn new(idle_timeout: Duration) -> Self {
        SessionTable { sessions: HashMap::new(), last_activity: HashMap::new(), idle_timeout }
    }

    /// Accepts a HELLO from `addr` with timestamp `ts`. Returns `true` if
    /// the session was (re)started — `ts` was greater than the session's
    /// previous HELLO timestamp, or this is a brand new session — and
    /// `false` if the HELLO was stale and ignored.
    pub fn accept_hello(&mut self, addr: IpAddr, ts: f64) -> bool {
        self.touch(addr);
        match self.sessions.get_mut(&addr) {
            Some(session) if ts > session.hello_ts => {
                *session = Session::new(ts);
                true
            }
            Some(_) => false,
            None => {
                self.sessions.insert(addr, Session::new(ts));
                true
            }
        }
    }

    pub fn session_mut(&mut self, addr: IpAddr) -> Option<&mut Session> {
        self.touch(addr);
        self.sessions.get_mut(&addr)
    }

    pub fn session(&self, addr: IpAddr) -> Option<&Session> {
        self.sessions.get(&addr)
    }

    fn touch(&mut self, addr: IpAddr) {
        self.last_activity.insert(addr, Instant::now());
    }

    /// Drops sessions that haven't been active within the idle timeout.
    pub fn evict_idle(&mut self) {
        let idle_timeout = self.idle_timeout;
        let now = Instant::now();
        let stale: Vec<IpAddr> = self
            .last_activity
            .iter()
            .filter(|(_, &last)| now.duration_since(last) > idle_timeout)
            .map(|(&addr, _)| addr)
            .collect();
        for addr in stale {
            self.sessions.remove(&addr);
            self.last_activity.remove(&addr);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn addr() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10))
    }

    #[test]
    fn first_hello_always_starts_a_session() {
        let mut table = SessionTable::new(Duration::from_secs(60));
        assert!(table.accept_hello(addr(), 100.0));
    }

    #[test]
    fn stale_hello_is_rejected() {
        let mut table = SessionTable::new(Duration::from_secs(60));
        assert!(table.accept_hello(addr(), 100.0));
        assert!(!table.accept_hello(addr(), 50.0));
        assert!(!table.accept_hello(addr(), 100.0));
    }

    #[test]
    fn newer_hello_resets_the_session() {
        let mut table = SessionTable::new(Duration::from_secs(60));
        table.accept_hello(addr(), 100.0);
        table.session_mut(addr()).unwrap().cache_response(1, b"cached".to_vec());
        assert!(table.accept_hello(addr(), 200.0));
        assert!(!table.session(addr()).unwrap().has_seen(1));
    }

    #[test]
    fn duplicate_request_is_served_from_cache() {
        let mut table = SessionTable::new(Duration::from_secs(60));
        table.accept_hello(addr(), 100.0);
        let session = table.session_mut(addr()).unwrap();
        session.cache_response(5, b"1 OK\n".to_vec());
        assert_eq!(table.session(addr()).unwrap().cached_response(5), Some(&b"1 OK\n"[..]));
    }
}
