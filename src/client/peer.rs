//! Peer records: what the client coordinator remembers about each server
//! it has said HELLO to.

use std::net::IpAddr;

/// A known peer, as tracked by the client coordinator.
#[derive(Debug, Clone)]
pub struct Peer {
    pub addr: IpAddr,
    /// Next outgoing sequence number for this peer's session. Allocated
    /// (and advanced) the moment a request is sent, not when its response
    /// arrives — retries of the same request reuse the already-allocated
    /// seq.
    pub next_seq: u32,
    /// The HELLO timestamp the server accepted when this session started.
    pub session_ts: f64,
    /// Display ordering hint; set by `find`/`add` in discovery order.
    pub ordinal: Option<u32>,
}

impl Peer {
    /// `hello_seq` is the seq of the HELLO that created this peer; per the
    /// protocol the session's next sequence number starts at `hello_seq + 1`.
    pub fn new(addr: IpAddr, hello_seq: u32, session_ts: f64, ordinal: Option<u32>) -> Self {
        Peer { addr, next_seq: hello_seq + 1, session_ts, ordinal }
    }

    /// Allocates the next sequence number for a new request to this peer.
    pub fn allocate_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Resets the peer's sequence counter after a successful HELLO whose
    /// own seq was `hello_seq`.
    pub fn reset_after_hello(&mut self, hello_seq: u32, session_ts: f64) {
        self.next_seq = hello_seq + 1;
        self.session_ts = session_ts;
    }
}
