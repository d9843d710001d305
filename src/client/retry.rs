//! The client-side retry/collect loop: §4.3's core algorithm.
//!
//! One call to [`collect_responses`] drives an entire multi-peer operation:
//! it sends the initial request to every target, retransmits to whichever
//! targets are still pending after a randomised `[100, 400)` ms delay, acks
//! every response it receives (new or duplicate), and gives up on a peer
//! once the overall deadline passes. Per-peer failures never abort the
//! whole operation — the result is a map keyed by peer address.

use crate::codec::{encode_command, CommandFrame, ResponseFrame, ResponseShape, Verb};
use crate::codec::response::decode_response;
use crate::error::{ClientError, CodecError};
use crate::transport::UdpTransport;
use rand::Rng;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// One outstanding request, keyed by the peer it was sent to.
struct Pending {
    seq: u32,
    payload: Vec<u8>,
    addr: IpAddr,
    port: u16,
    next_retry_at: Instant,
}

fn jitter() -> Duration {
    rand::thread_rng().gen_range(crate::RETRY_DELAY_MIN..crate::RETRY_DELAY_MAX)
}

/// Sends `payload` (already encoded, carrying `seq`) to every `(addr, port)`
/// target and collects one response per target, retrying until every
/// target has answered or `timeout` elapses.
pub async fn collect_responses(
    udp: &UdpTransport,
    targets: HashMap<IpAddr, (u32, Vec<u8>, u16)>,
    shape: ResponseShape,
    timeout: Duration,
) -> HashMap<IpAddr, Result<ResponseFrame, ClientError>> {
    let deadline = Instant::now() + timeout;
    let mut results: HashMap<IpAddr, Result<ResponseFrame, ClientError>> = HashMap::new();
    let mut pending: HashMap<IpAddr, Pending> = HashMap::new();

    for (addr, (seq, payload, port)) in targets {
        let sock_addr = SocketAddr::new(addr, port);
        match udp.send_to(&payload, sock_addr).await {
            Ok(()) => {
                trace!(%addr, seq, "sent request");
                pending.insert(
                    addr,
                    Pending { seq, payload, addr, port, next_retry_at: Instant::now() + jitter() },
                );
            }
            Err(e) => {
                results.insert(addr, Err(ClientError::Transport(e)));
            }
        }
    }

    while !pending.is_empty() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }

        let next_wake = pending
            .values()
            .map(|p| p.next_retry_at)
            .min()
            .unwrap_or(deadline)
            .min(deadline);

        tokio::select! {
            _ = tokio::time::sleep_until(next_wake) => {
                let now = Instant::now();
                for pending_req in pending.values_mut() {
                    if pending_req.next_retry_at <= now {
                        debug!(addr = %pending_req.addr, seq = pending_req.seq, "retransmitting");
                        let sock_addr = SocketAddr::new(pending_req.addr, pending_req.port);
                        let _ = udp.send_to(&pending_req.payload, sock_addr).await;
                        pending_req.next_retry_at = now + jitter();
                    }
                }
            }
            recv = tokio::time::timeout_at(deadline, udp.recv()) => {
                if let Ok(Ok((bytes, from))) = recv {
                    handle_datagram(udp, &bytes, from, shape, &mut pending, &mut results).await;
                }
            }
        }
    }

    for (addr, pending_req) in pending {
        warn!(%addr, seq = pending_req.seq, "peer did not respond within the deadline");
        results.insert(addr, Err(ClientError::Timeout(addr)));
    }

    results
}

/// Broadcast discovery: unlike [`collect_responses`], the set of targets
/// isn't known ahead of time. Keeps re-broadcasting the same HELLO on the
/// usual jittered schedule until the deadline (or, if `target_count` is
/// given, until that many distinct addresses have responded), collecting
/// one response per distinct responding address.
pub async fn broadcast_discover(
    udp: &UdpTransport,
    broadcast_addr: SocketAddr,
    seq: u32,
    payload: Vec<u8>,
    shape: ResponseShape,
    timeout: Duration,
    target_count: Option<usize>,
) -> HashMap<IpAddr, ResponseFrame> {
    let deadline = Instant::now() + timeout;
    let mut next_retry_at = Instant::now();
    let mut results: HashMap<IpAddr, ResponseFrame> = HashMap::new();

    loop {
        if let Some(n) = target_count {
            if results.len() >= n {
                break;
            }
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        let wake = next_retry_at.min(deadline);

        tokio::select! {
            _ = tokio::time::sleep_until(wake) => {
                if Instant::now() >= next_retry_at {
                    debug!(%broadcast_addr, seq, "broadcasting HELLO");
                    let _ = udp.send_to(&payload, broadcast_addr).await;
                    next_retry_at = Instant::now() + jitter();
                }
            }
            recv = tokio::time::timeout_at(deadline, udp.recv()) => {
                if let Ok(Ok((bytes, from))) = recv {
                    let Ok(text) = std::str::from_utf8(&bytes) else {
                        warn!(addr = %from, "dropping datagram with invalid UTF-8");
                        continue;
                    };
                    match decode_response(text, shape) {
                        Ok(frame) if frame.seq == seq => {
                            send_ack(udp, from, frame.seq).await;
                            results.entry(from.ip()).or_insert(frame);
                        }
                        Ok(_) => {
                            trace!(addr = %from, "ignoring response with unrelated sequence number");
                        }
                        Err(e) => log_decode_error(from.ip(), &e),
                    }
                }
            }
        }
    }

    results
}

async fn handle_datagram(
    udp: &UdpTransport,
    bytes: &[u8],
    from: SocketAddr,
    shape: ResponseShape,
    pending: &mut HashMap<IpAddr, Pending>,
    results: &mut HashMap<IpAddr, Result<ResponseFrame, ClientError>>,
) {
    let addr = from.ip();

    let text = match std::str::from_utf8(bytes) {
        Ok(t) => t,
        Err(_) => {
            warn!(%addr, "dropping datagram with invalid UTF-8");
            return;
        }
    };

    let frame = match decode_response(text, shape) {
        Ok(frame) => frame,
        Err(e) => {
            log_decode_error(addr, &e);
            return;
        }
    };

    if let Some(pending_req) = pending.get(&addr) {
        if frame.seq == pending_req.seq {
            send_ack(udp, from, frame.seq).await;
            results.insert(addr, Ok(frame));
            pending.remove(&addr);
        } else {
            // A stale response for a sequence we're no longer waiting
            // on. Ack it anyway so the server stops retrying it.
            send_ack(udp, from, frame.seq).await;
        }
        return;
    }

    // Already resolved for this address: the server is retransmitting
    // because our earlier ACK never arrived. Ack it again and drop the
    // body rather than silently ignoring the datagram.
    if let Some(Ok(resolved)) = results.get(&addr) {
        if frame.seq == resolved.seq {
            send_ack(udp, from, frame.seq).await;
            return;
        }
    }

    trace!(%addr, "datagram from unknown/untracked peer, ignoring");
}

async fn send_ack(udp: &UdpTransport, to: SocketAddr, seq: u32) {
    let ack = CommandFrame { seq, verb: Verb::Ack };
    let bytes = encode_command(&ack);
    if let Err(e) = udp.send_to(bytes.as_bytes(), to).await {
        warn!(addr = %to, error = %e, "failed to send ACK");
    }
}

fn log_decode_error(addr: IpAddr, e: &CodecError) {
    warn!(%addr, error = %e, "dropping undecodable datagram");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_the_configured_band() {
        for _ in 0..1000 {
            let delay = jitter();
            assert!(delay >= crate::RETRY_DELAY_MIN);
            assert!(delay < crate::RETRY_DELAY_MAX);
        }
    }
}
