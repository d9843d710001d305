//! The client-side fleet coordinator: discovery, peer bookkeeping, and one
//! method per wire verb issued against some subset of known peers.
//!
//! Every command (other than HELLO/discovery) is still sent as an
//! individually-addressed unicast datagram per peer, even when the caller
//! targets the whole fleet — each peer has its own session sequence
//! counter, so there is no single packet that is simultaneously valid for
//! every recipient. "Broadcast" at this layer means "fan out to every
//! known peer", not "one UDP broadcast datagram".

use super::peer::Peer;
use super::retry;
use crate::codec::response::{OkPayload, ResponseOutcome};
use crate::codec::status::ImageLine;
use crate::codec::{CommandFrame, ResponseFrame, ResponseShape, StatusReport, Verb};
use crate::error::ClientError;
use crate::transport::{self, UdpTransport};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tracing::warn;

fn now_unix() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Tracks a set of servers across a run: who's known, what session state
/// they're in, and drives every command exchange against them.
pub struct Coordinator {
    udp: UdpTransport,
    port: u16,
    timeout: Duration,
    peers: HashMap<IpAddr, Peer>,
    hello_seq_counter: u32,
    ordinal_counter: u32,
    time_delta: Duration,
}

impl Coordinator {
    pub fn new(udp: UdpTransport, port: u16, timeout: Duration) -> Self {
        Coordinator {
            udp,
            port,
            timeout,
            peers: HashMap::new(),
            hello_seq_counter: 0,
            ordinal_counter: 0,
            time_delta: Duration::from_millis(250),
        }
    }

    /// Sets the maximum allowed deviation between any two peers' reported
    /// STATUS timestamps before `status()` flags a discrepancy.
    pub fn set_time_delta(&mut self, time_delta: Duration) {
        self.time_delta = time_delta;
    }

    fn next_hello_seq(&mut self) -> u32 {
        self.hello_seq_counter += 1;
        self.hello_seq_counter
    }

    fn allocate_ordinal(&mut self) -> u32 {
        let ordinal = self.ordinal_counter;
        self.ordinal_counter += 1;
        ordinal
    }

    /// All known peers, in discovery order.
    pub fn servers(&self) -> Vec<IpAddr> {
        let mut entries: Vec<&Peer> = self.peers.values().collect();
        entries.sort_by_key(|p| p.ordinal.unwrap_or(u32::MAX));
        entries.into_iter().map(|p| p.addr).collect()
    }

    /// Looks up the address of the `ordinal`th discovered peer (zero-based),
    /// by display order — not a network operation.
    pub fn nth_server(&self, ordinal: u32) -> Option<IpAddr> {
        self.peers.values().find(|p| p.ordinal == Some(ordinal)).map(|p| p.addr)
    }

    /// Registers an already-known peer address directly, without a HELLO
    /// round-trip — useful when an address is known out-of-band (a saved
    /// fleet list, a previous run's discovery) and doesn't need to prove
    /// itself over the network before being counted as a server. A no-op if
    /// the address is already tracked.
    pub fn add(&mut self, addr: IpAddr) {
        if self.peers.contains_key(&addr) {
            return;
        }
        let ordinal = self.allocate_ordinal();
        self.peers.insert(addr, Peer::new(addr, 0, 0.0, Some(ordinal)));
    }

    /// Drops a peer from the tracked set. Does not notify the server.
    pub fn remove(&mut self, addr: IpAddr) {
        self.peers.remove(&addr);
    }

    /// Broadcasts a HELLO across the subnet and adds every server that
    /// answers with a matching protocol version as a tracked peer. Runs for
    /// the full timeout, collecting as many distinct respondents as answer.
    pub async fn discover(&mut self, network: Ipv4Addr, prefix_len: u8) -> Result<Vec<IpAddr>, ClientError> {
        self.broadcast_hello_and_ingest(network, prefix_len, None).await
    }

    /// Broadcasts a HELLO across the subnet and returns as soon as `n`
    /// distinct servers have answered with a matching protocol version, or
    /// the timeout elapses — whichever comes first.
    pub async fn find(&mut self, network: Ipv4Addr, prefix_len: u8, n: usize) -> Result<Vec<IpAddr>, ClientError> {
        self.broadcast_hello_and_ingest(network, prefix_len, Some(n)).await
    }

    async fn broadcast_hello_and_ingest(
        &mut self,
        network: Ipv4Addr,
        prefix_len: u8,
        target_count: Option<usize>,
    ) -> Result<Vec<IpAddr>, ClientError> {
        let broadcast_ip = transport::broadcast_address(network, prefix_len)?;
        let broadcast_addr = SocketAddr::new(IpAddr::V4(broadcast_ip), self.port);
        let seq = self.next_hello_seq();
        let ts = now_unix();
        let frame = CommandFrame { seq, verb: Verb::Hello { timestamp: ts } };
        let payload = crate::codec::encode_command(&frame).into_bytes();

        let responses = retry::broadcast_discover(
            &self.udp,
            broadcast_addr,
            seq,
            payload,
            ResponseShape::Version,
            self.timeout,
            target_count,
        )
        .await;

        let mut discovered = Vec::new();
        for (addr, response) in responses {
            match response.outcome {
                ResponseOutcome::Ok(OkPayload::Version(v)) if v == crate::PROTOCOL_VERSION => {
                    let ordinal = match self.peers.get(&addr).and_then(|p| p.ordinal) {
                        Some(o) => o,
                        None => self.allocate_ordinal(),
                    };
                    self.peers
                        .entry(addr)
                        .and_modify(|p| p.reset_after_hello(seq, ts))
                        .or_insert_with(|| Peer::new(addr, seq, ts, Some(ordinal)));
                    discovered.push(addr);
                }
                ResponseOutcome::Ok(OkPayload::Version(got)) => {
                    tracing::warn!(%addr, got, expected = crate::PROTOCOL_VERSION, "ignoring discovery response with mismatched protocol version");
                }
                _ => {
                    tracing::warn!(%addr, "ignoring malformed discovery response");
                }
            }
        }
        discovered.sort();
        Ok(discovered)
    }

    /// Says HELLO to one specific address, adding or refreshing it as a
    /// tracked peer on success.
    pub async fn hello(&mut self, addr: IpAddr) -> Result<(), ClientError> {
        let seq = self.next_hello_seq();
        let ts = now_unix();
        let frame = CommandFrame { seq, verb: Verb::Hello { timestamp: ts } };
        let payload = crate::codec::encode_command(&frame).into_bytes();

        let mut targets = HashMap::new();
        targets.insert(addr, (seq, payload, self.port));
        let mut results = retry::collect_responses(&self.udp, targets, ResponseShape::Version, self.timeout).await;
        let response = results.remove(&addr).unwrap_or(Err(ClientError::Timeout(addr)))?;

        match response.outcome {
            ResponseOutcome::Ok(OkPayload::Version(v)) => {
                if v != crate::PROTOCOL_VERSION {
                    return Err(ClientError::VersionMismatch { addr, expected: crate::PROTOCOL_VERSION, got: v });
                }
                let ordinal = self.peers.get(&addr).and_then(|p| p.ordinal);
                let ordinal = match ordinal {
                    Some(o) => o,
                    None => self.allocate_ordinal(),
                };
                self.peers
                    .entry(addr)
                    .and_modify(|p| p.reset_after_hello(seq, ts))
                    .or_insert_with(|| Peer::new(addr, seq, ts, Some(ordinal)));
                Ok(())
            }
            ResponseOutcome::Error(message) => Err(ClientError::Remote { addr, message }),
            _ => Err(ClientError::Decode {
                addr,
                source: crate::error::CodecError::BadData("unexpected HELLO response shape".to_owned()),
            }),
        }
    }

    /// Sends the same command to every address in `addrs`, each under its
    /// own per-peer sequence number, and collects the raw response frames.
    pub async fn command(
        &mut self,
        addrs: &[IpAddr],
        verb: Verb,
        shape: ResponseShape,
    ) -> HashMap<IpAddr, Result<ResponseFrame, ClientError>> {
        let mut targets = HashMap::new();
        let mut results = HashMap::new();

        for &addr in addrs {
            match self.peers.get_mut(&addr) {
                Some(peer) => {
                    let seq = peer.allocate_seq();
                    let frame = CommandFrame { seq, verb: verb.clone() };
                    let payload = crate::codec::encode_command(&frame).into_bytes();
                    targets.insert(addr, (seq, payload, self.port));
                }
                None => {
                    results.insert(addr, Err(ClientError::UnknownPeer(addr)));
                }
            }
        }

        let collected = retry::collect_responses(&self.udp, targets, shape, self.timeout).await;
        results.extend(collected);
        results
    }

    /// Fetches STATUS from every address and flags (but does not raise on)
    /// discrepancies between peers: mismatched resolution/framerate/mode
    /// fields, or a reported timestamp that deviates from the earliest one
    /// by more than `time_delta`.
    pub async fn status(&mut self, addrs: &[IpAddr]) -> HashMap<IpAddr, Result<StatusReport, ClientError>> {
        let results = self.command(addrs, Verb::Status, ResponseShape::Status).await;
        let results: HashMap<IpAddr, Result<StatusReport, ClientError>> =
            results.into_iter().map(|(addr, r)| (addr, r.and_then(|f| extract_status(addr, f)))).collect();
        self.flag_status_discrepancies(&results);
        results
    }

    fn flag_status_discrepancies(&self, results: &HashMap<IpAddr, Result<StatusReport, ClientError>>) {
        let ok: Vec<(IpAddr, &StatusReport)> =
            results.iter().filter_map(|(&addr, r)| r.as_ref().ok().map(|s| (addr, s))).collect();
        let Some(&(reference_addr, reference)) = ok.first() else { return };

        for &(addr, status) in &ok[1..] {
            if status.resolution != reference.resolution {
                warn!(%addr, reference = %reference_addr, "resolution differs from other peers");
            }
            if status.framerate != reference.framerate {
                warn!(%addr, reference = %reference_addr, "framerate differs from other peers");
            }
            if status.awb_mode != reference.awb_mode {
                warn!(%addr, reference = %reference_addr, "awb mode differs from other peers");
            }
            if status.exposure_mode != reference.exposure_mode {
                warn!(%addr, reference = %reference_addr, "exposure mode differs from other peers");
            }
            if status.metering_mode != reference.metering_mode {
                warn!(%addr, reference = %reference_addr, "metering mode differs from other peers");
            }
        }

        let min_ts = ok.iter().map(|(_, s)| s.timestamp).fold(f64::INFINITY, f64::min);
        for &(addr, status) in &ok {
            let deviation = status.timestamp - min_ts;
            if deviation > self.time_delta.as_secs_f64() {
                warn!(%addr, deviation_ms = deviation * 1000.0, "peer timestamp deviates beyond time_delta");
            }
        }
    }

    pub async fn list(&mut self, addrs: &[IpAddr]) -> HashMap<IpAddr, Result<Vec<ImageLine>, ClientError>> {
        let results = self.command(addrs, Verb::List, ResponseShape::Images).await;
        results.into_iter().map(|(addr, r)| (addr, r.and_then(|f| extract_images(addr, f)))).collect()
    }

    pub async fn resolution(
        &mut self,
        addrs: &[IpAddr],
        width: u32,
        height: u32,
    ) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Resolution { width, height }).await
    }

    pub async fn framerate(
        &mut self,
        addrs: &[IpAddr],
        rate: crate::codec::Fraction,
    ) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Framerate { rate }).await
    }

    pub async fn awb(
        &mut self,
        addrs: &[IpAddr],
        mode: impl Into<String>,
        gains: Option<(f64, f64)>,
    ) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Awb { mode: mode.into(), gains }).await
    }

    pub async fn exposure(
        &mut self,
        addrs: &[IpAddr],
        mode: impl Into<String>,
        speed_ms: Option<u32>,
    ) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Exposure { mode: mode.into(), speed_ms }).await
    }

    pub async fn iso(&mut self, addrs: &[IpAddr], value: u32) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Iso { value }).await
    }

    pub async fn metering(
        &mut self,
        addrs: &[IpAddr],
        mode: impl Into<String>,
    ) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Metering { mode: mode.into() }).await
    }

    pub async fn levels(
        &mut self,
        addrs: &[IpAddr],
        brightness: i32,
        contrast: i32,
        saturation: i32,
        exposure_compensation: i32,
    ) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Levels { brightness, contrast, saturation, exposure_compensation }).await
    }

    pub async fn flip(
        &mut self,
        addrs: &[IpAddr],
        horizontal: bool,
        vertical: bool,
    ) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Flip { horizontal, vertical }).await
    }

    pub async fn agc(&mut self, addrs: &[IpAddr], mode: impl Into<String>) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Agc { mode: mode.into() }).await
    }

    pub async fn denoise(&mut self, addrs: &[IpAddr], enabled: bool) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Denoise { enabled }).await
    }

    pub async fn quality(&mut self, addrs: &[IpAddr], value: i32) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Quality { value }).await
    }

    pub async fn blink(&mut self, addrs: &[IpAddr]) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Blink).await
    }

    pub async fn clear(&mut self, addrs: &[IpAddr]) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Clear).await
    }

    pub async fn capture(
        &mut self,
        addrs: &[IpAddr],
        count: u32,
        video_port: u16,
        sync: Option<f64>,
    ) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Capture { count, video_port, sync }).await
    }

    /// Issues SEND for `index` to every address, each told to push its
    /// image to `port` on this host. Returns only the ack/error outcome;
    /// actually receiving the bytes is [`super::download`]'s job.
    pub async fn send(
        &mut self,
        addrs: &[IpAddr],
        index: usize,
        port: u16,
    ) -> HashMap<IpAddr, Result<(), ClientError>> {
        self.ack_command(addrs, Verb::Send { index, port }).await
    }

    async fn ack_command(&mut self, addrs: &[IpAddr], verb: Verb) -> HashMap<IpAddr, Result<(), ClientError>> {
        let results = self.command(addrs, verb, ResponseShape::Empty).await;
        results.into_iter().map(|(addr, r)| (addr, r.and_then(|f| extract_empty(addr, f)))).collect()
    }

    pub(crate) fn udp(&self) -> &UdpTransport {
        &self.udp
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn extract_empty(addr: IpAddr, frame: ResponseFrame) -> Result<(), ClientError> {
    match frame.outcome {
        ResponseOutcome::Ok(OkPayload::Empty) => Ok(()),
        ResponseOutcome::Error(message) => Err(ClientError::Remote { addr, message }),
        _ => Err(ClientError::Decode {
            addr,
            source: crate::error::CodecError::BadData("unexpected response shape".to_owned()),
        }),
    }
}

fn extract_status(addr: IpAddr, frame: ResponseFrame) -> Result<StatusReport, ClientError> {
    match frame.outcome {
        ResponseOutcome::Ok(OkPayload::Status(status)) => Ok(status),
        ResponseOutcome::Error(message) => Err(ClientError::Remote { addr, message }),
        _ => Err(ClientError::Decode {
            addr,
            source: crate::error::CodecError::BadData("unexpected response shape".to_owned()),
        }),
    }
}

fn extract_images(addr: IpAddr, frame: ResponseFrame) -> Result<Vec<ImageLine>, ClientError> {
    match frame.outcome {
        ResponseOutcome::Ok(OkPayload::Images(images)) => Ok(images),
        ResponseOutcome::Error(message) => Err(ClientError::Remote { addr, message }),
        _ => Err(ClientError::Decode {
            addr,
            source: crate::error::CodecError::BadData("unexpected response shape".to_owned()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{AwbMode, ExposureMode, MeteringMode, Resolution};
    use std::net::Ipv4Addr;

    async fn test_coordinator() -> Coordinator {
        let udp = UdpTransport::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0)).await.unwrap();
        Coordinator::new(udp, crate::DEFAULT_PORT, Duration::from_secs(1))
    }

    fn status_at(ts: f64) -> StatusReport {
        StatusReport {
            resolution: Resolution { width: 1920, height: 1080 },
            framerate: crate::codec::Fraction::whole(30),
            awb_mode: AwbMode::Auto,
            awb_red: 0.0,
            awb_blue: 0.0,
            exposure_mode: ExposureMode::Auto,
            exposure_speed_ms: 0,
            exposure_compensation: 0,
            iso: 0,
            metering_mode: MeteringMode::Average,
            brightness: 50,
            contrast: 0,
            saturation: 0,
            hflip: false,
            vflip: false,
            timestamp: ts,
            images: 0,
        }
    }

    #[tokio::test]
    async fn discrepancy_flagging_leaves_results_untouched() {
        let coordinator = test_coordinator().await;
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        let mut divergent = status_at(1000.5);
        divergent.resolution = Resolution { width: 640, height: 480 };

        let mut results = HashMap::new();
        results.insert(a, Ok(status_at(1000.0)));
        results.insert(b, Ok(divergent));

        coordinator.flag_status_discrepancies(&results);

        assert_eq!(results.len(), 2);
        assert!(results.get(&a).unwrap().is_ok());
        assert!(results.get(&b).unwrap().is_ok());
    }

    #[tokio::test]
    async fn servers_are_ordered_by_discovery_ordinal() {
        let mut coordinator = test_coordinator().await;
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        coordinator.peers.insert(a, Peer::new(a, 0, 1.0, Some(1)));
        coordinator.peers.insert(b, Peer::new(b, 0, 1.0, Some(0)));

        assert_eq!(coordinator.servers(), vec![b, a]);
        assert_eq!(coordinator.nth_server(0), Some(b));
        assert_eq!(coordinator.nth_server(1), Some(a));
    }
}
