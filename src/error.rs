//! Crate-local error types.
//!
//! Mirrors the upstream timing system's approach of one `thiserror` enum per
//! concern rather than a single catch-all error.

use std::net::IpAddr;

/// A malformed frame or unrecognised verb at the wire level.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("empty frame")]
    EmptyFrame,
    #[error("missing or non-positive sequence number: {0:?}")]
    BadSequence(String),
    #[error("unrecognised verb: {0}")]
    UnknownVerb(String),
    #[error("missing newline before data section")]
    MissingDataSeparator,
    #[error("malformed numeric literal: {0}")]
    BadNumber(String),
    #[error("malformed status/list data: {0}")]
    BadData(String),
    #[error("malformed address syntax: {0}")]
    BadAddress(String),
}

/// An out-of-range or otherwise invalid command argument.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ArgumentError {
    #[error("framerate {0}/{1} out of range (must be 1-90)")]
    Framerate(u32, u32),
    #[error("awb gain out of range [0.0, 8.0]: {0}")]
    AwbGain(f64),
    #[error("unrecognised awb mode: {0}")]
    AwbMode(String),
    #[error("unrecognised exposure mode: {0}")]
    ExposureMode(String),
    #[error("exposure speed {speed}ms exceeds 1000/framerate ({limit}ms)")]
    ExposureSpeed { speed: u32, limit: u32 },
    #[error("iso {0} out of range (0, or 1-1600)")]
    Iso(u32),
    #[error("unrecognised metering mode: {0}")]
    MeteringMode(String),
    #[error("brightness {0} out of range (0-100)")]
    Brightness(i32),
    #[error("contrast {0} out of range (-100-100)")]
    Contrast(i32),
    #[error("saturation {0} out of range (-100-100)")]
    Saturation(i32),
    #[error("exposure compensation {0} out of range (-24-24)")]
    ExposureCompensation(i32),
    #[error("quality {0} out of range (0-100)")]
    Quality(i32),
    #[error("image index {index} out of bounds (store has {len} images)")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("scheduled capture time {requested} is not in the future (now={now})")]
    CaptureNotInFuture { requested: f64, now: f64 },
    #[error("malformed argument list: {0}")]
    Malformed(String),
}

/// UDP/TCP transport failures. These always wrap an underlying `io::Error`.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("UDP send to {addr} failed: {source}")]
    UdpSend {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("UDP receive failed: {0}")]
    UdpRecv(#[source] std::io::Error),
    #[error("UDP bind to {addr} failed: {source}")]
    UdpBind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to set UDP socket option: {0}")]
    UdpSocketOption(#[source] std::io::Error),
    #[error("TCP connect to {addr} failed: {source}")]
    TcpConnect {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("TCP accept failed: {0}")]
    TcpAccept(#[source] std::io::Error),
    #[error("TCP bind to {addr} failed: {source}")]
    TcpBind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("TCP I/O failed: {0}")]
    TcpIo(#[source] std::io::Error),
}

/// Camera driver failures surfaced by the `Camera` trait.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("camera configure failed: {0}")]
    Configure(String),
    #[error("camera capture failed: {0}")]
    Capture(String),
    #[error("camera blink failed: {0}")]
    Blink(String),
}

/// Top-level error returned by a single client-coordinator operation against
/// one peer. Multi-peer operations aggregate these into a per-address map
/// rather than bubbling the first failure up.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("decode error from {addr}: {source}")]
    Decode {
        addr: IpAddr,
        #[source]
        source: CodecError,
    },
    #[error("server {addr} reported an error: {0}", addr = addr)]
    Remote { addr: IpAddr, message: String },
    #[error("server {0} did not respond within the deadline")]
    Timeout(IpAddr),
    #[error("server {addr} reported protocol version {got}, expected {expected}")]
    VersionMismatch {
        addr: IpAddr,
        expected: &'static str,
        got: String,
    },
    #[error("unknown peer: {0}")]
    UnknownPeer(IpAddr),
    #[error("download verification failed: {0}")]
    DownloadVerification(String),
}

/// Top-level error returned by the server's command dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Argument(#[from] ArgumentError),
    #[error(transparent)]
    Camera(#[from] CameraError),
}
