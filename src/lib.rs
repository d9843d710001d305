//! Network coordination core for the Compound Pi camera fleet.
//!
//! This crate implements the UDP request/response protocol, the client-side
//! fleet coordinator, the server-side protocol handler, and the
//! capture/download pipeline. It does not provide a shell, a GUI, config-file
//! loading, or a concrete camera driver — those are external collaborators
//! that depend on this crate, not the other way around.

pub mod camera;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod server;
pub mod transport;

pub use camera::{Camera, CameraSettings};
pub use client::Coordinator;
pub use config::Config;
pub use error::{ArgumentError, CameraError, ClientError, CodecError, ServerError, TransportError};
pub use server::Dispatcher;

/// Default UDP port the protocol listens on.
pub const DEFAULT_PORT: u16 = 5647;

/// Protocol version this build of the core speaks. HELLO responses must
/// match this exactly; there is no semver negotiation (see design notes).
pub const PROTOCOL_VERSION: &str = "0.4";

/// Overall deadline for a multi-peer client operation, and the server-side
/// cap on how long a response is retried before being abandoned.
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Lower/upper bounds of the randomised retransmit delay used by both the
/// client's request retries and the server's response retries.
pub const RETRY_DELAY_MIN: std::time::Duration = std::time::Duration::from_millis(100);
pub const RETRY_DELAY_MAX: std::time::Duration = std::time::Duration::from_millis(400);
