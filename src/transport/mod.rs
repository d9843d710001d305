//! Transport layer: the UDP command/response socket and the TCP image
//! side-channel.

pub mod tcp;
pub mod udp;

pub use tcp::{send_image, ImageListener};
pub use udp::{broadcast_address, UdpTransport};
