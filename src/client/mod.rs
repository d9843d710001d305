//! Client-side fleet coordination: discovery, per-peer session tracking,
//! the request retry engine, and the image download pipeline.

pub mod coordinator;
pub mod download;
pub mod peer;
pub mod retry;

pub use coordinator::Coordinator;
pub use download::{download, download_all};
pub use peer::Peer;
