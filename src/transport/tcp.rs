//! TCP side-channel for image transfers.
//!
//! The client binds a short-lived listener and accepts one inbound
//! connection per download; the server is always the active opener,
//! connecting out to the client's declared address and port.

use crate::error::TransportError;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A short-lived TCP listener bound by the client to receive one image
/// transfer.
pub struct ImageListener {
    listener: TcpListener,
}

impl ImageListener {
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::TcpBind { addr, source })?;
        Ok(ImageListener { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::TcpIo)
    }

    /// Accepts exactly one connection and reads it to EOF. Returns the
    /// bytes read and the address the connection came from, so the caller
    /// can verify it matches the peer that was asked to SEND.
    pub async fn accept_and_read(&self) -> Result<(Vec<u8>, SocketAddr), TransportError> {
        let (mut stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::TcpAccept)?;
        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .await
            .map_err(TransportError::TcpIo)?;
        Ok((buf, peer_addr))
    }
}

/// Connects to `addr` and streams `bytes`, then closes. Used by the server
/// when processing SEND.
pub async fn send_image(addr: SocketAddr, bytes: &[u8]) -> Result<(), TransportError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::TcpConnect { addr, source })?;
    stream.write_all(bytes).await.map_err(TransportError::TcpIo)?;
    stream.shutdown().await.map_err(TransportError::TcpIo)?;
    Ok(())
}
