//! The image download pipeline: bind a short-lived TCP listener, tell a
//! server to SEND to it, read the transferred bytes to EOF, and CLEAR that
//! peer's store once its own transfer has landed successfully.

use super::coordinator::Coordinator;
use crate::error::ClientError;
use crate::transport::ImageListener;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Downloads image `index` from a single server.
pub async fn download(coordinator: &mut Coordinator, addr: IpAddr, index: usize) -> Result<Vec<u8>, ClientError> {
    let bind_ip = coordinator.udp().local_addr().map_err(ClientError::Transport)?.ip();
    let listener = ImageListener::bind(SocketAddr::new(bind_ip, 0)).await.map_err(ClientError::Transport)?;
    let local_port = listener.local_addr().map_err(ClientError::Transport)?.port();

    let mut send_result = coordinator.send(&[addr], index, local_port).await;
    send_result.remove(&addr).unwrap_or(Err(ClientError::UnknownPeer(addr)))?;

    let (bytes, from) = listener.accept_and_read().await.map_err(ClientError::Transport)?;
    if from.ip() != addr {
        return Err(ClientError::DownloadVerification(format!(
            "image arrived from {} but was requested from {addr}",
            from.ip()
        )));
    }
    Ok(bytes)
}

/// Downloads image `index` from every address in `addrs`, one at a time (to
/// avoid network contention), and issues CLEAR to each peer immediately
/// after its own transfer succeeds. A failed peer's store is left untouched;
/// other peers still get downloaded and cleared independently.
pub async fn download_all(
    coordinator: &mut Coordinator,
    addrs: &[IpAddr],
    index: usize,
) -> HashMap<IpAddr, Result<Vec<u8>, ClientError>> {
    let mut results = HashMap::new();
    for &addr in addrs {
        let result = download(coordinator, addr, index).await;
        if result.is_ok() {
            let clear_results = coordinator.clear(&[addr]).await;
            if let Some(Err(e)) = clear_results.get(&addr) {
                tracing::warn!(%addr, error = %e, "CLEAR after successful download failed");
            }
        }
        results.insert(addr, result);
    }
    results
}
