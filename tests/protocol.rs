//! End-to-end protocol tests: a real `Dispatcher` and `Coordinator` talking
//! over loopback UDP/TCP sockets, with a `FakeCamera` standing in for
//! hardware. Exercises the scenarios from SPEC_FULL.md §8.

#![cfg(feature = "test-support")]

use compound_pi_core::camera::FakeCamera;
use compound_pi_core::client::{download, download_all};
use compound_pi_core::client::Coordinator;
use compound_pi_core::codec::{encode_command, CommandFrame, ResponseOutcome, ResponseShape, Verb};
use compound_pi_core::codec::response::decode_response;
use compound_pi_core::codec::Fraction;
use compound_pi_core::server::Dispatcher;
use compound_pi_core::transport::UdpTransport;
use compound_pi_core::ClientError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

/// Binds a dispatcher to an ephemeral loopback port and runs it in the
/// background for the lifetime of the test.
async fn spawn_server() -> SocketAddr {
    let udp = UdpTransport::bind(loopback(0)).await.unwrap();
    let addr = udp.local_addr().unwrap();
    let mut dispatcher =
        Dispatcher::new(udp, Box::new(FakeCamera::default()), Duration::from_secs(300), Duration::from_secs(2));
    tokio::spawn(async move {
        let _ = dispatcher.run().await;
    });
    addr
}

/// Builds a coordinator whose "well-known port" is the given server's
/// actual ephemeral port, as if it were the protocol's fixed UDP port.
async fn spawn_client(server_port: u16) -> Coordinator {
    let udp = UdpTransport::bind(loopback(0)).await.unwrap();
    Coordinator::new(udp, server_port, Duration::from_millis(800))
}

#[tokio::test]
async fn hello_then_status_round_trips() {
    let server_addr = spawn_server().await;
    let mut client = spawn_client(server_addr.port()).await;

    client.hello(server_addr.ip()).await.unwrap();

    let statuses = client.status(&[server_addr.ip()]).await;
    let status = statuses.get(&server_addr.ip()).unwrap().as_ref().unwrap();
    assert_eq!(status.resolution.width, 1920);
    assert_eq!(status.images, 0);
}

#[tokio::test]
async fn command_against_unknown_peer_is_rejected_locally() {
    let mut client = spawn_client(9999).await;
    let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));

    let results = client.status(&[addr]).await;
    assert!(matches!(results.get(&addr), Some(Err(ClientError::UnknownPeer(_)))));
}

#[tokio::test]
async fn out_of_range_framerate_is_rejected_with_a_remote_error() {
    let server_addr = spawn_server().await;
    let mut client = spawn_client(server_addr.port()).await;
    client.hello(server_addr.ip()).await.unwrap();

    let results = client.framerate(&[server_addr.ip()], Fraction::whole(200)).await;
    assert!(matches!(results.get(&server_addr.ip()), Some(Err(ClientError::Remote { .. }))));
}

#[tokio::test]
async fn capture_list_and_download_pipeline() {
    let server_addr = spawn_server().await;
    let mut client = spawn_client(server_addr.port()).await;
    let addr = server_addr.ip();
    client.hello(addr).await.unwrap();

    let capture_results = client.capture(&[addr], 2, 0, None).await;
    capture_results.get(&addr).unwrap().as_ref().unwrap();

    let lists = client.list(&[addr]).await;
    let images = lists.get(&addr).unwrap().as_ref().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].index, 0);
    assert_eq!(images[1].index, 1);

    let bytes = download::download(&mut client, addr, 0).await.unwrap();
    assert_eq!(bytes.len(), 64);

    let lists_after = client.list(&[addr]).await;
    let images_after = lists_after.get(&addr).unwrap().as_ref().unwrap();
    assert_eq!(images_after.len(), 2, "a single download must not clear the store");
}

#[tokio::test]
async fn download_all_clears_each_peer_after_its_own_success() {
    let server_addr = spawn_server().await;
    let mut client = spawn_client(server_addr.port()).await;
    let addr = server_addr.ip();
    client.hello(addr).await.unwrap();
    client.capture(&[addr], 1, 0, None).await;

    let results = download_all(&mut client, &[addr], 0).await;
    assert!(results.get(&addr).unwrap().is_ok());

    let lists_after = client.list(&[addr]).await;
    let images_after = lists_after.get(&addr).unwrap().as_ref().unwrap();
    assert!(images_after.is_empty(), "a successful per-peer download must CLEAR that peer's store");
}

#[tokio::test]
async fn capture_with_past_sync_time_is_rejected() {
    let server_addr = spawn_server().await;
    let mut client = spawn_client(server_addr.port()).await;
    let addr = server_addr.ip();
    client.hello(addr).await.unwrap();

    let results = client.capture(&[addr], 1, 0, Some(1.0)).await;
    assert!(matches!(results.get(&addr), Some(Err(ClientError::Remote { .. }))));
}

#[tokio::test]
async fn discovery_finds_a_unicast_hello_peer() {
    let server_addr = spawn_server().await;
    let mut client = spawn_client(server_addr.port()).await;

    // Loopback doesn't carry broadcast traffic in a typical sandbox, so
    // this test exercises the unicast HELLO path discovery also uses
    // under the hood rather than a real subnet broadcast.
    client.hello(server_addr.ip()).await.unwrap();
    assert_eq!(client.servers(), vec![server_addr.ip()]);
    assert_eq!(client.nth_server(0), Some(server_addr.ip()));
}

#[tokio::test]
async fn status_reports_partial_failure_without_losing_the_working_peers() {
    let server_addr = spawn_server().await;
    let mut client = spawn_client(server_addr.port()).await;
    client.hello(server_addr.ip()).await.unwrap();

    let unplugged = IpAddr::V4(Ipv4Addr::new(10, 255, 0, 1));
    let results = client.status(&[server_addr.ip(), unplugged]).await;

    assert!(results.get(&server_addr.ip()).unwrap().is_ok());
    assert!(results.get(&unplugged).unwrap().is_err());
}

#[tokio::test]
async fn stale_hello_is_rejected_with_an_error_over_the_wire() {
    let server_addr = spawn_server().await;
    let udp = UdpTransport::bind(loopback(0)).await.unwrap();

    let first = CommandFrame { seq: 1, verb: Verb::Hello { timestamp: 2000.0 } };
    udp.send_to(encode_command(&first).as_bytes(), server_addr).await.unwrap();
    let (bytes, _) = udp.recv().await.unwrap();
    let ok = decode_response(std::str::from_utf8(&bytes).unwrap(), ResponseShape::Version).unwrap();
    assert!(matches!(ok.outcome, ResponseOutcome::Ok(_)));

    let stale = CommandFrame { seq: 2, verb: Verb::Hello { timestamp: 1500.0 } };
    udp.send_to(encode_command(&stale).as_bytes(), server_addr).await.unwrap();
    let (bytes, _) = udp.recv().await.unwrap();
    let rejected = decode_response(std::str::from_utf8(&bytes).unwrap(), ResponseShape::Version).unwrap();
    assert!(
        matches!(rejected.outcome, ResponseOutcome::Error(ref msg) if msg == "stale hello"),
        "stale HELLO must be rejected with an ERROR, not answered OK"
    );
}
