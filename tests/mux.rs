//! Exercises the physical multiplexer end to end over an in-process
//! `tokio::io::duplex` bearer: two independent protocol channels sharing
//! one connection must not see each other's segments.

use std::time::Duration;

use bytes::Bytes;
use ouroboros_miniprotocols::{error::MuxError, mux::Muxer, traits::Role};
use tokio::io::duplex;

#[tokio::test]
async fn two_protocols_share_one_bearer_without_crosstalk() {
    let (client_bearer, server_bearer) = duplex(8192);
    let client_mux = Muxer::new(client_bearer);
    let server_mux = Muxer::new(server_bearer);

    let (mut client_a_reader, client_a_writer) = client_mux.open(3, Role::Client).unwrap();
    let (mut client_b_reader, client_b_writer) = client_mux.open(4, Role::Client).unwrap();
    let (mut server_a_reader, _server_a_writer) = server_mux.open(3, Role::Server).unwrap();
    let (mut server_b_reader, _server_b_writer) = server_mux.open(4, Role::Server).unwrap();

    client_a_writer.send(Bytes::from_static(b"a-payload")).unwrap();
    client_b_writer.send(Bytes::from_static(b"b-payload")).unwrap();

    assert_eq!(&server_a_reader.recv().await.unwrap()[..], b"a-payload");
    assert_eq!(&server_b_reader.recv().await.unwrap()[..], b"b-payload");

    // Nothing crossed into the other protocol's channel.
    assert!(tokio::time::timeout(Duration::from_millis(50), client_a_reader.recv())
        .await
        .is_err());
    assert!(tokio::time::timeout(Duration::from_millis(50), client_b_reader.recv())
        .await
        .is_err());
}

#[tokio::test]
async fn a_large_payload_survives_chunking_to_u16_max() {
    let (client_bearer, server_bearer) = duplex(1 << 20);
    let client_mux = Muxer::new(client_bearer);
    let server_mux = Muxer::new(server_bearer);

    let (_client_reader, client_writer) = client_mux.open(3, Role::Client).unwrap();
    let (mut server_reader, _server_writer) = server_mux.open(3, Role::Server).unwrap();

    let payload = Bytes::from(vec![0xab; 200_000]);
    client_writer.send(payload.clone()).unwrap();

    let mut received = Vec::new();
    while received.len() < payload.len() {
        let chunk = server_reader.recv().await.unwrap();
        assert!(chunk.len() <= u16::MAX as usize);
        received.extend_from_slice(&chunk);
    }
    assert_eq!(received, payload);
}

#[tokio::test]
async fn unknown_protocol_id_closes_the_bearer_with_an_error() {
    let (client_bearer, server_bearer) = duplex(4096);
    let client_mux = Muxer::new(client_bearer);
    let server_mux = Muxer::new(server_bearer);

    // The client opens a channel for protocol 99, but the server never
    // does, so its reader task has no route for inbound segments tagged
    // with it.
    let (_client_reader, client_writer) = client_mux.open(99, Role::Client).unwrap();
    client_writer.send(Bytes::from_static(b"lost")).unwrap();

    let err = server_mux.wait().await.unwrap_err();
    assert!(matches!(err, MuxError::UnknownProtocol(99)));
}

#[tokio::test]
async fn opening_the_same_protocol_role_pair_twice_is_rejected() {
    let (bearer, _other) = duplex(4096);
    let muxer = Muxer::new(bearer);
    let _first = muxer.open(7, Role::Client).unwrap();
    let second = muxer.open(7, Role::Client);
    assert!(matches!(
        second,
        Err(MuxError::AlreadyOpen { protocol_id: 7, .. })
    ));
}
