//! End-to-end BlockFetch scenarios over an in-process duplex bearer: a
//! client requests a range, the server streams blocks back or reports it
//! has none, and a client-initiated `Done` lets the server restart to
//! serve a second session on the same connection.

use std::sync::Arc;

use ouroboros_miniprotocols::{
    mux::Muxer,
    protocol::node_to_node::{BlockEvent, BlockFetchClient, BlockFetchServer},
    traits::Role,
    Point,
};
use tokio::{io::duplex, sync::mpsc};

fn point(slot: u64) -> Point {
    Point::Block { slot, hash: [0; 32] }
}

#[tokio::test]
async fn server_streams_requested_blocks_to_the_client() {
    let (client_bearer, server_bearer) = duplex(1 << 16);
    let client_mux = Muxer::new(client_bearer);
    let server_mux = Muxer::new(server_bearer);

    let (client_reader, client_writer) = client_mux.open(3, Role::Client).unwrap();
    let (server_reader, server_writer) = server_mux.open(3, Role::Server).unwrap();

    let (error_tx, _error_rx) = mpsc::unbounded_channel();
    let (client, _join) = BlockFetchClient::spawn(
        "client".into(),
        client_reader,
        client_writer,
        error_tx.clone(),
    );

    let request_range_func = Arc::new(|_start: Point, _end: Point, handle| {
        Box::pin(async move {
            use ouroboros_miniprotocols::runtime::Handle;
            let handle: Handle<ouroboros_miniprotocols::protocol::node_to_node::block_fetch::BlockFetch> = handle;
            handle
                .send_message(
                    ouroboros_miniprotocols::protocol::node_to_node::block_fetch::message::Message::StartBatch,
                )
                .ok();
            for i in 0..3u64 {
                handle
                    .send_message(
                        ouroboros_miniprotocols::protocol::node_to_node::block_fetch::message::Message::Block {
                            block_type: 6,
                            raw_block: vec![i as u8; 4],
                        },
                    )
                    .ok();
            }
            handle
                .send_message(
                    ouroboros_miniprotocols::protocol::node_to_node::block_fetch::message::Message::BatchDone,
                )
                .ok();
            Ok(())
        }) as ouroboros_miniprotocols::runtime::HandlerFuture
    });

    let (_server, _supervisor) = BlockFetchServer::spawn(
        "server".into(),
        server_reader,
        server_writer,
        error_tx,
        Some(request_range_func),
    );

    let mut events = client.request_range(point(1), point(10)).unwrap();
    let mut blocks = Vec::new();
    while let Some(event) = events.recv().await {
        let BlockEvent::Block { raw_block, .. } = event;
        blocks.push(raw_block);
    }
    assert_eq!(blocks, vec![vec![0; 4], vec![1; 4], vec![2; 4]]);
}

#[tokio::test]
async fn empty_range_yields_no_blocks() {
    let (client_bearer, server_bearer) = duplex(1 << 16);
    let client_mux = Muxer::new(client_bearer);
    let server_mux = Muxer::new(server_bearer);

    let (client_reader, client_writer) = client_mux.open(3, Role::Client).unwrap();
    let (server_reader, server_writer) = server_mux.open(3, Role::Server).unwrap();

    let (error_tx, _error_rx) = mpsc::unbounded_channel();
    let (client, _join) =
        BlockFetchClient::spawn("client".into(), client_reader, client_writer, error_tx.clone());

    let request_range_func = Arc::new(|_start: Point, _end: Point, handle| {
        Box::pin(async move {
            use ouroboros_miniprotocols::runtime::Handle;
            let handle: Handle<ouroboros_miniprotocols::protocol::node_to_node::block_fetch::BlockFetch> = handle;
            handle
                .send_message(ouroboros_miniprotocols::protocol::node_to_node::block_fetch::message::Message::NoBlocks)
                .ok();
            Ok(())
        }) as ouroboros_miniprotocols::runtime::HandlerFuture
    });

    let (_server, _supervisor) = BlockFetchServer::spawn(
        "server".into(),
        server_reader,
        server_writer,
        error_tx,
        Some(request_range_func),
    );

    let mut events = client.request_range(point(100), point(100)).unwrap();
    assert!(events.recv().await.is_none());
}

#[tokio::test]
async fn client_done_lets_the_server_restart_for_a_second_session() {
    let (client_bearer, server_bearer) = duplex(1 << 16);
    let client_mux = Muxer::new(client_bearer);
    let server_mux = Muxer::new(server_bearer);

    let (client_reader, client_writer) = client_mux.open(3, Role::Client).unwrap();
    let (server_reader, server_writer) = server_mux.open(3, Role::Server).unwrap();

    let (error_tx, _error_rx) = mpsc::unbounded_channel();
    let (client, join) =
        BlockFetchClient::spawn("client".into(), client_reader, client_writer, error_tx.clone());

    let request_range_func = Arc::new(|_start: Point, _end: Point, handle| {
        Box::pin(async move {
            use ouroboros_miniprotocols::runtime::Handle;
            let handle: Handle<ouroboros_miniprotocols::protocol::node_to_node::block_fetch::BlockFetch> = handle;
            handle
                .send_message(ouroboros_miniprotocols::protocol::node_to_node::block_fetch::message::Message::NoBlocks)
                .ok();
            Ok(())
        }) as ouroboros_miniprotocols::runtime::HandlerFuture
    });

    let (_server, _supervisor) = BlockFetchServer::spawn(
        "server".into(),
        server_reader,
        server_writer,
        error_tx,
        Some(request_range_func),
    );

    client.client_done().unwrap();

    // `ClientDone` is terminal on the client side too, so this instance's
    // own reader/writer tasks stop; reclaim their channel halves and spawn
    // a fresh instance over them, simulating a new client session on the
    // same connection while the server restarts underneath it.
    let outcome = join.await.unwrap();
    let (error_tx2, _error_rx2) = mpsc::unbounded_channel();
    let (client2, _join2) = BlockFetchClient::spawn(
        "client2".into(),
        outcome.frame_reader,
        outcome.frame_writer,
        error_tx2,
    );

    let mut events = client2.request_range(point(1), point(1)).unwrap();
    assert!(events.recv().await.is_none());
}
