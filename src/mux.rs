//! The physical multiplexer: one shared bearer carrying every open
//! mini-protocol's byte stream, each identified on the wire by
//! `(protocol_id, sender role)` and framed with the 8-byte [`header::Header`]
//! (spec.md §4.2).
//!
//! A single reader task demultiplexes inbound segments into per-channel
//! queues; a single writer task drains every open [`FrameWriter`] and frames
//! its segments onto the bearer, chunked to at most `u16::MAX` bytes so no
//! one mini-protocol can monopolize the shared writer.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
    task::JoinHandle,
};

use crate::{error::MuxError, traits::Role};

mod header;
mod task;

use task::Segment;

/// Inbound channels buffer at most this many segments before the physical
/// reader task blocks, pausing delivery to every other open protocol too.
const CHANNEL_CAPACITY: usize = 64;

/// Owns the physical reader and writer tasks for one bearer.
///
/// `Muxer::open` is idempotent per `(protocol_id, role)` pair: opening the
/// same pair twice returns [`MuxError::AlreadyOpen`] rather than silently
/// replacing the channel a mini-protocol runtime instance already bound to.
pub struct Muxer {
    routes: task::Routes,
    outbound_tx: mpsc::UnboundedSender<Segment>,
    reader_handle: JoinHandle<Result<(), MuxError>>,
    writer_handle: JoinHandle<Result<(), MuxError>>,
}

impl Muxer {
    /// Spawns the reader and writer tasks over `bearer` and returns a handle
    /// used to open mini-protocol channels on it.
    pub fn new(bearer: impl AsyncRead + AsyncWrite + Send + 'static) -> Self {
        let (read_half, write_half) = tokio::io::split(bearer);
        let routes: task::Routes = Arc::new(Mutex::new(HashMap::new()));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let reader_handle = tokio::spawn(task::reader_task(read_half, routes.clone()));
        let writer_handle = tokio::spawn(task::writer_task(write_half, outbound_rx));

        Muxer {
            routes,
            outbound_tx,
            reader_handle,
            writer_handle,
        }
    }

    /// Opens a mini-protocol's channel through the muxer for the given local
    /// `role`. Inbound segments are matched against `role.other()`, since the
    /// wire header tags whoever *sent* the segment — always the peer.
    pub fn open(&self, protocol_id: u16, role: Role) -> Result<(FrameReader, FrameWriter), MuxError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut routes = self.routes.lock().unwrap();
        let key = (protocol_id, role.other());
        if routes.contains_key(&key) {
            return Err(MuxError::AlreadyOpen {
                protocol_id,
                server: role == Role::Server,
            });
        }
        routes.insert(key, tx);
        drop(routes);

        Ok((
            FrameReader { rx },
            FrameWriter {
                tx: self.outbound_tx.clone(),
                protocol_id,
                role,
            },
        ))
    }

    /// Waits for whichever of the reader or writer task exits first,
    /// surfacing the error that ended the connection. A clean bearer close
    /// surfaces as `Ok(())`.
    pub async fn wait(self) -> Result<(), MuxError> {
        tokio::select! {
            result = self.reader_handle => result.expect("mux reader task panicked"),
            result = self.writer_handle => result.expect("mux writer task panicked"),
        }
    }

    /// Tears the muxer down: aborts the reader and writer tasks outright
    /// (spec.md §4.5). Dropping a `Muxer` does not do this on its own —
    /// `reader_handle`/`writer_handle` are detached `tokio::spawn` tasks that
    /// keep running against the bearer after their `JoinHandle` is dropped —
    /// so callers that need the bearer released on teardown must call this
    /// explicitly rather than letting the struct go out of scope.
    pub fn close(self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

/// The read half of a mini-protocol's channel through the muxer: one
/// complete segment payload per [`FrameReader::recv`].
pub struct FrameReader {
    rx: mpsc::Receiver<Bytes>,
}

impl FrameReader {
    /// Waits for the next inbound segment. Returns `None` once the muxer has
    /// shut down and no more segments for this channel will arrive.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// The write half of a mini-protocol's channel through the muxer.
///
/// Queuing a segment never blocks the caller: the shared writer task applies
/// backpressure only where it meets the bearer itself.
#[derive(Clone)]
pub struct FrameWriter {
    tx: mpsc::UnboundedSender<Segment>,
    protocol_id: u16,
    role: Role,
}

impl FrameWriter {
    pub fn send(&self, payload: Bytes) -> Result<(), MuxError> {
        self.tx
            .send(Segment {
                protocol_id: self.protocol_id,
                sender: self.role,
                payload,
            })
            .map_err(|_| MuxError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn two_muxers_exchange_frames_on_distinct_protocols() {
        let (client_bearer, server_bearer) = duplex(4096);
        let client_mux = Muxer::new(client_bearer);
        let server_mux = Muxer::new(server_bearer);

        let (mut client_reader, client_writer) = client_mux.open(4, Role::Client).unwrap();
        let (mut server_reader, server_writer) = server_mux.open(4, Role::Server).unwrap();

        client_writer.send(Bytes::from_static(b"hello")).unwrap();
        let received = server_reader.recv().await.unwrap();
        assert_eq!(&received[..], b"hello");

        server_writer.send(Bytes::from_static(b"world")).unwrap();
        let received = client_reader.recv().await.unwrap();
        assert_eq!(&received[..], b"world");
    }

    #[tokio::test]
    async fn opening_the_same_protocol_role_pair_twice_is_rejected() {
        let (bearer, _other) = tokio::io::duplex(16);
        let muxer = Muxer::new(bearer);
        let _first = muxer.open(7, Role::Client).unwrap();
        let second = muxer.open(7, Role::Client);
        assert!(matches!(second, Err(MuxError::AlreadyOpen { protocol_id: 7, .. })));
    }
}
