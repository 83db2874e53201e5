//! The two tasks that make up the physical multiplexer: one drains outbound
//! segments queued by every open mini-protocol's [`super::FrameWriter`] and
//! frames them onto the bearer; the other reads framed segments off the
//! bearer and demultiplexes them into the registered [`super::FrameReader`]
//! channels.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use bytes::Bytes;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

use crate::{error::MuxError, traits::Role};

use super::header::Header;

pub(super) struct Segment {
    pub protocol_id: u16,
    pub sender: Role,
    pub payload: Bytes,
}

pub(super) type Routes = Arc<Mutex<HashMap<(u16, Role), mpsc::Sender<Bytes>>>>;

pub(super) async fn writer_task(
    mut writer: impl AsyncWrite + Unpin,
    mut rx: mpsc::UnboundedReceiver<Segment>,
) -> Result<(), MuxError> {
    let start = std::time::Instant::now();
    while let Some(segment) = rx.recv().await {
        // Empty payloads (e.g. a zero-length `Done` message) still need one
        // header on the wire.
        let chunks: Vec<&[u8]> = if segment.payload.is_empty() {
            vec![&[][..]]
        } else {
            segment.payload.chunks(u16::MAX as usize).collect()
        };
        for chunk in chunks {
            let header = Header {
                timestamp: start.elapsed().as_micros() as u32,
                protocol_id: segment.protocol_id,
                sender: segment.sender,
                payload_len: chunk.len() as u16,
            };
            writer.write_all(&header.to_bytes()).await?;
            writer.write_all(chunk).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}

pub(super) async fn reader_task(
    mut reader: impl AsyncRead + Unpin,
    routes: Routes,
) -> Result<(), MuxError> {
    loop {
        let mut header_buf = [0u8; 8];
        if let Err(e) = reader.read_exact(&mut header_buf).await {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                return Ok(());
            }
            return Err(e.into());
        }
        let header = Header::from_bytes(header_buf);
        let mut payload = vec![0u8; header.payload_len as usize];
        reader.read_exact(&mut payload).await?;

        let sender = {
            let routes = routes.lock().unwrap();
            routes.get(&(header.protocol_id, header.sender)).cloned()
        };
        match sender {
            // A full channel blocks this single reader task, which is
            // exactly the per-channel backpressure spec.md §4.2 asks for —
            // it also pauses delivery to every other mini-protocol until
            // the slow one drains, same as a real demuxer sharing one read
            // loop over the bearer.
            Some(sender) => {
                if sender.send(Bytes::from(payload)).await.is_err() {
                    // The protocol instance stopped reading; drop the segment.
                }
            }
            None => return Err(MuxError::UnknownProtocol(header.protocol_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[tokio::test]
    async fn demuxes_segments_to_the_registered_channel() {
        let (client_end, mut server_end) = duplex(256);
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = mpsc::channel(4);
        routes.lock().unwrap().insert((3, Role::Client), tx);

        let reader_handle = tokio::spawn(reader_task(client_end, routes));

        let header = Header {
            timestamp: 0,
            protocol_id: 3,
            sender: Role::Client,
            payload_len: 3,
        };
        server_end.write_all(&header.to_bytes()).await.unwrap();
        server_end.write_all(b"abc").await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(&received[..], b"abc");

        drop(server_end);
        reader_handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_protocol_id_is_an_error() {
        let (client_end, mut server_end) = duplex(256);
        let routes: Routes = Arc::new(Mutex::new(HashMap::new()));

        let reader_handle = tokio::spawn(reader_task(client_end, routes));

        let header = Header {
            timestamp: 0,
            protocol_id: 99,
            sender: Role::Client,
            payload_len: 0,
        };
        server_end.write_all(&header.to_bytes()).await.unwrap();

        let result = reader_handle.await.unwrap();
        assert!(matches!(result, Err(MuxError::UnknownProtocol(99))));
    }
}
