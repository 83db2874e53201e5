//! The client side of BlockFetch: ask for a range, receive blocks on a
//! channel until the batch completes.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::{
    error::ProtocolError,
    mux::{FrameReader, FrameWriter},
    runtime::{Config, Fatal, Handle, Handler, Instance, Outcome},
    traits::{Mode, Role},
    Point,
};

use super::{
    message::Message,
    BlockFetch,
};

/// One event delivered while streaming a requested range. The channel
/// closing with no further events signals either `NoBlocks` or `BatchDone`
/// — callers that care which can inspect `BlockFetchClient`'s last-seen
/// state via `handle().current_state()` immediately after the channel ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockEvent {
    Block { block_type: u64, raw_block: Vec<u8> },
}

const CHANNEL_CAPACITY: usize = 64;

/// A running BlockFetch client instance. One `request_range` at a time: the
/// `Idle` state's client agency naturally prevents a second `RequestRange`
/// before the first batch completes.
pub struct BlockFetchClient {
    handle: Handle<BlockFetch>,
    pending: Arc<Mutex<Option<mpsc::Sender<BlockEvent>>>>,
}

impl BlockFetchClient {
    /// Spawns a BlockFetch client instance over an already-open muxer
    /// channel pair.
    pub fn spawn(
        name: String,
        frame_reader: FrameReader,
        frame_writer: FrameWriter,
        error_sink: mpsc::UnboundedSender<Fatal>,
    ) -> (Self, tokio::task::JoinHandle<Outcome>) {
        let pending = Arc::new(Mutex::new(None));
        let handler = make_handler(pending.clone());
        let (handle, join) = Instance::spawn(Config {
            name,
            role: Role::Client,
            mode: Mode::NodeToNode,
            frame_reader,
            frame_writer,
            error_sink,
            handler,
        });
        (BlockFetchClient { handle, pending }, join)
    }

    /// Sends `RequestRange` and returns a channel that yields each `Block`
    /// in the batch, closing once the server sends `NoBlocks` or
    /// `BatchDone`.
    pub fn request_range(
        &self,
        start: Point,
        end: Point,
    ) -> Result<mpsc::Receiver<BlockEvent>, ProtocolError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        *self.pending.lock().unwrap() = Some(tx);
        self.handle
            .send_message(Message::RequestRange { start, end })?;
        Ok(rx)
    }

    pub fn client_done(&self) -> Result<(), ProtocolError> {
        self.handle.send_message(Message::ClientDone)
    }

    pub fn handle(&self) -> &Handle<BlockFetch> {
        &self.handle
    }
}

fn make_handler(pending: Arc<Mutex<Option<mpsc::Sender<BlockEvent>>>>) -> Handler<BlockFetch> {
    Arc::new(move |msg, _handle| {
        let pending = pending.clone();
        Box::pin(async move {
            match msg {
                Message::NoBlocks | Message::BatchDone => {
                    // Dropping the sender closes the channel for the caller
                    // currently awaiting `recv()`.
                    pending.lock().unwrap().take();
                }
                Message::Block {
                    block_type,
                    raw_block,
                } => {
                    let sender = pending.lock().unwrap().clone();
                    if let Some(sender) = sender {
                        let _ = sender.send(BlockEvent::Block { block_type, raw_block }).await;
                    }
                }
                // StartBatch only confirms the channel created at
                // `request_range` will start receiving blocks; nothing to do.
                Message::StartBatch => {}
                Message::RequestRange { .. } | Message::ClientDone => {
                    // Never sent by the server; unreachable given the state
                    // machine, but handlers must be total over `Message`.
                }
            }
            Ok(())
        })
    })
}
