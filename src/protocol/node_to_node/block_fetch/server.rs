//! The server side of BlockFetch. Answers `RequestRange` through a
//! user-supplied callback and restarts the protocol instance after
//! `ClientDone`, matching `handleClientDone` in the Go original
//! (`original_source/protocol/blockfetch/server.go`): `Stop` then re-`init`
//! and `Start`, so a fresh client session can begin on the same connection.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::{
    error::ProtocolError,
    mux::{FrameReader, FrameWriter},
    runtime::{missing_callback_error, Config, Fatal, Handle, Handler, HandlerFuture, Instance},
    traits::{MiniProtocol, Mode, Role},
    Point,
};

use super::{
    message::Message,
    state::State,
    BlockFetch,
};

/// Invoked on every `RequestRange`; the callback drives the reply itself via
/// `handle.send_message` (one or more of `no_blocks`/`start_batch`/`block`/
/// `batch_done` as appropriate) before its future resolves.
pub type RequestRangeFn =
    Arc<dyn Fn(Point, Point, Handle<BlockFetch>) -> HandlerFuture + Send + Sync>;

pub struct BlockFetchServer {
    current: Arc<Mutex<Handle<BlockFetch>>>,
}

impl BlockFetchServer {
    /// Spawns the server instance and a supervising task that restarts it
    /// after every `ClientDone`.
    pub fn spawn(
        name: String,
        frame_reader: FrameReader,
        frame_writer: FrameWriter,
        error_sink: mpsc::UnboundedSender<Fatal>,
        request_range_func: Option<RequestRangeFn>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let handler = make_handler(request_range_func, error_sink.clone());
        let (handle, join) = Instance::spawn(Config {
            name: name.clone(),
            role: Role::Server,
            mode: Mode::NodeToNode,
            frame_reader,
            frame_writer,
            error_sink: error_sink.clone(),
            handler: handler.clone(),
        });
        let current = Arc::new(Mutex::new(handle));
        let supervisor = tokio::spawn(supervise(current.clone(), name, error_sink, handler, join));
        (BlockFetchServer { current }, supervisor)
    }

    pub fn no_blocks(&self) -> Result<(), ProtocolError> {
        self.current.lock().unwrap().send_message(Message::NoBlocks)
    }

    pub fn start_batch(&self) -> Result<(), ProtocolError> {
        self.current
            .lock()
            .unwrap()
            .send_message(Message::StartBatch)
    }

    /// Wraps `raw_block` as `[block_type, raw_block]`, per spec.md §6.
    pub fn block(&self, block_type: u64, raw_block: Vec<u8>) -> Result<(), ProtocolError> {
        self.current.lock().unwrap().send_message(Message::Block {
            block_type,
            raw_block,
        })
    }

    pub fn batch_done(&self) -> Result<(), ProtocolError> {
        self.current
            .lock()
            .unwrap()
            .send_message(Message::BatchDone)
    }

    pub fn stop(&self) {
        self.current.lock().unwrap().stop();
    }
}

fn make_handler(
    request_range_func: Option<RequestRangeFn>,
    error_sink: mpsc::UnboundedSender<Fatal>,
) -> Handler<BlockFetch> {
    Arc::new(move |msg, handle| {
        let request_range_func = request_range_func.clone();
        let error_sink = error_sink.clone();
        Box::pin(async move {
            match msg {
                Message::RequestRange { start, end } => match request_range_func {
                    Some(f) => f(start, end, handle).await,
                    None => Err(missing_callback_error(BlockFetch::NAME, &error_sink)),
                },
                // ClientDone needs no reply; NoBlocks/StartBatch/Block/
                // BatchDone are never received by the server.
                _ => Ok(()),
            }
        })
    })
}

async fn supervise(
    current: Arc<Mutex<Handle<BlockFetch>>>,
    name: String,
    error_sink: mpsc::UnboundedSender<Fatal>,
    handler: Handler<BlockFetch>,
    mut join: tokio::task::JoinHandle<crate::runtime::Outcome>,
) {
    loop {
        let Ok(outcome) = join.await else {
            return;
        };
        let last_state = current.lock().unwrap().current_state();
        if last_state != State::Done {
            // A fatal error already published itself on `error_sink`; no
            // restart, since there is no clean session boundary to restart
            // from.
            return;
        }
        tracing::info!(protocol = BlockFetch::NAME, %name, "restarting BlockFetch server after ClientDone");
        let (handle, new_join) = Instance::spawn(Config {
            name: name.clone(),
            role: Role::Server,
            mode: Mode::NodeToNode,
            frame_reader: outcome.frame_reader,
            frame_writer: outcome.frame_writer,
            error_sink: error_sink.clone(),
            handler: handler.clone(),
        });
        *current.lock().unwrap() = handle;
        join = new_join;
    }
}
