//! The server side of TxSubmission. Pulls transaction ids and bodies from
//! the client's mempool through a synchronous request/reply facade backed
//! by `tokio::sync::oneshot`, and restarts the protocol instance after
//! `Done`, matching `handleDone` in the Go original
//! (`original_source/protocol/txsubmission/server.go`).
//!
//! `ack_count` is owned by `TxSubmissionServer`, not by the instance: the Go
//! original's `Server.ackCount` survives a restart, since it tracks how many
//! transactions the mempool has already accepted regardless of how many
//! protocol sessions have come and gone on this connection.

use std::sync::{
    atomic::{AtomicU16, Ordering},
    Arc, Mutex,
};

use tokio::sync::{mpsc, oneshot};

use crate::{
    error::ProtocolError,
    mux::{FrameReader, FrameWriter},
    runtime::{missing_callback_error, Config, Fatal, Handle, Handler, Instance},
    traits::{MiniProtocol, Mode, Role},
};

use super::{message::Message, state::State, TxSubmission};

type TxIdsReply = oneshot::Sender<Vec<(Vec<u8>, u32)>>;
type TxsReply = oneshot::Sender<Vec<Vec<u8>>>;

/// Invoked once, when the client's `Init` arrives.
pub type InitFn = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Pending {
    tx_ids: Option<TxIdsReply>,
    txs: Option<TxsReply>,
}

pub struct TxSubmissionServer {
    current: Arc<Mutex<Handle<TxSubmission>>>,
    ack_count: Arc<AtomicU16>,
    pending: Arc<Mutex<Pending>>,
}

impl TxSubmissionServer {
    pub fn spawn(
        name: String,
        frame_reader: FrameReader,
        frame_writer: FrameWriter,
        error_sink: mpsc::UnboundedSender<Fatal>,
        init_func: Option<InitFn>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let ack_count = Arc::new(AtomicU16::new(0));
        let pending = Arc::new(Mutex::new(Pending::default()));
        let handler = make_handler(pending.clone(), init_func, error_sink.clone());
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
        let supervisor = tokio::spawn(supervise(
            current.clone(),
            name,
            error_sink,
            handler,
            pending.clone(),
            join,
        ));
        (
            TxSubmissionServer {
                current,
                ack_count,
                pending,
            },
            supervisor,
        )
    }

    /// Requests up to `req_count` new transaction ids, acknowledging
    /// whatever the *previous* `request_tx_ids` reply yielded (spec.md §4.4:
    /// `ack_count` on request *n+1* equals `len(reply_list)` from request
    /// *n*; request 1 has `ack_count = 0`). Blocks (on the client's mempool)
    /// when `blocking` is set and none are immediately available.
    pub async fn request_tx_ids(
        &self,
        blocking: bool,
        req_count: u16,
    ) -> Result<Vec<(Vec<u8>, u32)>, ProtocolError> {
        let ack_count = self.ack_count.load(Ordering::Acquire);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().tx_ids = Some(tx);
        self.current.lock().unwrap().send_message(Message::RequestTxIds {
            blocking,
            ack_count,
            req_count,
        })?;
        let result = rx.await.map_err(|_| ProtocolError::ProtocolShuttingDown)?;
        self.ack_count
            .store(result.len() as u16, Ordering::Release);
        Ok(result)
    }

    pub async fn request_txs(&self, ids: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, ProtocolError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().txs = Some(tx);
        self.current
            .lock()
            .unwrap()
            .send_message(Message::RequestTxs { ids })?;
        rx.await.map_err(|_| ProtocolError::ProtocolShuttingDown)
    }

    pub fn stop(&self) {
        self.current.lock().unwrap().stop();
    }
}

fn make_handler(
    pending: Arc<Mutex<Pending>>,
    init_func: Option<InitFn>,
    error_sink: mpsc::UnboundedSender<Fatal>,
) -> Handler<TxSubmission> {
    Arc::new(move |msg, _handle| {
        let pending = pending.clone();
        let init_func = init_func.clone();
        let error_sink = error_sink.clone();
        Box::pin(async move {
            match msg {
                Message::Init => match init_func {
                    Some(f) => {
                        f();
                        Ok(())
                    }
                    None => Err(missing_callback_error(TxSubmission::NAME, &error_sink)),
                },
                Message::ReplyTxIds { ids } => {
                    if let Some(tx) = pending.lock().unwrap().tx_ids.take() {
                        let _ = tx.send(ids);
                    }
                    Ok(())
                }
                Message::ReplyTxs { bodies } => {
                    if let Some(tx) = pending.lock().unwrap().txs.take() {
                        let _ = tx.send(bodies);
                    }
                    Ok(())
                }
                Message::Done => Ok(()),
                // RequestTxIds/RequestTxs are never received by the server.
                _ => Ok(()),
            }
        })
    })
}

async fn supervise(
    current: Arc<Mutex<Handle<TxSubmission>>>,
    name: String,
    error_sink: mpsc::UnboundedSender<Fatal>,
    handler: Handler<TxSubmission>,
    pending: Arc<Mutex<Pending>>,
    mut join: tokio::task::JoinHandle<crate::runtime::Outcome>,
) {
    loop {
        let Ok(outcome) = join.await else {
            return;
        };
        let last_state = current.lock().unwrap().current_state();
        if last_state != State::Done {
            return;
        }
        // Any reply awaited by a facade call across the boundary can never
        // arrive now; the client closed the session instead of answering.
        let mut guard = pending.lock().unwrap();
        guard.tx_ids.take();
        guard.txs.take();
        drop(guard);

        tracing::info!(protocol = TxSubmission::NAME, %name, "restarting TxSubmission server after Done");
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
