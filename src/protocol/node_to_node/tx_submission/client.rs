//! The client side of TxSubmission: announce readiness once, then answer
//! the server's `RequestTxIds`/`RequestTxs` pulls from the local mempool.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::{
    mux::{FrameReader, FrameWriter},
    runtime::{missing_callback_error, Config, Fatal, Handle, Handler, HandlerFuture, Instance, Outcome},
    traits::{MiniProtocol, Mode, Role},
};

use super::{message::Message, TxSubmission};

/// Invoked on every `RequestTxIds`; the callback replies via
/// `handle.send_message(Message::ReplyTxIds { .. })` before its future
/// resolves.
pub type TxIdsRequestFn = Arc<
    dyn Fn(bool, u16, u16, Handle<TxSubmission>) -> HandlerFuture + Send + Sync,
>;

/// Invoked on every `RequestTxs`; the callback replies via
/// `handle.send_message(Message::ReplyTxs { .. })`.
pub type TxsRequestFn =
    Arc<dyn Fn(Vec<Vec<u8>>, Handle<TxSubmission>) -> HandlerFuture + Send + Sync>;

/// A running TxSubmission client instance. `Init` is sent once, immediately
/// after spawning, as spec.md §4.4 requires exactly once per session; the Go
/// original's server side (`original_source/protocol/txsubmission/server.go`'s
/// `handleInit`) expects precisely this message before issuing any
/// `RequestTxIds`.
pub struct TxSubmissionClient {
    handle: Handle<TxSubmission>,
}

impl TxSubmissionClient {
    pub fn spawn(
        name: String,
        frame_reader: FrameReader,
        frame_writer: FrameWriter,
        error_sink: mpsc::UnboundedSender<Fatal>,
        on_request_tx_ids: Option<TxIdsRequestFn>,
        on_request_txs: Option<TxsRequestFn>,
    ) -> (Self, tokio::task::JoinHandle<Outcome>) {
        let handler = make_handler(on_request_tx_ids, on_request_txs, error_sink.clone());
        let (handle, join) = Instance::spawn(Config {
            name,
            role: Role::Client,
            mode: Mode::NodeToNode,
            frame_reader,
            frame_writer,
            error_sink,
            handler,
        });
        handle.send_message(Message::Init).ok();
        (TxSubmissionClient { handle }, join)
    }

    pub fn handle(&self) -> &Handle<TxSubmission> {
        &self.handle
    }
}

fn make_handler(
    on_request_tx_ids: Option<TxIdsRequestFn>,
    on_request_txs: Option<TxsRequestFn>,
    error_sink: mpsc::UnboundedSender<Fatal>,
) -> Handler<TxSubmission> {
    Arc::new(move |msg, handle| {
        let on_request_tx_ids = on_request_tx_ids.clone();
        let on_request_txs = on_request_txs.clone();
        let error_sink = error_sink.clone();
        Box::pin(async move {
            match msg {
                Message::RequestTxIds {
                    blocking,
                    ack_count,
                    req_count,
                } => match on_request_tx_ids {
                    Some(f) => f(blocking, ack_count, req_count, handle).await,
                    None => Err(missing_callback_error(TxSubmission::NAME, &error_sink)),
                },
                Message::RequestTxs { ids } => match on_request_txs {
                    Some(f) => f(ids, handle).await,
                    None => Err(missing_callback_error(TxSubmission::NAME, &error_sink)),
                },
                // Init/ReplyTxIds/ReplyTxs/Done are never received by the
                // client.
                _ => Ok(()),
            }
        })
    })
}
