//! The connection orchestrator (spec.md §4.5): owns one [`Muxer`] and the
//! set of mini-protocol facades running over it, fans a single fatal-error
//! channel across all of them, and tears every protocol down on the first
//! failure.

use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};

use crate::{
    error::ConnectionError,
    mux::Muxer,
    protocol::node_to_node::{
        block_fetch::{BlockFetchClient, BlockFetchServer, RequestRangeFn},
        tx_submission::{
            InitFn, TxIdsRequestFn, TxSubmissionClient, TxSubmissionServer, TxsRequestFn,
        },
        BLOCK_FETCH_PROTOCOL_ID, TX_SUBMISSION_PROTOCOL_ID,
    },
    runtime::Fatal,
    traits::Role,
};

/// Which side of BlockFetch this connection runs, and the callbacks that
/// side needs.
pub enum BlockFetchRole {
    Client,
    Server {
        request_range_func: Option<RequestRangeFn>,
    },
}

/// Which side of TxSubmission this connection runs, and the callbacks that
/// side needs.
pub enum TxSubmissionRole {
    Client {
        on_request_tx_ids: Option<TxIdsRequestFn>,
        on_request_txs: Option<TxsRequestFn>,
    },
    Server {
        init_func: Option<InitFn>,
    },
}

/// Built directly by the embedder: no file or environment loading, mirroring
/// the Go `ProtocolConfig`/`ProtocolOptions` structs.
pub struct ConnectionConfig {
    /// Display name for `tracing` spans, e.g. the peer's address.
    pub name: String,
    pub block_fetch: BlockFetchRole,
    pub tx_submission: TxSubmissionRole,
}

/// The running BlockFetch facade for one connection, whichever side it is.
pub enum BlockFetchHandle {
    Client(BlockFetchClient),
    Server(BlockFetchServer),
}

impl BlockFetchHandle {
    fn stop(&self) {
        match self {
            BlockFetchHandle::Client(c) => c.handle().stop(),
            BlockFetchHandle::Server(s) => s.stop(),
        }
    }
}

/// The running TxSubmission facade for one connection, whichever side it is.
pub enum TxSubmissionHandle {
    Client(TxSubmissionClient),
    Server(TxSubmissionServer),
}

impl TxSubmissionHandle {
    fn stop(&self) {
        match self {
            TxSubmissionHandle::Client(c) => c.handle().stop(),
            TxSubmissionHandle::Server(s) => s.stop(),
        }
    }
}

/// One physical connection: a muxer and the mini-protocol instances running
/// over it, torn down together on the first fatal error.
pub struct Connection {
    muxer: Muxer,
    pub block_fetch: BlockFetchHandle,
    pub tx_submission: TxSubmissionHandle,
    error_rx: mpsc::UnboundedReceiver<Fatal>,
}

impl Connection {
    /// Opens the muxer over `bearer` and starts the configured protocol
    /// facades. `ConnectionError::ProtocolAlreadyOpen` cannot occur here: a
    /// fresh `Muxer` has no protocol registered yet, so each `open` call
    /// below is the first for its `(protocol_id, role)` pair.
    #[tracing::instrument(skip_all, fields(name = %config.name))]
    pub fn start(
        bearer: impl AsyncRead + AsyncWrite + Send + 'static,
        config: ConnectionConfig,
    ) -> Result<Self, ConnectionError> {
        let muxer = Muxer::new(bearer);
        let (error_tx, error_rx) = mpsc::unbounded_channel();

        let block_fetch = match config.block_fetch {
            BlockFetchRole::Client => {
                let (reader, writer) = muxer.open(BLOCK_FETCH_PROTOCOL_ID, Role::Client)?;
                let (client, _join) =
                    BlockFetchClient::spawn(config.name.clone(), reader, writer, error_tx.clone());
                BlockFetchHandle::Client(client)
            }
            BlockFetchRole::Server { request_range_func } => {
                let (reader, writer) = muxer.open(BLOCK_FETCH_PROTOCOL_ID, Role::Server)?;
                let (server, _join) = BlockFetchServer::spawn(
                    config.name.clone(),
                    reader,
                    writer,
                    error_tx.clone(),
                    request_range_func,
                );
                BlockFetchHandle::Server(server)
            }
        };

        let tx_submission = match config.tx_submission {
            TxSubmissionRole::Client {
                on_request_tx_ids,
                on_request_txs,
            } => {
                let (reader, writer) = muxer.open(TX_SUBMISSION_PROTOCOL_ID, Role::Client)?;
                let (client, _join) = TxSubmissionClient::spawn(
                    config.name.clone(),
                    reader,
                    writer,
                    error_tx.clone(),
                    on_request_tx_ids,
                    on_request_txs,
                );
                TxSubmissionHandle::Client(client)
            }
            TxSubmissionRole::Server { init_func } => {
                let (reader, writer) = muxer.open(TX_SUBMISSION_PROTOCOL_ID, Role::Server)?;
                let (server, _join) = TxSubmissionServer::spawn(
                    config.name.clone(),
                    reader,
                    writer,
                    error_tx.clone(),
                    init_func,
                );
                TxSubmissionHandle::Server(server)
            }
        };

        Ok(Connection {
            muxer,
            block_fetch,
            tx_submission,
            error_rx,
        })
    }

    /// Waits for the first fatal error from any protocol on this
    /// connection, stops every protocol, and returns the error that caused
    /// the teardown. Never resolves if every protocol runs to a clean
    /// terminal state on its own — callers that expect a bounded session
    /// should race this against their own completion signal.
    pub async fn run(mut self) -> ConnectionError {
        let fatal = match self.error_rx.recv().await {
            Some(fatal) => fatal,
            None => {
                // Every facade was dropped without ever failing; still tear
                // the muxer down explicitly rather than leaving its reader
                // and writer tasks running detached off this scope.
                self.muxer.close();
                return ConnectionError::Protocol(crate::error::ProtocolError::MuxerClosed);
            }
        };
        tracing::error!(protocol = fatal.protocol, error = %fatal.error, "tearing down connection");
        self.block_fetch.stop();
        self.tx_submission.stop();
        self.muxer.close();
        ConnectionError::Protocol(fatal.error)
    }
}
