//! Error taxonomy for the mux, runtime, and connection layers.
//!
//! One hand-enumerated `thiserror` type per layer, in the same spirit as the
//! teacher crate's `MuxError`, but with `Display` derived via `displaydoc`
//! instead of written out by hand.

use std::convert::Infallible;

use displaydoc::Display;
use thiserror::Error;

/// Errors raised by the physical multiplexer while framing or demultiplexing
/// segments over the shared bearer.
#[derive(Debug, Display, Error)]
pub enum MuxError {
    /// I/O error on the mux bearer: {0}
    Io(#[from] std::io::Error),
    /// peer used unknown protocol id {0}
    UnknownProtocol(u16),
    /// mux channel for protocol {protocol_id} (server: {server}) was already opened
    AlreadyOpen { protocol_id: u16, server: bool },
    /// the physical writer task has stopped
    Closed,
}

/// Errors raised by a single mini-protocol runtime instance.
///
/// Variant names follow spec.md §7 verbatim; `BadEncoding`, `UnexpectedMessage`,
/// `AgencyViolation`, and `MissingCallback` are fatal and are always published
/// on a connection's single error sink before the owning instance stops.
#[derive(Debug, Display, Error)]
pub enum ProtocolError {
    /// {protocol} in state {state:?}: CBOR decode failed: {source}
    BadEncoding {
        protocol: &'static str,
        state: String,
        #[source]
        source: minicbor::decode::Error,
    },
    /// {protocol} in state {state:?}: peer sent a message not permitted from this state
    UnexpectedMessage {
        protocol: &'static str,
        state: String,
    },
    /// {protocol} in state {state:?}: peer sent a message while lacking agency
    AgencyViolation {
        protocol: &'static str,
        state: String,
    },
    /// {protocol} in state {state:?}: attempted to send a message not valid from this state
    InvalidTransition {
        protocol: &'static str,
        state: String,
    },
    /// {protocol} in state {state:?}: attempted to send while the peer holds agency
    WrongAgency {
        protocol: &'static str,
        state: String,
    },
    /// {protocol}: inbound message requires a callback that was not configured
    MissingCallback { protocol: &'static str },
    /// protocol session ended while a caller was awaiting a reply
    ProtocolShuttingDown,
    /// the underlying muxer channel is closed
    MuxerClosed,
    /// failed to encode an outbound message: {0}
    Encode(#[from] minicbor::encode::Error<Infallible>),
    /// {protocol}: handler returned an error: {source}
    Handler {
        protocol: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Errors raised by the connection orchestrator.
#[derive(Debug, Display, Error)]
pub enum ConnectionError {
    /// mux error: {0}
    Mux(#[from] MuxError),
    /// protocol error: {0}
    Protocol(#[from] ProtocolError),
    /// protocol id {protocol_id} (server: {server}) was already started on this connection
    ProtocolAlreadyOpen { protocol_id: u16, server: bool },
}
