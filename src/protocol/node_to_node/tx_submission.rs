//! TxSubmission (spec.md §4.4): the server pulls new transaction ids from
//! the client's mempool, acknowledging what it has already taken, then
//! requests bodies for the ids it wants.

mod client;
pub mod message;
pub mod server;
pub mod state;

pub use client::{TxIdsRequestFn, TxSubmissionClient, TxsRequestFn};
pub use server::{InitFn, TxSubmissionServer};

use crate::traits::{Agency, MiniProtocol};

use message::Message;
use state::State;

/// Marker type plugging TxSubmission into [`crate::runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSubmission;

impl MiniProtocol for TxSubmission {
    const NAME: &'static str = "TxSubmission";
    const ID: u16 = super::TX_SUBMISSION_PROTOCOL_ID;
    const INITIAL_STATE: State = State::Init;

    type State = State;
    type Message = Message;

    fn agency(state: State) -> Agency {
        match state {
            State::Init => Agency::Client,
            State::Idle | State::TxIdsBlocking | State::TxIdsNonBlocking | State::TxsWait => {
                Agency::Server
            }
            State::Done => Agency::Nobody,
        }
    }

    fn transition(state: State, message: &Message) -> Option<State> {
        match (state, message) {
            (State::Init, Message::Init) => Some(State::Idle),
            (State::Idle, Message::RequestTxIds { blocking: true, .. }) => {
                Some(State::TxIdsBlocking)
            }
            (State::Idle, Message::RequestTxIds { blocking: false, .. }) => {
                Some(State::TxIdsNonBlocking)
            }
            (State::Idle, Message::RequestTxs { .. }) => Some(State::TxsWait),
            (State::TxIdsBlocking, Message::ReplyTxIds { .. }) => Some(State::Idle),
            (State::TxIdsBlocking, Message::Done) => Some(State::Done),
            (State::TxIdsNonBlocking, Message::ReplyTxIds { .. }) => Some(State::Idle),
            (State::TxsWait, Message::ReplyTxs { .. }) => Some(State::Idle),
            _ => None,
        }
    }

    fn encode(
        message: &Message,
        buf: &mut Vec<u8>,
    ) -> Result<(), minicbor::encode::Error<std::convert::Infallible>> {
        message::encode(message, buf)
    }

    fn decode(buf: &[u8]) -> Result<(Message, usize), minicbor::decode::Error> {
        message::decode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_the_only_way_out_of_init() {
        assert_eq!(TxSubmission::agency(State::Init), Agency::Client);
        assert_eq!(
            TxSubmission::transition(State::Init, &Message::Init),
            Some(State::Idle)
        );
    }

    #[test]
    fn blocking_tx_ids_request_can_terminate_with_done() {
        let blocking = TxSubmission::transition(
            State::Idle,
            &Message::RequestTxIds {
                blocking: true,
                ack_count: 0,
                req_count: 1,
            },
        )
        .unwrap();
        assert_eq!(blocking, State::TxIdsBlocking);
        let done = TxSubmission::transition(blocking, &Message::Done).unwrap();
        assert!(TxSubmission::is_terminal(done));
    }

    #[test]
    fn non_blocking_tx_ids_request_never_terminates() {
        let non_blocking = TxSubmission::transition(
            State::Idle,
            &Message::RequestTxIds {
                blocking: false,
                ack_count: 0,
                req_count: 1,
            },
        )
        .unwrap();
        assert_eq!(non_blocking, State::TxIdsNonBlocking);
        assert_eq!(TxSubmission::transition(non_blocking, &Message::Done), None);
    }
}
