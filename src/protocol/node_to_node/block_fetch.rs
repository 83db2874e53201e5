//! BlockFetch (spec.md §4.3): the client asks for a contiguous range of
//! blocks, the server streams them back or reports it has none.

mod client;
pub mod message;
pub mod server;
pub mod state;

pub use client::{BlockEvent, BlockFetchClient};
pub use server::{BlockFetchServer, RequestRangeFn};

use crate::traits::{Agency, MiniProtocol};

use message::Message;
use state::State;

/// Marker type plugging BlockFetch into [`crate::runtime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFetch;

impl MiniProtocol for BlockFetch {
    const NAME: &'static str = "BlockFetch";
    const ID: u16 = super::BLOCK_FETCH_PROTOCOL_ID;
    const INITIAL_STATE: State = State::Idle;

    type State = State;
    type Message = Message;

    fn agency(state: State) -> Agency {
        match state {
            State::Idle => Agency::Client,
            State::Busy | State::Streaming => Agency::Server,
            State::Done => Agency::Nobody,
        }
    }

    fn transition(state: State, message: &Message) -> Option<State> {
        match (state, message) {
            (State::Idle, Message::RequestRange { .. }) => Some(State::Busy),
            (State::Idle, Message::ClientDone) => Some(State::Done),
            (State::Busy, Message::NoBlocks) => Some(State::Idle),
            (State::Busy, Message::StartBatch) => Some(State::Streaming),
            (State::Streaming, Message::Block { .. }) => Some(State::Streaming),
            (State::Streaming, Message::BatchDone) => Some(State::Idle),
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
    fn empty_range_must_answer_no_blocks_or_start_batch_never_both() {
        // Busy only transitions on NoBlocks or StartBatch; there is no path
        // from Busy back to Busy, so the server callback cannot send both.
        assert_eq!(
            BlockFetch::transition(State::Busy, &Message::NoBlocks),
            Some(State::Idle)
        );
        assert_eq!(
            BlockFetch::transition(State::Busy, &Message::StartBatch),
            Some(State::Streaming)
        );
    }

    #[test]
    fn client_done_is_terminal() {
        let next = BlockFetch::transition(State::Idle, &Message::ClientDone).unwrap();
        assert!(BlockFetch::is_terminal(next));
    }

    #[test]
    fn block_messages_keep_server_agency_in_streaming() {
        assert_eq!(BlockFetch::agency(State::Streaming), Agency::Server);
        assert_eq!(
            BlockFetch::transition(
                State::Streaming,
                &Message::Block {
                    block_type: 0,
                    raw_block: vec![]
                }
            ),
            Some(State::Streaming)
        );
    }
}
