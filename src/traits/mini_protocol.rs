//! The generic, data-driven shape every mini-protocol plugs into the runtime
//! with: a protocol id, a state type carrying agency, a message type, and a
//! transition table expressed as a function rather than duplicated switch
//! statements in the runtime itself.

use super::state::Agency;

/// Which end of the connection a protocol instance plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    pub fn other(self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

/// Selects which protocol-id set and message encodings apply.
///
/// This core only implements NodeToNode protocols; NodeToClient is carried
/// so `Config` has somewhere to record the negotiated mode, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    NodeToNode,
    NodeToClient,
}

/// A mini-protocol's state machine, expressed as data the runtime can drive
/// generically: a protocol id, an initial state, an agency function, a
/// terminal-state predicate, a transition table, and a CBOR codec for its
/// message type.
///
/// Implementations express `transition` as a `match` over `(state, message)`
/// pairs — this *is* the StateMap of spec.md §3, just written as code that
/// returns data instead of as a literal `HashMap`; the runtime in
/// [`crate::runtime`] never matches on individual message variants itself,
/// so the table lives in exactly one place per protocol.
pub trait MiniProtocol: Send + Sync + 'static {
    /// Display name, used in `tracing` spans and error messages.
    const NAME: &'static str;
    /// The Ouroboros-assigned mini-protocol id (spec.md §6).
    const ID: u16;
    /// The vertex a fresh instance (or a post-restart instance) starts in.
    const INITIAL_STATE: Self::State;

    type State: Copy + Eq + std::fmt::Debug + Send + 'static;
    type Message: Send + std::fmt::Debug + 'static;

    /// Which party may send next while in `state`.
    fn agency(state: Self::State) -> Agency;

    /// Terminal states are absorbing: nobody may send again, and the
    /// runtime stops both tasks once one is reached.
    fn is_terminal(state: Self::State) -> bool {
        Self::agency(state) == Agency::Nobody
    }

    /// Look up the transition for `message` sent or received while in
    /// `state`. `None` means the pair is not in the table: a send attempt
    /// is `InvalidTransition`, an inbound message is `UnexpectedMessage`.
    fn transition(state: Self::State, message: &Self::Message) -> Option<Self::State>;

    /// Encode `message` onto the end of `buf`.
    fn encode(message: &Self::Message, buf: &mut Vec<u8>) -> Result<(), minicbor::encode::Error<std::convert::Infallible>>;

    /// Decode one message from the front of `buf`, returning it together
    /// with the number of bytes it consumed. Callers distinguish "not
    /// enough bytes yet" (`minicbor::decode::Error::is_end_of_input`) from
    /// a genuine encoding error.
    fn decode(buf: &[u8]) -> Result<(Self::Message, usize), minicbor::decode::Error>;
}
