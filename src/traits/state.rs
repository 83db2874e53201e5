//! The agency rule, shared by every mini-protocol's state type.

/// Which party holds the right to send the next message.
///
/// A property of the *state*, not of the message — checked independently at
/// both the send site (local agency required) and the receive site (remote
/// agency required), rather than duplicated into every message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agency {
    Client,
    Server,
    /// Terminal: the state is absorbing and nobody may send again.
    Nobody,
}

impl Agency {
    pub fn is_nobody(self) -> bool {
        matches!(self, Agency::Nobody)
    }
}
