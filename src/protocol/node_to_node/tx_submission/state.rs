//! TxSubmission's state machine (spec.md §4.4). `Init` is entered once at
//! startup with client agency; thereafter the server drives the exchange
//! from `Idle`, alternating into either blocking or non-blocking `TxIds`
//! requests and into `TxsWait` while bodies are fetched.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Idle,
    TxIdsBlocking,
    TxIdsNonBlocking,
    TxsWait,
    Done,
}
