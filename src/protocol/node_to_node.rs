pub mod block_fetch;
pub mod tx_submission;

pub use block_fetch::{BlockEvent, BlockFetch, BlockFetchClient, BlockFetchServer, RequestRangeFn};
pub use tx_submission::{
    InitFn, TxIdsRequestFn, TxSubmission, TxSubmissionClient, TxSubmissionServer, TxsRequestFn,
};

/// Node-to-node mini-protocol ids (spec.md §6).
pub const BLOCK_FETCH_PROTOCOL_ID: u16 = 3;
pub const TX_SUBMISSION_PROTOCOL_ID: u16 = 4;
