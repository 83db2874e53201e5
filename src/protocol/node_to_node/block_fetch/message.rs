//! BlockFetch wire messages (spec.md §6). Every message is a definite-length
//! CBOR array whose first element is a `u8` tag, matching the Go original
//! byte-for-byte.

use std::convert::Infallible;

use minicbor::{Decoder, Encoder};

use crate::Point;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `[0, point, point]`
    RequestRange { start: Point, end: Point },
    /// `[1]`
    ClientDone,
    /// `[2]`
    StartBatch,
    /// `[3]`
    NoBlocks,
    /// `[4, [block_type, raw_block]]`
    Block { block_type: u64, raw_block: Vec<u8> },
    /// `[5]`
    BatchDone,
}

const TAG_REQUEST_RANGE: u8 = 0;
const TAG_CLIENT_DONE: u8 = 1;
const TAG_START_BATCH: u8 = 2;
const TAG_NO_BLOCKS: u8 = 3;
const TAG_BLOCK: u8 = 4;
const TAG_BATCH_DONE: u8 = 5;

pub(super) fn encode(
    message: &Message,
    buf: &mut Vec<u8>,
) -> Result<(), minicbor::encode::Error<Infallible>> {
    let mut e = Encoder::new(Vec::new());
    match message {
        Message::RequestRange { start, end } => {
            e.array(3)?.u8(TAG_REQUEST_RANGE)?.encode(*start)?.encode(*end)?;
        }
        Message::ClientDone => {
            e.array(1)?.u8(TAG_CLIENT_DONE)?;
        }
        Message::StartBatch => {
            e.array(1)?.u8(TAG_START_BATCH)?;
        }
        Message::NoBlocks => {
            e.array(1)?.u8(TAG_NO_BLOCKS)?;
        }
        Message::Block {
            block_type,
            raw_block,
        } => {
            e.array(2)?
                .u8(TAG_BLOCK)?
                .array(2)?
                .u64(*block_type)?
                .bytes(raw_block)?;
        }
        Message::BatchDone => {
            e.array(1)?.u8(TAG_BATCH_DONE)?;
        }
    }
    buf.extend_from_slice(e.writer());
    Ok(())
}

pub(super) fn decode(buf: &[u8]) -> Result<(Message, usize), minicbor::decode::Error> {
    let mut d = Decoder::new(buf);
    d.array()?;
    let tag = d.u8()?;
    let message = match tag {
        TAG_REQUEST_RANGE => {
            let start = d.decode()?;
            let end = d.decode()?;
            Message::RequestRange { start, end }
        }
        TAG_CLIENT_DONE => Message::ClientDone,
        TAG_START_BATCH => Message::StartBatch,
        TAG_NO_BLOCKS => Message::NoBlocks,
        TAG_BLOCK => {
            d.array()?;
            let block_type = d.u64()?;
            let raw_block = d.bytes()?.to_vec();
            Message::Block {
                block_type,
                raw_block,
            }
        }
        TAG_BATCH_DONE => Message::BatchDone,
        _ => return Err(minicbor::decode::Error::message("unknown BlockFetch message tag")),
    };
    Ok((message, d.position()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(message: Message) {
        let mut buf = Vec::new();
        encode(&message, &mut buf).unwrap();
        let (decoded, consumed) = decode(&buf).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn round_trips_every_message() {
        round_trip(Message::RequestRange {
            start: Point::Block {
                slot: 10,
                hash: [1; 32],
            },
            end: Point::Block {
                slot: 20,
                hash: [2; 32],
            },
        });
        round_trip(Message::ClientDone);
        round_trip(Message::StartBatch);
        round_trip(Message::NoBlocks);
        round_trip(Message::Block {
            block_type: 6,
            raw_block: vec![0xde, 0xad, 0xbe, 0xef],
        });
        round_trip(Message::BatchDone);
    }

    #[test]
    fn decode_reports_end_of_input_on_a_truncated_message() {
        let mut buf = Vec::new();
        encode(
            &Message::RequestRange {
                start: Point::Block {
                    slot: 1,
                    hash: [0; 32],
                },
                end: Point::Block {
                    slot: 2,
                    hash: [0; 32],
                },
            },
            &mut buf,
        )
        .unwrap();
        let err = decode(&buf[..buf.len() - 1]).unwrap_err();
        assert!(err.is_end_of_input());
    }
}
