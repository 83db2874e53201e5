//! TxSubmission wire messages (spec.md §6). Transaction ids and bodies are
//! carried as opaque byte strings: this core does not parse ledger-specific
//! transaction formats, it only forwards them between mempools.

use std::convert::Infallible;

use minicbor::{Decoder, Encoder};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `[6]`
    Init,
    /// `[0, blocking, ack_count, req_count]`
    RequestTxIds {
        blocking: bool,
        ack_count: u16,
        req_count: u16,
    },
    /// `[1, list of [tx_id, size]]`
    ReplyTxIds { ids: Vec<(Vec<u8>, u32)> },
    /// `[2, list of tx_id]`
    RequestTxs { ids: Vec<Vec<u8>> },
    /// `[3, list of tx_body]`
    ReplyTxs { bodies: Vec<Vec<u8>> },
    /// `[4]`
    Done,
}

const TAG_REQUEST_TX_IDS: u8 = 0;
const TAG_REPLY_TX_IDS: u8 = 1;
const TAG_REQUEST_TXS: u8 = 2;
const TAG_REPLY_TXS: u8 = 3;
const TAG_DONE: u8 = 4;
const TAG_INIT: u8 = 6;

pub(super) fn encode(
    message: &Message,
    buf: &mut Vec<u8>,
) -> Result<(), minicbor::encode::Error<Infallible>> {
    let mut e = Encoder::new(Vec::new());
    match message {
        Message::Init => {
            e.array(1)?.u8(TAG_INIT)?;
        }
        Message::RequestTxIds {
            blocking,
            ack_count,
            req_count,
        } => {
            e.array(4)?
                .u8(TAG_REQUEST_TX_IDS)?
                .bool(*blocking)?
                .u16(*ack_count)?
                .u16(*req_count)?;
        }
        Message::ReplyTxIds { ids } => {
            e.array(2)?.u8(TAG_REPLY_TX_IDS)?.array(ids.len() as u64)?;
            for (id, size) in ids {
                e.array(2)?.bytes(id)?.u32(*size)?;
            }
        }
        Message::RequestTxs { ids } => {
            e.array(2)?.u8(TAG_REQUEST_TXS)?.array(ids.len() as u64)?;
            for id in ids {
                e.bytes(id)?;
            }
        }
        Message::ReplyTxs { bodies } => {
            e.array(2)?.u8(TAG_REPLY_TXS)?.array(bodies.len() as u64)?;
            for body in bodies {
                e.bytes(body)?;
            }
        }
        Message::Done => {
            e.array(1)?.u8(TAG_DONE)?;
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
        TAG_INIT => Message::Init,
        TAG_REQUEST_TX_IDS => {
            let blocking = d.bool()?;
            let ack_count = d.u16()?;
            let req_count = d.u16()?;
            Message::RequestTxIds {
                blocking,
                ack_count,
                req_count,
            }
        }
        TAG_REPLY_TX_IDS => {
            let len = d.array()?.unwrap_or(0);
            let mut ids = Vec::with_capacity(len as usize);
            for _ in 0..len {
                d.array()?;
                let id = d.bytes()?.to_vec();
                let size = d.u32()?;
                ids.push((id, size));
            }
            Message::ReplyTxIds { ids }
        }
        TAG_REQUEST_TXS => {
            let len = d.array()?.unwrap_or(0);
            let mut ids = Vec::with_capacity(len as usize);
            for _ in 0..len {
                ids.push(d.bytes()?.to_vec());
            }
            Message::RequestTxs { ids }
        }
        TAG_REPLY_TXS => {
            let len = d.array()?.unwrap_or(0);
            let mut bodies = Vec::with_capacity(len as usize);
            for _ in 0..len {
                bodies.push(d.bytes()?.to_vec());
            }
            Message::ReplyTxs { bodies }
        }
        TAG_DONE => Message::Done,
        _ => return Err(minicbor::decode::Error::message("unknown TxSubmission message tag")),
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
        round_trip(Message::Init);
        round_trip(Message::RequestTxIds {
            blocking: true,
            ack_count: 0,
            req_count: 10,
        });
        round_trip(Message::RequestTxIds {
            blocking: false,
            ack_count: 5,
            req_count: 20,
        });
        round_trip(Message::ReplyTxIds {
            ids: vec![(vec![1, 2, 3], 128), (vec![4, 5, 6], 256)],
        });
        round_trip(Message::ReplyTxIds { ids: vec![] });
        round_trip(Message::RequestTxs {
            ids: vec![vec![1, 2, 3]],
        });
        round_trip(Message::ReplyTxs {
            bodies: vec![vec![0xde, 0xad], vec![0xbe, 0xef]],
        });
        round_trip(Message::Done);
    }

    #[test]
    fn decode_reports_end_of_input_on_a_truncated_message() {
        let mut buf = Vec::new();
        encode(
            &Message::RequestTxIds {
                blocking: true,
                ack_count: 1,
                req_count: 2,
            },
            &mut buf,
        )
        .unwrap();
        let err = decode(&buf[..buf.len() - 1]).unwrap_err();
        assert!(err.is_end_of_input());
    }
}
