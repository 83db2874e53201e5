//! The 8-byte segment header prepended to every chunk on the shared bearer:
//! `{timestamp: u32, protocol_id | direction_bit: u16, payload_len: u16}`.

use crate::traits::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub timestamp: u32,
    pub protocol_id: u16,
    /// The role of whoever *sent* this segment.
    pub sender: Role,
    pub payload_len: u16,
}

const SERVER_BIT: u16 = 0x8000;

impl Header {
    pub fn to_bytes(self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0..4].copy_from_slice(&self.timestamp.to_be_bytes());
        let tagged_id = self.protocol_id
            | match self.sender {
                Role::Server => SERVER_BIT,
                Role::Client => 0,
            };
        out[4..6].copy_from_slice(&tagged_id.to_be_bytes());
        out[6..8].copy_from_slice(&self.payload_len.to_be_bytes());
        out
    }

    pub fn from_bytes(buf: [u8; 8]) -> Self {
        let timestamp = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let tagged_id = u16::from_be_bytes(buf[4..6].try_into().unwrap());
        let payload_len = u16::from_be_bytes(buf[6..8].try_into().unwrap());
        let sender = if tagged_id & SERVER_BIT != 0 {
            Role::Server
        } else {
            Role::Client
        };
        Header {
            timestamp,
            protocol_id: tagged_id & !SERVER_BIT,
            sender,
            payload_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_client_and_server_headers() {
        for sender in [Role::Client, Role::Server] {
            let header = Header {
                timestamp: 0xdead_beef,
                protocol_id: 3,
                sender,
                payload_len: 1234,
            };
            assert_eq!(Header::from_bytes(header.to_bytes()), header);
        }
    }

    #[test]
    fn server_bit_does_not_leak_into_protocol_id() {
        let header = Header {
            timestamp: 0,
            protocol_id: 0x7fff,
            sender: Role::Server,
            payload_len: 0,
        };
        let bytes = header.to_bytes();
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 0xffff);
        assert_eq!(Header::from_bytes(bytes).protocol_id, 0x7fff);
    }
}
