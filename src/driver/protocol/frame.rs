//! Message framing
//!
//! Every wire message starts with a 4-byte little-endian total length (the
//! prefix counts itself) followed by `requestID`, `responseTo` and `opCode`,
//! each a signed 32-bit little-endian integer.

use super::error::{DriverError, DriverResult};

/// Size of the length prefix
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Size of the full header, length prefix included
pub const HEADER_LEN: usize = 16;

/// Opcodes this gateway understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Reply,
    Query,
    Msg,
}

impl OpCode {
    pub fn from_i32(code: i32) -> Option<Self> {
        match code {
            1 => Some(OpCode::Reply),
            2004 => Some(OpCode::Query),
            2013 => Some(OpCode::Msg),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            OpCode::Reply => 1,
            OpCode::Query => 2004,
            OpCode::Msg => 2013,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Total message size, inclusive of the length prefix
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: i32,
}

pub(crate) fn read_i32_le(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Validate a length prefix and return how many bytes follow it
pub fn packet_length(prefix: [u8; LENGTH_PREFIX_LEN], max_message_size: usize) -> DriverResult<usize> {
    let total = i32::from_le_bytes(prefix);
    if total < HEADER_LEN as i32 {
        return Err(DriverError::InvalidLength(total));
    }
    let total = total as usize;
    if total > max_message_size {
        return Err(DriverError::MessageTooLarge(total));
    }
    Ok(total - LENGTH_PREFIX_LEN)
}

/// Exactly one wire message: its header and the bytes after it
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub header: MessageHeader,
    pub body: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Decode a single message from `packet`, which must start at the length
    /// prefix and hold exactly the announced number of bytes. Extra bytes mean
    /// two messages were delivered as one, which is a framing failure.
    pub fn decode(packet: &'a [u8]) -> DriverResult<Self> {
        if packet.len() < HEADER_LEN {
            return Err(DriverError::Truncated {
                declared: HEADER_LEN,
                received: packet.len(),
            });
        }
        let declared = read_i32_le(packet, 0);
        if declared < HEADER_LEN as i32 {
            return Err(DriverError::InvalidLength(declared));
        }
        let declared = declared as usize;
        if packet.len() > declared {
            return Err(DriverError::Coalesced {
                declared,
                received: packet.len(),
            });
        }
        if packet.len() < declared {
            return Err(DriverError::Truncated {
                declared,
                received: packet.len(),
            });
        }

        Ok(Self {
            header: MessageHeader {
                message_length: declared as i32,
                request_id: read_i32_le(packet, 4),
                response_to: read_i32_le(packet, 8),
                op_code: read_i32_le(packet, 12),
            },
            body: &packet[HEADER_LEN..],
        })
    }

    pub fn op_code(&self) -> Option<OpCode> {
        OpCode::from_i32(self.header.op_code)
    }
}

/// Build a complete message around `body`
pub fn encode_frame(request_id: i32, response_to: i32, op_code: i32, body: &[u8]) -> Vec<u8> {
    let total = HEADER_LEN + body.len();
    let mut buf = Vec::with_capacity(total);
    buf.extend_from_slice(&(total as i32).to_le_bytes());
    buf.extend_from_slice(&request_id.to_le_bytes());
    buf.extend_from_slice(&response_to.to_le_bytes());
    buf.extend_from_slice(&op_code.to_le_bytes());
    buf.extend_from_slice(body);
    buf
}
