//! Reply encoding
//!
//! Replies use the OP_REPLY layout: header, `responseFlags: i32 = 0`,
//! `cursorID: i64 = 0`, `startingFrom: i32 = 0`, `numberReturned: i32 = 1`,
//! then the single result document. The length prefix is written last.

use bson::Document;

use super::document::{decode_document, DocumentCursor};
use super::error::{DriverError, DriverResult};
use super::frame::{Frame, MessageHeader, OpCode, HEADER_LEN};

/// Bytes between the header and the result document
pub const REPLY_PREAMBLE_LEN: usize = 20;

/// Build the reply to the request identified by `request_id`. The id is
/// echoed into both the reply's `requestID` and `responseTo` fields.
pub fn encode_reply(request_id: i32, document: &Document) -> DriverResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_LEN + REPLY_PREAMBLE_LEN + 64);
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&request_id.to_le_bytes());
    buf.extend_from_slice(&request_id.to_le_bytes());
    buf.extend_from_slice(&OpCode::Reply.as_i32().to_le_bytes());

    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&0i64.to_le_bytes());
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&1i32.to_le_bytes());

    document.to_writer(&mut buf)?;

    let total = buf.len() as i32;
    buf[..4].copy_from_slice(&total.to_le_bytes());
    Ok(buf)
}

/// A decoded reply, as seen by a client
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub header: MessageHeader,
    pub response_flags: i32,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub number_returned: i32,
    pub document: Document,
}

/// Decode a complete reply message (used by clients and tests)
pub fn decode_reply(bytes: &[u8]) -> DriverResult<Reply> {
    let frame = Frame::decode(bytes)?;
    if frame.op_code() != Some(OpCode::Reply) {
        return Err(DriverError::ProtocolError(format!(
            "expected OP_REPLY, got opcode {}",
            frame.header.op_code
        )));
    }
    let mut cursor = DocumentCursor::new(frame.body);
    let response_flags = cursor.read_i32()?;
    let low = cursor.read_i32()? as u32 as i64;
    let high = cursor.read_i32()? as i64;
    let starting_from = cursor.read_i32()?;
    let number_returned = cursor.read_i32()?;
    let document = decode_document(&frame.body[cursor.position()..])?;
    Ok(Reply {
        header: frame.header,
        response_flags,
        cursor_id: (high << 32) | low,
        starting_from,
        number_returned,
        document,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::protocol::document::encode_document;
    use bson::doc;

    #[test]
    fn test_reply_layout() {
        let document = doc! { "ok": 1i32, "n": 2i32 };
        let bytes = encode_reply(77, &document).unwrap();
        let doc_bytes = encode_document(&document).unwrap();

        assert_eq!(bytes.len(), HEADER_LEN + REPLY_PREAMBLE_LEN + doc_bytes.len());
        assert_eq!(&bytes[0..4], &(bytes.len() as i32).to_le_bytes());
        assert_eq!(&bytes[4..8], &77i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &77i32.to_le_bytes());
        assert_eq!(&bytes[12..16], &1i32.to_le_bytes());
        assert_eq!(&bytes[16..20], &[0, 0, 0, 0]);
        assert_eq!(&bytes[20..28], &[0u8; 8]);
        assert_eq!(&bytes[28..32], &[0, 0, 0, 0]);
        assert_eq!(&bytes[32..36], &1i32.to_le_bytes());
        assert_eq!(&bytes[36..], doc_bytes.as_slice());
    }

    #[test]
    fn test_decode_reply() {
        let document = doc! { "ok": 1i32 };
        let bytes = encode_reply(-12, &document).unwrap();
        let reply = decode_reply(&bytes).unwrap();
        assert_eq!(reply.header.request_id, -12);
        assert_eq!(reply.header.response_to, -12);
        assert_eq!(reply.cursor_id, 0);
        assert_eq!(reply.number_returned, 1);
        assert_eq!(reply.document, document);
    }
}
