//! Request bodies for the two supported opcodes
//!
//! - **OP_MSG** (`2013`): `flagBits: u32`, then sections. Kind `0` carries the
//!   command document; kind `1` carries `size: i32`, a NUL-terminated
//!   identifier and zero or more documents. A trailing CRC-32C follows when
//!   `checksumPresent` is set.
//! - **OP_QUERY** (`2004`): `flags: i32`, NUL-terminated namespace,
//!   `numberToSkip: i32`, `numberToReturn: i32`, the query document and an
//!   optional return-fields selector.

use bson::Document;

use super::document::{encode_document, DocumentCursor};
use super::error::{DriverError, DriverResult};
use super::frame::{encode_frame, OpCode};

/// OP_MSG flag: a CRC-32C trails the sections
pub const CHECKSUM_PRESENT: u32 = 1;

pub const SECTION_BODY: u8 = 0;
pub const SECTION_SEQUENCE: u8 = 1;

const CHECKSUM_LEN: usize = 4;

/// A kind-1 section: a named run of documents
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSequence {
    pub identifier: String,
    pub documents: Vec<Document>,
}

/// Whatever follows the command document of an OP_MSG
#[derive(Debug, Clone)]
pub struct Payload<'a> {
    /// Sequences that preceded the body section
    leading: Vec<DocumentSequence>,
    cursor: DocumentCursor<'a>,
}

impl<'a> Payload<'a> {
    fn new(leading: Vec<DocumentSequence>, cursor: DocumentCursor<'a>) -> Self {
        Self { leading, cursor }
    }

    /// A payload with nothing after the command document
    pub fn empty() -> Self {
        Self::new(Vec::new(), DocumentCursor::new(&[]))
    }

    pub fn has_remaining(&self) -> bool {
        !self.leading.is_empty() || self.cursor.has_remaining()
    }

    /// Read the next document sequence section
    pub fn next_sequence(&mut self) -> DriverResult<DocumentSequence> {
        if !self.leading.is_empty() {
            return Ok(self.leading.remove(0));
        }
        let kind = self.cursor.read_u8()?;
        if kind != SECTION_SEQUENCE {
            return Err(DriverError::ProtocolError(format!(
                "expected document sequence section, found kind {}",
                kind
            )));
        }
        read_sequence(&mut self.cursor)
    }
}

fn read_sequence<'a>(cursor: &mut DocumentCursor<'a>) -> DriverResult<DocumentSequence> {
    let size = cursor.read_i32()?;
    if size < 5 {
        return Err(DriverError::ProtocolError(format!(
            "invalid document sequence size {}",
            size
        )));
    }
    let mut section = cursor.split(size as usize - 4)?;
    let identifier = section.read_cstring()?;
    let documents = section.read_all()?;
    Ok(DocumentSequence {
        identifier,
        documents,
    })
}

/// A parsed OP_MSG request
#[derive(Debug, Clone)]
pub struct OpMsg<'a> {
    pub flags: u32,
    pub body: Document,
    pub payload: Payload<'a>,
}

impl<'a> OpMsg<'a> {
    pub fn parse(body: &'a [u8]) -> DriverResult<Self> {
        let mut cursor = DocumentCursor::new(body);
        let flags = cursor.read_i32()? as u32;

        let mut sections = if flags & CHECKSUM_PRESENT != 0 {
            let len = cursor.remaining().checked_sub(CHECKSUM_LEN).ok_or_else(|| {
                DriverError::ProtocolError("checksum flag set but no checksum present".to_string())
            })?;
            cursor.split(len)?
        } else {
            cursor
        };

        let mut leading = Vec::new();
        loop {
            match sections.read_u8()? {
                SECTION_BODY => {
                    let command = sections.read_document()?;
                    return Ok(Self {
                        flags,
                        body: command,
                        payload: Payload::new(leading, sections),
                    });
                }
                SECTION_SEQUENCE => leading.push(read_sequence(&mut sections)?),
                kind => {
                    return Err(DriverError::ProtocolError(format!(
                        "unknown section kind {}",
                        kind
                    )))
                }
            }
        }
    }
}

/// A parsed legacy OP_QUERY request
#[derive(Debug, Clone, PartialEq)]
pub struct OpQuery {
    pub flags: i32,
    pub full_collection_name: String,
    pub number_to_skip: i32,
    pub number_to_return: i32,
    pub query: Document,
    pub return_fields_selector: Option<Document>,
}

impl OpQuery {
    pub fn parse(body: &[u8]) -> DriverResult<Self> {
        let mut cursor = DocumentCursor::new(body);
        let flags = cursor.read_i32()?;
        let full_collection_name = cursor.read_cstring()?;
        let number_to_skip = cursor.read_i32()?;
        let number_to_return = cursor.read_i32()?;
        let query = cursor.read_document()?;
        let mut return_fields_selector = None;
        while cursor.has_remaining() {
            return_fields_selector = Some(cursor.read_document()?);
        }
        Ok(Self {
            flags,
            full_collection_name,
            number_to_skip,
            number_to_return,
            query,
            return_fields_selector,
        })
    }
}

/// Encode a complete OP_MSG request (used by clients and tests)
pub fn encode_op_msg(
    request_id: i32,
    body: &Document,
    sequences: &[DocumentSequence],
) -> DriverResult<Vec<u8>> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.push(SECTION_BODY);
    buf.extend(encode_document(body)?);
    for sequence in sequences {
        let mut section = Vec::new();
        section.extend_from_slice(sequence.identifier.as_bytes());
        section.push(0);
        for doc in &sequence.documents {
            section.extend(encode_document(doc)?);
        }
        buf.push(SECTION_SEQUENCE);
        buf.extend_from_slice(&((section.len() + 4) as i32).to_le_bytes());
        buf.extend(section);
    }
    Ok(encode_frame(request_id, 0, OpCode::Msg.as_i32(), &buf))
}

/// Encode a complete OP_QUERY request (used by clients and tests)
pub fn encode_op_query(
    request_id: i32,
    namespace: &str,
    query: &Document,
    selector: Option<&Document>,
) -> DriverResult<Vec<u8>> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(namespace.as_bytes());
    buf.push(0);
    buf.extend_from_slice(&0i32.to_le_bytes());
    buf.extend_from_slice(&(-1i32).to_le_bytes());
    buf.extend(encode_document(query)?);
    if let Some(selector) = selector {
        buf.extend(encode_document(selector)?);
    }
    Ok(encode_frame(request_id, 0, OpCode::Query.as_i32(), &buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::protocol::frame::Frame;
    use bson::doc;

    #[test]
    fn test_op_msg_body_only() {
        let command = doc! { "find": "c1", "$db": "db1" };
        let bytes = encode_op_msg(3, &command, &[]).unwrap();
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.op_code(), Some(OpCode::Msg));

        let msg = OpMsg::parse(frame.body).unwrap();
        assert_eq!(msg.flags, 0);
        assert_eq!(msg.body, command);
        assert!(!msg.payload.has_remaining());
    }

    #[test]
    fn test_op_msg_with_sequences() {
        let command = doc! { "insert": "c1", "$db": "db1" };
        let docs = vec![doc! { "a": 1i32 }, doc! { "a": 2i32 }];
        let sequences = vec![
            DocumentSequence {
                identifier: "documents".to_string(),
                documents: docs.clone(),
            },
            DocumentSequence {
                identifier: "other".to_string(),
                documents: vec![],
            },
        ];
        let bytes = encode_op_msg(4, &command, &sequences).unwrap();
        let frame = Frame::decode(&bytes).unwrap();
        let mut msg = OpMsg::parse(frame.body).unwrap();

        assert!(msg.payload.has_remaining());
        let first = msg.payload.next_sequence().unwrap();
        assert_eq!(first.identifier, "documents");
        assert_eq!(first.documents, docs);
        let second = msg.payload.next_sequence().unwrap();
        assert_eq!(second.identifier, "other");
        assert!(second.documents.is_empty());
        assert!(!msg.payload.has_remaining());
    }

    #[test]
    fn test_op_msg_sequence_before_body() {
        let command = doc! { "insert": "c1" };
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes());
        let doc_bytes = encode_document(&doc! { "x": 1i32 }).unwrap();
        body.push(SECTION_SEQUENCE);
        body.extend_from_slice(&((4 + 10 + doc_bytes.len()) as i32).to_le_bytes());
        body.extend_from_slice(b"documents\0");
        body.extend(doc_bytes);
        body.push(SECTION_BODY);
        body.extend(encode_document(&command).unwrap());

        let mut msg = OpMsg::parse(&body).unwrap();
        assert_eq!(msg.body, command);
        let sequence = msg.payload.next_sequence().unwrap();
        assert_eq!(sequence.documents, vec![doc! { "x": 1i32 }]);
        assert!(!msg.payload.has_remaining());
    }

    #[test]
    fn test_op_msg_checksum_is_stripped() {
        let command = doc! { "ping": 1i32 };
        let mut body = Vec::new();
        body.extend_from_slice(&CHECKSUM_PRESENT.to_le_bytes());
        body.push(SECTION_BODY);
        body.extend(encode_document(&command).unwrap());
        body.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);

        let msg = OpMsg::parse(&body).unwrap();
        assert_eq!(msg.body, command);
        assert!(!msg.payload.has_remaining());
    }

    #[test]
    fn test_op_msg_unknown_section_kind() {
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes());
        body.push(7);
        assert!(matches!(
            OpMsg::parse(&body),
            Err(DriverError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_op_query_with_selector() {
        let query = doc! { "isMaster": 1i32 };
        let selector = doc! { "f2": 1i32 };
        let bytes = encode_op_query(9, "admin.$cmd", &query, Some(&selector)).unwrap();
        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!(frame.op_code(), Some(OpCode::Query));

        let op = OpQuery::parse(frame.body).unwrap();
        assert_eq!(op.full_collection_name, "admin.$cmd");
        assert_eq!(op.number_to_skip, 0);
        assert_eq!(op.number_to_return, -1);
        assert_eq!(op.query, query);
        assert_eq!(op.return_fields_selector, Some(selector));
    }
}
