//! Document codec
//!
//! A forward-only cursor over a message body that hands out self-length-prefixed
//! documents and the handful of scalar fields that sit between them.

use bson::Document;

use super::error::{DriverError, DriverResult};
use super::frame::read_i32_le;

/// Smallest valid encoded document: length prefix plus terminating NUL
const MIN_DOCUMENT_LEN: usize = 5;

#[derive(Debug, Clone)]
pub struct DocumentCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> DocumentCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether more bytes (another section or document) follow
    pub fn has_remaining(&self) -> bool {
        self.pos < self.buf.len()
    }

    fn take(&mut self, len: usize, what: &str) -> DriverResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(DriverError::ProtocolError(format!(
                "unexpected end of message reading {} ({} of {} bytes available)",
                what,
                self.remaining(),
                len
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> DriverResult<u8> {
        Ok(self.take(1, "byte")?[0])
    }

    pub fn read_i32(&mut self) -> DriverResult<i32> {
        let bytes = self.take(4, "int32")?;
        Ok(read_i32_le(bytes, 0))
    }

    pub fn peek_i32(&self) -> DriverResult<i32> {
        if self.remaining() < 4 {
            return Err(DriverError::ProtocolError(
                "unexpected end of message reading int32".to_string(),
            ));
        }
        Ok(read_i32_le(self.buf, self.pos))
    }

    /// Read a NUL-terminated UTF-8 string
    pub fn read_cstring(&mut self) -> DriverResult<String> {
        let rest = &self.buf[self.pos..];
        let end = rest.iter().position(|b| *b == 0).ok_or_else(|| {
            DriverError::ProtocolError("unterminated string in message".to_string())
        })?;
        let value = std::str::from_utf8(&rest[..end])
            .map_err(|e| DriverError::ProtocolError(format!("invalid UTF-8 string: {}", e)))?
            .to_string();
        self.pos += end + 1;
        Ok(value)
    }

    /// Decode one document and advance past it
    pub fn read_document(&mut self) -> DriverResult<Document> {
        let declared = self.peek_i32()?;
        if declared < MIN_DOCUMENT_LEN as i32 {
            return Err(DriverError::ProtocolError(format!(
                "invalid document length {}",
                declared
            )));
        }
        let mut bytes = self.take(declared as usize, "document")?;
        Ok(Document::from_reader(&mut bytes)?)
    }

    /// Split off the next `len` bytes as an independent cursor
    pub fn split(&mut self, len: usize) -> DriverResult<DocumentCursor<'a>> {
        Ok(DocumentCursor::new(self.take(len, "section")?))
    }

    /// Decode documents until the cursor is exhausted
    pub fn read_all(&mut self) -> DriverResult<Vec<Document>> {
        let mut documents = Vec::new();
        while self.has_remaining() {
            documents.push(self.read_document()?);
        }
        Ok(documents)
    }
}

/// Serialize a document with its self-length prefix
pub fn encode_document(doc: &Document) -> DriverResult<Vec<u8>> {
    let mut buf = Vec::new();
    doc.to_writer(&mut buf)?;
    Ok(buf)
}

/// Decode a buffer holding exactly one document
pub fn decode_document(bytes: &[u8]) -> DriverResult<Document> {
    let mut cursor = DocumentCursor::new(bytes);
    let doc = cursor.read_document()?;
    if cursor.has_remaining() {
        return Err(DriverError::ProtocolError(format!(
            "{} trailing bytes after document",
            cursor.remaining()
        )));
    }
    Ok(doc)
}
