//! Wire protocol definitions for the MongoDB-compatible driver endpoint

pub mod command;
pub mod document;
pub mod error;
pub mod frame;
pub mod message;
pub mod reply;

pub use command::CommandKind;
pub use document::{decode_document, encode_document, DocumentCursor};
pub use error::{DriverError, DriverResult};
pub use frame::{encode_frame, packet_length, Frame, MessageHeader, OpCode, HEADER_LEN};
pub use message::{encode_op_msg, encode_op_query, DocumentSequence, OpMsg, OpQuery, Payload};
pub use reply::{decode_reply, encode_reply, Reply};

/// Default maximum message size (matches `maxMessageSizeBytes`)
pub const MAX_MESSAGE_SIZE: usize = 48_000_000;

/// Largest document a client may send (`maxBsonObjectSize`)
pub const MAX_BSON_OBJECT_SIZE: i32 = 16 * 1024 * 1024;

pub const MAX_WRITE_BATCH_SIZE: i32 = 100_000;

/// Wire versions advertised to OP_MSG clients
pub const MIN_WIRE_VERSION: i32 = 0;
pub const MAX_WIRE_VERSION: i32 = 17;

/// Wire versions advertised in replies to legacy OP_QUERY
pub const LEGACY_MIN_WIRE_VERSION: i32 = 2;
pub const LEGACY_MAX_WIRE_VERSION: i32 = 6;

/// Server version reported by `buildInfo`
pub const SERVER_VERSION: &str = "6.0.0";
pub const FEATURE_COMPATIBILITY_VERSION: &str = "6.0";
