//! MongoDB wire protocol driver endpoint
//!
//! Lets MongoDB drivers talk to the tabular storage engine. Each collection is
//! backed by one table in schema `main` holding the whole document in a single
//! column.
//!
//! # Protocol Overview
//!
//! Every message is framed the same way:
//! - **Length**: `i32` little-endian total size, including these 4 bytes
//! - **Header**: `requestID`, `responseTo`, `opCode` (`i32` LE each)
//! - **Body**: `OP_MSG` (2013) sections or a legacy `OP_QUERY` (2004)
//!
//! Replies always use the `OP_REPLY` layout with a single result document and
//! cursor id `0`; results are never split into batches.

pub mod binding;
pub mod bulk;
pub mod filter;
pub mod handlers;
pub mod protocol;
pub mod row_codec;
pub mod sessions;

pub use binding::{ResolvedTable, TableResolver};
pub use handlers::{spawn_driver_handler, DriverHandler};
pub use protocol::{DriverError, DriverResult, MAX_MESSAGE_SIZE};
pub use row_codec::StorageFormat;

/// Settings shared by every driver connection
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Database used when a command carries no `$db`
    pub default_database: String,
    pub storage_format: StorageFormat,
    pub max_message_size: usize,
    /// Reported by `startSession` and `hello`
    pub session_timeout_minutes: i32,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            default_database: "docdb".to_string(),
            storage_format: StorageFormat::Map,
            max_message_size: MAX_MESSAGE_SIZE,
            session_timeout_minutes: 30,
        }
    }
}
