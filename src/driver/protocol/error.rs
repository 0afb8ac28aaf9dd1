use thiserror::Error;

use crate::error::DbError;

/// Driver protocol error types
#[derive(Error, Debug)]
pub enum DriverError {
    /// More bytes were delivered than the length prefix announced
    #[error("Coalesced packet: length prefix announced {declared} bytes, buffer holds {received}")]
    Coalesced { declared: usize, received: usize },

    /// Fewer bytes were delivered than the length prefix announced
    #[error("Truncated packet: length prefix announced {declared} bytes, buffer holds {received}")]
    Truncated { declared: usize, received: usize },

    /// Length prefix smaller than a message header
    #[error("Invalid message length {0}")]
    InvalidLength(i32),

    /// Message too large
    #[error("Message of {0} bytes exceeds the maximum message size")]
    MessageTooLarge(usize),

    /// Protocol violation inside a well-framed message
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Malformed document: {0}")]
    Decode(#[from] bson::de::Error),

    #[error("Unable to encode document: {0}")]
    Encode(#[from] bson::ser::Error),

    /// Database operation error
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// Connection or I/O error
    #[error("Connection error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DriverResult<T> = Result<T, DriverError>;

impl DriverError {
    /// Fatal errors end the connection without a reply
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DriverError::Coalesced { .. }
                | DriverError::Truncated { .. }
                | DriverError::InvalidLength(_)
                | DriverError::MessageTooLarge(_)
                | DriverError::Io(_)
        )
    }

    pub fn code(&self) -> i32 {
        match self {
            DriverError::ProtocolError(_) => 9,
            DriverError::Decode(_) => 22,
            DriverError::MessageTooLarge(_) => 10334,
            DriverError::Database(e) => e.code(),
            _ => 1,
        }
    }

    pub fn code_name(&self) -> &'static str {
        match self {
            DriverError::ProtocolError(_) => "FailedToParse",
            DriverError::Decode(_) => "InvalidBSON",
            DriverError::MessageTooLarge(_) => "BSONObjectTooLarge",
            DriverError::Database(e) => e.code_name(),
            _ => "InternalError",
        }
    }
}
