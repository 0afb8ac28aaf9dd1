use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("Database '{0}' is not initialized")]
    DatabaseNotInitialized(String),

    #[error("Schema '{0}' not found")]
    SchemaNotFound(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Duplicate key {key} in table '{table}'")]
    DuplicateKey { table: String, key: i64 },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Session {0} is closed")]
    SessionClosed(u64),

    #[error("Database '{0}' has no principal to open a session with")]
    NoPrincipal(String),

    #[error("Invalid row: {0}")]
    InvalidRow(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Numeric code reported to wire clients when this error reaches a reply
    pub fn code(&self) -> i32 {
        match self {
            DbError::DatabaseNotFound(_) | DbError::TableNotFound(_) => 26,
            DbError::SchemaNotFound(_) => 26,
            DbError::DuplicateKey { .. } => 11000,
            DbError::TypeMismatch(_) | DbError::InvalidRow(_) => 14,
            DbError::SessionClosed(_) => 206,
            DbError::NoPrincipal(_) => 13,
            DbError::DatabaseNotInitialized(_) | DbError::InternalError(_) => 1,
        }
    }

    pub fn code_name(&self) -> &'static str {
        match self.code() {
            26 => "NamespaceNotFound",
            11000 => "DuplicateKey",
            14 => "TypeMismatch",
            206 => "NoSuchSession",
            13 => "Unauthorized",
            _ => "InternalError",
        }
    }
}
