pub mod database;
pub mod engine;
pub mod session;
pub mod table;
pub mod value;

pub use database::{Database, User, SCHEMA_MAIN};
pub use engine::{StorageEngine, DEFAULT_ADMIN_USER};
pub use session::Session;
pub use table::{RowCursor, Table, TableStatsSnapshot};
pub use value::{ColumnKind, ColumnSpec, KeyRange, Row, RowId, Value};
