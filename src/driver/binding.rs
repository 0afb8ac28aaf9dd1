//! Table binding
//!
//! Maps the `(database, collection)` pair named by a command onto the backing
//! table in schema `main`, creating the database and the table on first use.

use std::sync::Arc;

use bson::{Bson, Document};

use super::protocol::{DriverError, DriverResult};
use super::row_codec::StorageFormat;
use crate::storage::{Database, StorageEngine, Table, SCHEMA_MAIN};

/// Key naming the target database of a command
pub const DATABASE_KEY: &str = "$db";

/// A collection resolved to its backing table
#[derive(Debug, Clone)]
pub struct ResolvedTable {
    pub database: Arc<Database>,
    pub collection: String,
    pub table: Arc<Table>,
}

impl ResolvedTable {
    /// Namespace string `db.collection`
    pub fn ns(&self) -> String {
        format!("{}.{}", self.database.name, self.collection)
    }
}

#[derive(Debug, Clone)]
pub struct TableResolver {
    storage: Arc<StorageEngine>,
    default_database: String,
    format: StorageFormat,
}

impl TableResolver {
    pub fn new(
        storage: Arc<StorageEngine>,
        default_database: impl Into<String>,
        format: StorageFormat,
    ) -> Self {
        Self {
            storage,
            default_database: default_database.into(),
            format,
        }
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    pub fn format(&self) -> StorageFormat {
        self.format
    }

    /// `$db` of the command, or the configured default
    pub fn database_name<'a>(&'a self, command: &'a Document) -> &'a str {
        match command.get(DATABASE_KEY) {
            Some(Bson::String(name)) if !name.is_empty() => name,
            _ => &self.default_database,
        }
    }

    /// Find or create the database named by the command and make sure it is
    /// initialized
    pub fn database(&self, command: &Document) -> DriverResult<Arc<Database>> {
        let db = self
            .storage
            .find_or_create_database(self.database_name(command));
        if !db.is_initialized() {
            db.init()?;
        }
        Ok(db)
    }

    /// Resolve the collection named by `command[key]` to its table
    pub fn resolve(&self, command: &Document, key: &str) -> DriverResult<ResolvedTable> {
        let collection = collection_name(command, key)?.to_string();
        let database = self.database(command)?;
        let table = database.find_or_create_table(SCHEMA_MAIN, &collection, self.format.column())?;
        Ok(ResolvedTable {
            database,
            collection,
            table,
        })
    }
}

/// Collection name stored under `key`
pub fn collection_name<'a>(command: &'a Document, key: &str) -> DriverResult<&'a str> {
    match command.get(key) {
        Some(Bson::String(name)) if !name.is_empty() => Ok(name),
        Some(other) => Err(DriverError::ProtocolError(format!(
            "collection name for '{}' must be a non-empty string, got {}",
            key, other
        ))),
        None => Err(DriverError::ProtocolError(format!(
            "missing collection name for '{}'",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn resolver() -> TableResolver {
        TableResolver::new(Arc::new(StorageEngine::default()), "docdb", StorageFormat::Map)
    }

    #[test]
    fn test_database_name_defaults() {
        let resolver = resolver();
        assert_eq!(resolver.database_name(&doc! { "find": "c1", "$db": "db1" }), "db1");
        assert_eq!(resolver.database_name(&doc! { "find": "c1" }), "docdb");
        assert_eq!(resolver.database_name(&doc! { "find": "c1", "$db": 3i32 }), "docdb");
    }

    #[test]
    fn test_resolve_creates_database_and_table_once() {
        let resolver = resolver();
        let command = doc! { "insert": "c1", "$db": "db1" };
        let first = resolver.resolve(&command, "insert").unwrap();
        let second = resolver.resolve(&command, "insert").unwrap();

        assert!(Arc::ptr_eq(&first.table, &second.table));
        assert!(first.database.is_initialized());
        assert_eq!(first.ns(), "db1.c1");
        assert_eq!(first.database.list_tables(), vec!["c1".to_string()]);
        assert_eq!(resolver.storage().list_databases(), vec!["db1".to_string()]);
    }

    #[test]
    fn test_resolve_rejects_bad_collection_names() {
        let resolver = resolver();
        assert!(resolver.resolve(&doc! { "find": 1i32 }, "find").is_err());
        assert!(resolver.resolve(&doc! { "find": "" }, "find").is_err());
        assert!(resolver.resolve(&doc! { "other": "c1" }, "find").is_err());
    }
}
