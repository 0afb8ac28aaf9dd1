use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::session::Session;
use super::table::Table;
use super::value::ColumnSpec;
use crate::error::{DbError, DbResult};

/// The only logical schema tables are created in
pub const SCHEMA_MAIN: &str = "main";

/// A principal sessions are opened on behalf of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub admin: bool,
}

/// Represents a database that contains multiple tables
pub struct Database {
    /// Database name
    pub name: String,
    /// Admin principal registered by `init`
    bootstrap_user: String,
    initialized: AtomicBool,
    /// Users in creation order
    users: RwLock<Vec<User>>,
    tables: RwLock<HashMap<String, Arc<Table>>>,
    /// Shared with the engine so session ids are unique process-wide
    session_ids: Arc<AtomicU64>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl Database {
    pub(crate) fn new(name: String, bootstrap_user: String, session_ids: Arc<AtomicU64>) -> Self {
        Self {
            name,
            bootstrap_user,
            initialized: AtomicBool::new(false),
            users: RwLock::new(Vec::new()),
            tables: RwLock::new(HashMap::new()),
            session_ids,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Register the bootstrap admin and mark the database usable. Idempotent.
    pub fn init(&self) -> DbResult<()> {
        let mut users = self.users.write();
        if self.is_initialized() {
            return Ok(());
        }
        if !users.iter().any(|u| u.name == self.bootstrap_user) {
            users.insert(
                0,
                User {
                    name: self.bootstrap_user.clone(),
                    admin: true,
                },
            );
        }
        self.initialized.store(true, Ordering::Release);
        tracing::info!("Database '{}' initialized", self.name);
        Ok(())
    }

    fn ensure_initialized(&self) -> DbResult<()> {
        if !self.is_initialized() {
            return Err(DbError::DatabaseNotInitialized(self.name.clone()));
        }
        Ok(())
    }

    fn check_schema(schema: &str) -> DbResult<()> {
        if schema != SCHEMA_MAIN {
            return Err(DbError::SchemaNotFound(schema.to_string()));
        }
        Ok(())
    }

    /// Look up a table without creating it
    pub fn find_table(&self, schema: &str, name: &str) -> DbResult<Option<Arc<Table>>> {
        Self::check_schema(schema)?;
        Ok(self.tables.read().get(name).cloned())
    }

    /// `CREATE TABLE IF NOT EXISTS`. Racing callers all receive the same table.
    pub fn find_or_create_table(
        &self,
        schema: &str,
        name: &str,
        column: ColumnSpec,
    ) -> DbResult<Arc<Table>> {
        Self::check_schema(schema)?;
        self.ensure_initialized()?;
        if let Some(table) = self.tables.read().get(name) {
            return Ok(table.clone());
        }

        let mut tables = self.tables.write();
        let table = tables.entry(name.to_string()).or_insert_with(|| {
            tracing::info!(
                "Creating table {}.{}.{} ({} {:?})",
                self.name,
                schema,
                name,
                column.name,
                column.kind
            );
            Arc::new(Table::new(self.name.clone(), name.to_string(), column))
        });
        Ok(table.clone())
    }

    /// `DROP TABLE IF EXISTS`. Returns whether a table was dropped.
    pub fn drop_table_if_exists(&self, schema: &str, name: &str) -> DbResult<bool> {
        Self::check_schema(schema)?;
        let removed = self.tables.write().remove(name);
        match removed {
            Some(table) => {
                table.mark_dropped();
                tracing::info!("Dropped table {}.{}.{}", self.name, schema, name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// List all table names, sorted
    pub fn list_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn create_user(&self, name: &str, admin: bool) -> User {
        let user = User {
            name: name.to_string(),
            admin,
        };
        let mut users = self.users.write();
        if let Some(existing) = users.iter().find(|u| u.name == name) {
            return existing.clone();
        }
        users.push(user.clone());
        user
    }

    /// All principals in creation order
    pub fn all_users(&self) -> Vec<User> {
        self.users.read().clone()
    }

    pub fn create_session(&self, user: &User) -> DbResult<Arc<Session>> {
        self.ensure_initialized()?;
        let id = self.session_ids.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            "Opening session {} on '{}' as '{}'",
            id,
            self.name,
            user.name
        );
        Ok(Arc::new(Session::new(id, self.name.clone(), user.name.clone())))
    }
}
