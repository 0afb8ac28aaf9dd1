use dashmap::DashMap;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use super::database::Database;

/// Principal registered in every new database
pub const DEFAULT_ADMIN_USER: &str = "root";

/// In-process tabular storage engine: a set of named databases
pub struct StorageEngine {
    databases: DashMap<String, Arc<Database>>,
    admin_user: String,
    session_ids: Arc<AtomicU64>,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("databases", &self.databases.len())
            .field("admin_user", &self.admin_user)
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new(DEFAULT_ADMIN_USER)
    }
}

impl StorageEngine {
    /// Create an engine whose databases bootstrap `admin_user` as their admin
    pub fn new(admin_user: impl Into<String>) -> Self {
        Self {
            databases: DashMap::new(),
            admin_user: admin_user.into(),
            session_ids: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn find_database(&self, name: &str) -> Option<Arc<Database>> {
        self.databases.get(name).map(|db| db.value().clone())
    }

    /// `CREATE DATABASE IF NOT EXISTS`. The returned database may still need `init`.
    pub fn find_or_create_database(&self, name: &str) -> Arc<Database> {
        if let Some(db) = self.find_database(name) {
            return db;
        }
        self.databases
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!("Creating database '{}'", name);
                Arc::new(Database::new(
                    name.to_string(),
                    self.admin_user.clone(),
                    self.session_ids.clone(),
                ))
            })
            .value()
            .clone()
    }

    /// List all database names, sorted
    pub fn list_databases(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}
