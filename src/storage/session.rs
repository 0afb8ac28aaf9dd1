use parking_lot::{Mutex, RwLockWriteGuard};
use std::sync::Arc;

use super::table::{Table, TableData};
use super::value::{Row, RowId};
use crate::error::{DbError, DbResult};

/// A write buffered by a session until commit
pub(crate) enum PendingWrite {
    Insert { table: Arc<Table>, row: Row },
    Delete { table: Arc<Table>, id: RowId },
}

impl PendingWrite {
    fn table(&self) -> &Arc<Table> {
        match self {
            PendingWrite::Insert { table, .. } | PendingWrite::Delete { table, .. } => table,
        }
    }
}

#[derive(Default)]
struct SessionState {
    pending: Vec<PendingWrite>,
    closed: bool,
}

/// Transactional context bound to one database and one principal.
///
/// Writes staged through [`Table::add_row`] and [`Table::remove_row`] stay
/// invisible to readers until [`Session::commit`] applies them atomically.
pub struct Session {
    id: u64,
    database: String,
    user: String,
    state: Mutex<SessionState>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("database", &self.database)
            .field("user", &self.user)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(id: u64, database: String, user: String) -> Self {
        Self {
            id,
            database,
            user,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Name of the database this session is bound to
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of writes staged and not yet committed
    pub fn pending_writes(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub(crate) fn ensure_open(&self) -> DbResult<()> {
        if self.state.lock().closed {
            return Err(DbError::SessionClosed(self.id));
        }
        Ok(())
    }

    pub(crate) fn stage_insert(&self, table: Arc<Table>, row: Row) -> DbResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DbError::SessionClosed(self.id));
        }
        if let Some(key) = row.key {
            let duplicate = state.pending.iter().any(|w| match w {
                PendingWrite::Insert { table: t, row: r } => t.id() == table.id() && r.key == Some(key),
                PendingWrite::Delete { .. } => false,
            });
            if duplicate {
                return Err(DbError::DuplicateKey {
                    table: table.name().to_string(),
                    key,
                });
            }
        }
        state.pending.push(PendingWrite::Insert { table, row });
        Ok(())
    }

    pub(crate) fn stage_delete(&self, table: Arc<Table>, id: RowId) -> DbResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DbError::SessionClosed(self.id));
        }
        state.pending.push(PendingWrite::Delete { table, id });
        Ok(())
    }

    /// Apply every staged write. Either all writes land or none do; on a
    /// conflict the staged writes are discarded.
    pub fn commit(&self) -> DbResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DbError::SessionClosed(self.id));
        }
        let writes = std::mem::take(&mut state.pending);
        if writes.is_empty() {
            return Ok(());
        }

        // Lock every touched table in id order so concurrent commits cannot deadlock
        let mut tables: Vec<Arc<Table>> = writes.iter().map(|w| w.table().clone()).collect();
        tables.sort_by_key(|t| t.id());
        tables.dedup_by_key(|t| t.id());
        let mut guards: Vec<RwLockWriteGuard<'_, TableData>> =
            tables.iter().map(|t| t.data.write()).collect();
        let slot = |table: &Arc<Table>| tables.iter().position(|t| t.id() == table.id());

        for write in &writes {
            let table = write.table();
            if table.is_dropped() {
                return Err(DbError::TableNotFound(table.name().to_string()));
            }
            if let PendingWrite::Insert { row, .. } = write {
                if let (Some(key), Some(idx)) = (row.key, slot(table)) {
                    if guards[idx].contains_key(key) {
                        return Err(DbError::DuplicateKey {
                            table: table.name().to_string(),
                            key,
                        });
                    }
                }
            }
        }

        let count = writes.len();
        for write in writes {
            match write {
                PendingWrite::Insert { table, row } => {
                    if let Some(idx) = slot(&table) {
                        guards[idx].insert(row);
                    }
                }
                PendingWrite::Delete { table, id } => {
                    if let Some(idx) = slot(&table) {
                        guards[idx].remove(id);
                    }
                }
            }
        }

        tracing::debug!("Session {} committed {} writes", self.id, count);
        Ok(())
    }

    /// Discard every staged write
    pub fn rollback(&self) -> DbResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(DbError::SessionClosed(self.id));
        }
        let discarded = state.pending.len();
        state.pending.clear();
        tracing::debug!("Session {} rolled back {} writes", self.id, discarded);
        Ok(())
    }

    /// Roll back and mark the session unusable. Closing twice is a no-op.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.pending.clear();
            state.closed = true;
            tracing::debug!("Session {} closed", self.id);
        }
    }
}
