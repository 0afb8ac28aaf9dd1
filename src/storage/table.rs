use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::future::Future;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::session::Session;
use super::value::{ColumnKind, ColumnSpec, KeyRange, Row, RowId};
use crate::error::{DbError, DbResult};

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

/// Committed rows plus the identity index over them
#[derive(Default)]
pub(crate) struct TableData {
    rows: BTreeMap<RowId, Row>,
    keys: BTreeMap<i64, RowId>,
}

impl TableData {
    pub(crate) fn contains_key(&self, key: i64) -> bool {
        self.keys.contains_key(&key)
    }

    pub(crate) fn insert(&mut self, row: Row) {
        if let Some(key) = row.key {
            self.keys.insert(key, row.id);
        }
        self.rows.insert(row.id, row);
    }

    pub(crate) fn remove(&mut self, id: RowId) {
        if let Some(row) = self.rows.remove(&id) {
            if let Some(key) = row.key {
                self.keys.remove(&key);
            }
        }
    }

    fn clear(&mut self) {
        self.rows.clear();
        self.keys.clear();
    }
}

#[derive(Debug, Default)]
struct TableStats {
    full_scans: AtomicU64,
    keyed_lookups: AtomicU64,
}

/// Point-in-time copy of a table's access counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStatsSnapshot {
    pub full_scans: u64,
    pub keyed_lookups: u64,
}

/// A table with a single document column and an optional integer identity
pub struct Table {
    id: u64,
    name: String,
    database: String,
    column: ColumnSpec,
    pub(crate) data: RwLock<TableData>,
    next_row_id: AtomicU64,
    dropped: AtomicBool,
    stats: TableStats,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.id)
            .field("database", &self.database)
            .field("name", &self.name)
            .field("column", &self.column)
            .finish()
    }
}

impl Table {
    pub(crate) fn new(database: String, name: String, column: ColumnSpec) -> Self {
        Self {
            id: NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed),
            name,
            database,
            column,
            data: RwLock::new(TableData::default()),
            next_row_id: AtomicU64::new(1),
            dropped: AtomicBool::new(false),
            stats: TableStats::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the owning database
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn column(&self) -> &ColumnSpec {
        &self.column
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dropped(&self) {
        self.dropped.store(true, Ordering::Release);
        self.data.write().clear();
    }

    pub fn stats(&self) -> TableStatsSnapshot {
        TableStatsSnapshot {
            full_scans: self.stats.full_scans.load(Ordering::Relaxed),
            keyed_lookups: self.stats.keyed_lookups.load(Ordering::Relaxed),
        }
    }

    fn ensure_live(&self) -> DbResult<()> {
        if self.is_dropped() {
            return Err(DbError::TableNotFound(self.name.clone()));
        }
        Ok(())
    }

    fn check_kind(&self, row: &Row) -> DbResult<()> {
        if row.value.kind() != self.column.kind || self.column.kind == ColumnKind::Other {
            return Err(DbError::TypeMismatch(format!(
                "column '{}' of table '{}' expects {:?}, got {:?}",
                self.column.name,
                self.name,
                self.column.kind,
                row.value.kind()
            )));
        }
        Ok(())
    }

    /// Open a cursor over committed rows. An unbounded range walks the whole
    /// table; a bounded one only visits rows whose identity falls inside it.
    pub fn scan(&self, session: &Session, range: KeyRange) -> DbResult<RowCursor> {
        session.ensure_open()?;
        self.ensure_live()?;
        let data = self.data.read();
        let rows: Vec<Row> = if range.is_unbounded() {
            self.stats.full_scans.fetch_add(1, Ordering::Relaxed);
            data.rows.values().cloned().collect()
        } else {
            self.stats.keyed_lookups.fetch_add(1, Ordering::Relaxed);
            let low = range.low.map_or(Bound::Unbounded, Bound::Included);
            let high = range.high.map_or(Bound::Unbounded, Bound::Included);
            if matches!((low, high), (Bound::Included(l), Bound::Included(h)) if l > h) {
                Vec::new()
            } else {
                data.keys
                    .range((low, high))
                    .filter_map(|(_, id)| data.rows.get(id).cloned())
                    .collect()
            }
        };
        Ok(RowCursor::new(rows))
    }

    /// Stage a row insert in `session`. The returned future owns everything
    /// it needs, so callers may hold many of them at once.
    pub fn add_row(
        self: &Arc<Self>,
        session: &Arc<Session>,
        mut row: Row,
    ) -> impl Future<Output = DbResult<()>> + Send + 'static {
        let table = Arc::clone(self);
        let session = Arc::clone(session);
        async move {
            session.ensure_open()?;
            table.ensure_live()?;
            table.check_kind(&row)?;
            if let Some(key) = row.key {
                if table.data.read().contains_key(key) {
                    return Err(DbError::DuplicateKey {
                        table: table.name.clone(),
                        key,
                    });
                }
            }
            row.id = table.next_row_id.fetch_add(1, Ordering::Relaxed);
            session.stage_insert(table, row)
        }
    }

    /// Stage removal of a row previously returned by [`Table::scan`]
    pub fn remove_row(self: &Arc<Self>, session: &Session, row: &Row) -> DbResult<()> {
        self.ensure_live()?;
        session.stage_delete(Arc::clone(self), row.id)
    }

    /// Number of committed rows
    pub fn row_count(&self, session: &Session) -> DbResult<u64> {
        session.ensure_open()?;
        self.ensure_live()?;
        Ok(self.data.read().rows.len() as u64)
    }
}

/// Materialized result of a table scan
#[derive(Debug)]
pub struct RowCursor {
    rows: std::vec::IntoIter<Row>,
}

impl RowCursor {
    fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }
}

impl Iterator for RowCursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}
