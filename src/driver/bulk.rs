//! Bulk insert
//!
//! Each row is submitted as its own insert future. Completed futures are
//! drained before every new submission so a failure stops further
//! submissions. An [`InsertBarrier`] elects the single terminator of the
//! session: the last success commits, the first failure rolls back.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;

use crate::error::DbResult;
use crate::storage::{Row, Session, Table};

/// Counting barrier over the inserts of one bulk command
#[derive(Debug)]
pub struct InsertBarrier {
    remaining: AtomicUsize,
    failed: AtomicBool,
}

impl InsertBarrier {
    pub fn new(expected: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(expected),
            failed: AtomicBool::new(false),
        }
    }

    /// Record a successful insert. Returns true for the caller that must commit.
    pub fn complete(&self) -> bool {
        if self.is_failed() {
            return false;
        }
        self.remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Record a failed insert. Returns true for the caller that must roll back.
    pub fn fail(&self) -> bool {
        !self.failed.swap(true, Ordering::AcqRel)
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

/// Result of a bulk insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Rows handed to the table, including the one that failed
    pub submitted: usize,
    pub committed: bool,
}

struct Terminator<'a> {
    barrier: InsertBarrier,
    session: &'a Session,
    table: &'a str,
    committed: bool,
}

impl Terminator<'_> {
    fn settle(&mut self, result: DbResult<()>) {
        match result {
            Ok(()) => {
                if self.barrier.complete() {
                    match self.session.commit() {
                        Ok(()) => self.committed = true,
                        Err(e) => tracing::warn!("Bulk insert into {} failed to commit: {}", self.table, e),
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Bulk insert into {} failed: {}", self.table, e);
                if self.barrier.fail() {
                    if let Err(e) = self.session.rollback() {
                        tracing::warn!("Rollback of bulk insert into {} failed: {}", self.table, e);
                    }
                }
            }
        }
    }
}

/// Insert `rows` into `table` on `session`, committing only if all succeed
pub async fn insert_rows<I>(table: &Arc<Table>, session: &Arc<Session>, rows: I) -> BulkOutcome
where
    I: IntoIterator<Item = DbResult<Row>>,
{
    let rows: Vec<DbResult<Row>> = rows.into_iter().collect();
    let mut terminator = Terminator {
        barrier: InsertBarrier::new(rows.len()),
        session: session.as_ref(),
        table: table.name(),
        committed: false,
    };

    if rows.is_empty() {
        let committed = match session.commit() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Empty insert into {} failed to commit: {}", table.name(), e);
                false
            }
        };
        return BulkOutcome {
            submitted: 0,
            committed,
        };
    }

    let mut in_flight = FuturesUnordered::new();
    let mut submitted = 0;
    for row in rows {
        while let Some(Some(result)) = in_flight.next().now_or_never() {
            terminator.settle(result);
        }
        if terminator.barrier.is_failed() {
            break;
        }
        submitted += 1;
        match row {
            Ok(row) => in_flight.push(table.add_row(session, row)),
            Err(e) => {
                terminator.settle(Err(e));
                break;
            }
        }
    }

    while let Some(result) = in_flight.next().await {
        terminator.settle(result);
    }

    BulkOutcome {
        submitted,
        committed: terminator.committed,
    }
}
