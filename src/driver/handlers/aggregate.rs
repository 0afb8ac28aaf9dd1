use bson::{doc, Bson, Document};

use super::{command_key, set_ok, DriverHandler};
use crate::driver::protocol::DriverResult;

/// Whether a pipeline stage is `{$group: {n: {$sum: ...}}}`
fn is_count_stage(stage: &Bson) -> bool {
    let Bson::Document(stage) = stage else {
        return false;
    };
    match stage.get("$group") {
        Some(Bson::Document(group)) => {
            matches!(group.get("n"), Some(Bson::Document(acc)) if acc.contains_key("$sum"))
        }
        _ => false,
    }
}

/// Only row counting is supported: a pipeline containing a `$group` stage that
/// sums into `n` yields the table's row count, anything else yields zero.
pub fn handle_aggregate(handler: &DriverHandler, command: &Document) -> DriverResult<Document> {
    let resolved = handler.resolver.resolve(command, command_key(command))?;

    let counts_rows = match command.get("pipeline") {
        Some(Bson::Array(stages)) => stages.iter().any(is_count_stage),
        _ => false,
    };

    let row_count = if counts_rows {
        let lease = handler.sessions.acquire(command, &resolved.database)?;
        resolved.table.row_count(lease.session())?
    } else {
        tracing::debug!("Unsupported pipeline on {}, returning 0", resolved.ns());
        0
    };

    let result = doc! { "_id": 1i32, "n": i32::try_from(row_count).unwrap_or(i32::MAX) };
    let mut reply = doc! {
        "cursor": {
            "id": 0i64,
            "ns": resolved.ns(),
            "firstBatch": [result],
        },
    };
    set_ok(&mut reply);
    Ok(reply)
}
