use bson::{doc, Bson, Document};

use super::{command_key, set_n, set_ok, DriverHandler};
use crate::driver::binding::ResolvedTable;
use crate::driver::bulk::insert_rows;
use crate::driver::filter::Filter;
use crate::driver::protocol::{DriverError, DriverResult, Payload};
use crate::driver::row_codec::{to_document, to_row};
use crate::storage::{KeyRange, Session};

/// Identifier of the kind-1 section carrying inserted documents
pub const DOCUMENTS_SEQUENCE: &str = "documents";

/// Documents of the array stored under `key`; every entry must be a document
fn document_array<'a>(command: &'a Document, key: &str) -> DriverResult<Vec<&'a Document>> {
    match command.get(key) {
        None => Ok(Vec::new()),
        Some(Bson::Array(items)) => items
            .iter()
            .map(|item| match item {
                Bson::Document(doc) => Ok(doc),
                other => Err(DriverError::ProtocolError(format!(
                    "'{}' entries must be documents, got {}",
                    key, other
                ))),
            })
            .collect(),
        Some(other) => Err(DriverError::ProtocolError(format!(
            "'{}' must be an array, got {}",
            key, other
        ))),
    }
}

/// Non-negative integer option such as `skip`; absent means 0
fn count_option(command: &Document, key: &str) -> DriverResult<usize> {
    let value = match command.get(key) {
        None | Some(Bson::Null) => return Ok(0),
        Some(Bson::Int32(v)) => *v as i64,
        Some(Bson::Int64(v)) => *v,
        Some(Bson::Double(v)) if v.fract() == 0.0 => *v as i64,
        Some(other) => {
            return Err(DriverError::ProtocolError(format!(
                "'{}' must be an integer, got {}",
                key, other
            )))
        }
    };
    usize::try_from(value)
        .map_err(|_| DriverError::ProtocolError(format!("'{}' must not be negative", key)))
}

/// Decode matching rows of a table, honouring `skip` and `limit` (0 = all)
fn collect_matches(
    resolved: &ResolvedTable,
    session: &Session,
    filter: &Filter,
    skip: usize,
    limit: usize,
) -> DriverResult<Vec<Document>> {
    let mut matches = Vec::new();
    let mut skipped = 0;
    for row in resolved.table.scan(session, filter.key_range())? {
        let document = to_document(&row)?;
        if !filter.matches(&document) {
            continue;
        }
        if skipped < skip {
            skipped += 1;
            continue;
        }
        matches.push(document);
        if limit > 0 && matches.len() >= limit {
            break;
        }
    }
    Ok(matches)
}

pub async fn handle_insert(
    handler: &DriverHandler,
    command: &Document,
    mut payload: Payload<'_>,
) -> DriverResult<Document> {
    let resolved = handler.resolver.resolve(command, command_key(command))?;
    let mut documents: Vec<Document> = document_array(command, DOCUMENTS_SEQUENCE)?
        .into_iter()
        .cloned()
        .collect();

    while payload.has_remaining() {
        let sequence = payload.next_sequence()?;
        if sequence.identifier == DOCUMENTS_SEQUENCE {
            documents.extend(sequence.documents);
        } else {
            tracing::debug!(
                "Skipping document sequence '{}' for insert into {}",
                sequence.identifier,
                resolved.ns()
            );
        }
    }

    let lease = handler.sessions.acquire(command, &resolved.database)?;
    let column = resolved.table.column().clone();
    let outcome = insert_rows(
        &resolved.table,
        lease.session(),
        documents.iter().map(|doc| to_row(doc, &column)),
    )
    .await;
    tracing::debug!(
        "Insert into {}: {} of {} documents submitted, committed: {}",
        resolved.ns(),
        outcome.submitted,
        documents.len(),
        outcome.committed
    );

    let mut reply = Document::new();
    set_ok(&mut reply);
    set_n(&mut reply, outcome.submitted);
    Ok(reply)
}

pub fn handle_find(handler: &DriverHandler, command: &Document) -> DriverResult<Document> {
    let resolved = handler.resolver.resolve(command, command_key(command))?;
    let filter = Filter::from_command(command, "filter");
    let skip = count_option(command, "skip")?;
    let limit = count_option(command, "limit")?;

    let lease = handler.sessions.acquire(command, &resolved.database)?;
    let batch = collect_matches(&resolved, lease.session(), &filter, skip, limit)?;
    lease.commit()?;

    let first_batch: Vec<Bson> = batch.into_iter().map(Bson::Document).collect();
    let mut reply = doc! {
        "cursor": {
            "id": 0i64,
            "ns": resolved.ns(),
            "firstBatch": first_batch,
        },
    };
    set_ok(&mut reply);
    Ok(reply)
}

/// Accepts the update wire shape without modifying anything
pub fn handle_update(command: &Document) -> DriverResult<Document> {
    for update in document_array(command, "updates")? {
        match update.get("u") {
            Some(Bson::Document(_)) | Some(Bson::Array(_)) => {
                tracing::debug!("Update not applied: {}", update);
            }
            _ => tracing::debug!("Skipping update entry without 'u': {}", update),
        }
    }
    let mut reply = Document::new();
    set_ok(&mut reply);
    set_n(&mut reply, 0);
    Ok(reply)
}

/// Removes every row of the collection; delete filters are not applied
pub fn handle_delete(handler: &DriverHandler, command: &Document) -> DriverResult<Document> {
    let resolved = handler.resolver.resolve(command, command_key(command))?;
    for delete in document_array(command, "deletes")? {
        if matches!(delete.get("q"), Some(Bson::Document(q)) if !q.is_empty()) {
            tracing::debug!("Delete filter ignored on {}: {}", resolved.ns(), delete);
        }
    }

    let lease = handler.sessions.acquire(command, &resolved.database)?;
    let mut n = 0;
    for row in resolved.table.scan(lease.session(), KeyRange::all())? {
        resolved.table.remove_row(lease.session(), &row)?;
        n += 1;
    }
    lease.commit()?;

    let mut reply = Document::new();
    set_ok(&mut reply);
    set_n(&mut reply, n);
    Ok(reply)
}

pub fn handle_count(handler: &DriverHandler, command: &Document) -> DriverResult<Document> {
    let resolved = handler.resolver.resolve(command, command_key(command))?;
    let filter = Filter::from_command(command, "query");
    let skip = count_option(command, "skip")?;
    let limit = count_option(command, "limit")?;

    let lease = handler.sessions.acquire(command, &resolved.database)?;
    let n = if filter.is_empty() && skip == 0 && limit == 0 {
        resolved.table.row_count(lease.session())? as usize
    } else {
        collect_matches(&resolved, lease.session(), &filter, skip, limit)?.len()
    };
    lease.commit()?;

    let mut reply = Document::new();
    set_n(&mut reply, n);
    set_ok(&mut reply);
    Ok(reply)
}
