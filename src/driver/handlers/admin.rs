use bson::{doc, Document};

use super::{command_key, ok_document, set_n, set_ok, set_wire_version, DriverHandler};
use crate::driver::protocol::{
    DriverResult, OpQuery, FEATURE_COMPATIBILITY_VERSION, LEGACY_MAX_WIRE_VERSION,
    LEGACY_MIN_WIRE_VERSION, MAX_BSON_OBJECT_SIZE, MAX_WRITE_BATCH_SIZE, SERVER_VERSION,
};
use crate::driver::binding::collection_name;
use crate::storage::SCHEMA_MAIN;

pub fn handle_hello(handler: &DriverHandler) -> Document {
    let mut reply = doc! {
        "ismaster": true,
        "connectionId": handler.connection_id,
        "readOnly": false,
    };
    set_wire_version(&mut reply);
    set_ok(&mut reply);
    reply.insert("isWritablePrimary", true);
    reply.insert("maxBsonObjectSize", MAX_BSON_OBJECT_SIZE);
    reply.insert(
        "maxMessageSizeBytes",
        i32::try_from(handler.options.max_message_size).unwrap_or(i32::MAX),
    );
    reply.insert("maxWriteBatchSize", MAX_WRITE_BATCH_SIZE);
    reply.insert("localTime", bson::DateTime::now());
    reply.insert(
        "logicalSessionTimeoutMinutes",
        handler.options.session_timeout_minutes,
    );
    reply
}

pub fn handle_build_info() -> Document {
    let mut reply = doc! { "version": SERVER_VERSION };
    set_ok(&mut reply);
    reply
}

pub fn handle_get_parameter() -> Document {
    let mut reply = doc! {
        "featureCompatibilityVersion": { "version": FEATURE_COMPATIBILITY_VERSION },
    };
    set_ok(&mut reply);
    reply
}

pub fn handle_drop(handler: &DriverHandler, command: &Document) -> DriverResult<Document> {
    let collection = collection_name(command, command_key(command))?;
    let database = handler.resolver.database(command)?;
    if !database.drop_table_if_exists(SCHEMA_MAIN, collection)? {
        tracing::debug!("Drop of missing collection {}.{}", database.name, collection);
    }
    Ok(ok_document())
}

/// Reply to a command name outside the known set
pub fn handle_unknown(name: &str) -> Document {
    tracing::debug!("Unknown command '{}', replying with a stub", name);
    let mut reply = Document::new();
    set_wire_version(&mut reply);
    set_ok(&mut reply);
    set_n(&mut reply, 0);
    reply
}

/// Legacy OP_QUERY (the handshake of old drivers): parsed, logged and answered
/// with the legacy wire version range
pub fn handle_legacy_query(body: &[u8]) -> DriverResult<Document> {
    let query = OpQuery::parse(body)?;
    tracing::debug!("query on {}: {}", query.full_collection_name, query.query);
    if let Some(selector) = &query.return_fields_selector {
        tracing::debug!("returnFieldsSelector: {}", selector);
    }

    let mut reply = doc! {
        "minWireVersion": LEGACY_MIN_WIRE_VERSION,
        "maxWireVersion": LEGACY_MAX_WIRE_VERSION,
    };
    set_ok(&mut reply);
    set_n(&mut reply, 1);
    Ok(reply)
}
