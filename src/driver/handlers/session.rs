use bson::{doc, Document};

use super::{ok_document, set_ok, DriverHandler};
use crate::driver::protocol::DriverResult;
use crate::driver::sessions::{listed_tokens, token_to_bson};

pub fn handle_start_session(
    handler: &mut DriverHandler,
    command: &Document,
) -> DriverResult<Document> {
    let database = handler.resolver.database(command)?;
    let token = handler.sessions.start(&database)?;
    tracing::debug!(
        "[conn {}] started session {} on '{}'",
        handler.connection_id,
        token,
        database.name
    );

    let mut reply = doc! {
        "id": token_to_bson(&token),
        "timeoutMinutes": handler.options.session_timeout_minutes,
    };
    set_ok(&mut reply);
    Ok(reply)
}

/// `killSessions` / `endSessions`: forget each listed token and close its session
pub fn handle_end_sessions(handler: &mut DriverHandler, command: &Document) -> Document {
    for token in listed_tokens(command) {
        if !handler.sessions.end(&token) {
            tracing::debug!("No session for token {}", token);
        }
    }
    ok_document()
}

/// `refreshSessions` closes each listed session but keeps its token registered
pub fn handle_refresh_sessions(handler: &mut DriverHandler, command: &Document) -> Document {
    for token in listed_tokens(command) {
        handler.sessions.refresh(&token);
    }
    ok_document()
}
