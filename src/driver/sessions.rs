//! Per-connection session registry
//!
//! A connection owns its token -> session map exclusively, so no locking is
//! needed. Commands that do not carry a usable `lsid` run on a default session
//! that lives for that one command.

use std::collections::HashMap;
use std::sync::Arc;

use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::storage::{Database, Session, User};

/// Key under which drivers attach the logical session id to a command
pub const LSID_KEY: &str = "lsid";

/// Principal used for gateway sessions: the first admin, else the first user
pub fn select_principal(db: &Database) -> DbResult<User> {
    let users = db.all_users();
    if let Some(admin) = users.iter().find(|u| u.admin) {
        return Ok(admin.clone());
    }
    users
        .into_iter()
        .next()
        .ok_or_else(|| DbError::NoPrincipal(db.name.clone()))
}

/// Encode a session token as a UUID binary value
pub fn token_to_bson(token: &Uuid) -> Bson {
    Bson::Binary(Binary {
        subtype: BinarySubtype::Uuid,
        bytes: token.as_bytes().to_vec(),
    })
}

fn token_from_bson(value: &Bson) -> Option<Uuid> {
    match value {
        Bson::Binary(bin) => Uuid::from_slice(&bin.bytes).ok(),
        _ => None,
    }
}

/// The `lsid.id` token attached to a command, if any
pub fn command_token(command: &Document) -> Option<Uuid> {
    match command.get(LSID_KEY) {
        Some(Bson::Document(lsid)) => lsid.get("id").and_then(token_from_bson),
        _ => None,
    }
}

/// Tokens listed by a session command: `{<name>: [{id: <uuid>}, ...]}`.
/// Entries that are not documents with a binary `id` are skipped.
pub fn listed_tokens(command: &Document) -> Vec<Uuid> {
    let Some(Bson::Array(entries)) = command.values().next() else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Bson::Document(doc) => doc.get("id").and_then(token_from_bson),
            _ => None,
        })
        .collect()
}

/// A session borrowed for the duration of one command
#[derive(Debug)]
pub struct SessionLease {
    session: Arc<Session>,
    pooled: bool,
}

impl SessionLease {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Whether the session belongs to a client token and outlives the command
    pub fn is_pooled(&self) -> bool {
        self.pooled
    }

    pub fn commit(&self) -> DbResult<()> {
        self.session.commit()
    }

    pub fn rollback(&self) -> DbResult<()> {
        self.session.rollback()
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if !self.pooled {
            self.session.close();
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<Uuid, Arc<Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, token: &Uuid) -> Option<&Arc<Session>> {
        self.sessions.get(token)
    }

    /// Open a session on `db` under a fresh token
    pub fn start(&mut self, db: &Database) -> DbResult<Uuid> {
        let principal = select_principal(db)?;
        let session = db.create_session(&principal)?;
        let token = Uuid::new_v4();
        tracing::debug!("Session {} bound to token {}", session.id(), token);
        self.sessions.insert(token, session);
        Ok(token)
    }

    /// Remove a token and close its session. Missing tokens are ignored.
    pub fn end(&mut self, token: &Uuid) -> bool {
        match self.sessions.remove(token) {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Close the session behind a token while keeping the token registered
    pub fn refresh(&self, token: &Uuid) -> bool {
        match self.sessions.get(token) {
            Some(session) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// Pick the session a command runs on: the token's session when the
    /// command names an open one bound to `db`, otherwise a new default session
    pub fn acquire(&self, command: &Document, db: &Database) -> DbResult<SessionLease> {
        if let Some(session) = command_token(command).and_then(|t| self.sessions.get(&t)) {
            if !session.is_closed() && session.database() == db.name {
                return Ok(SessionLease {
                    session: session.clone(),
                    pooled: true,
                });
            }
        }
        let principal = select_principal(db)?;
        Ok(SessionLease {
            session: db.create_session(&principal)?,
            pooled: false,
        })
    }

    /// Close every session; used when the connection goes away
    pub fn close_all(&mut self) {
        for (token, session) in self.sessions.drain() {
            tracing::debug!("Closing session {} for token {}", session.id(), token);
            session.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use bson::doc;

    fn database(name: &str) -> Arc<Database> {
        let engine = StorageEngine::default();
        let db = engine.find_or_create_database(name);
        db.init().unwrap();
        db
    }

    fn session_list(name: &str, tokens: &[Uuid]) -> Document {
        let entries: Vec<Bson> = tokens
            .iter()
            .map(|t| Bson::Document(doc! { "id": token_to_bson(t) }))
            .collect();
        let mut command = Document::new();
        command.insert(name, entries);
        command
    }

    #[test]
    fn test_select_principal_prefers_admin() {
        let db = database("db1");
        db.create_user("plain", false);
        assert_eq!(select_principal(&db).unwrap().name, "root");
        assert!(select_principal(&db).unwrap().admin);
    }

    #[test]
    fn test_select_principal_without_users() {
        let engine = StorageEngine::default();
        let db = engine.find_or_create_database("fresh");
        assert!(matches!(select_principal(&db), Err(DbError::NoPrincipal(_))));
    }

    #[test]
    fn test_start_end_is_idempotent() {
        let db = database("db1");
        let mut registry = SessionRegistry::new();
        let token = registry.start(&db).unwrap();
        let session = registry.get(&token).unwrap().clone();

        assert!(registry.end(&token));
        assert!(session.is_closed());
        assert!(registry.get(&token).is_none());
        assert!(!registry.end(&token));
    }

    #[test]
    fn test_refresh_closes_but_keeps_token() {
        let db = database("db1");
        let mut registry = SessionRegistry::new();
        let token = registry.start(&db).unwrap();

        assert!(registry.refresh(&token));
        assert!(registry.get(&token).unwrap().is_closed());
        assert!(!registry.refresh(&Uuid::new_v4()));
    }

    #[test]
    fn test_acquire_reuses_open_token_session() {
        let db = database("db1");
        let mut registry = SessionRegistry::new();
        let token = registry.start(&db).unwrap();
        let command = doc! { "find": "c1", "lsid": { "id": token_to_bson(&token) } };

        let lease = registry.acquire(&command, &db).unwrap();
        assert!(lease.is_pooled());
        assert!(Arc::ptr_eq(lease.session(), registry.get(&token).unwrap()));
        drop(lease);
        assert!(!registry.get(&token).unwrap().is_closed());

        let other = database("db2");
        let lease = registry.acquire(&command, &other).unwrap();
        assert!(!lease.is_pooled());
    }

    #[test]
    fn test_default_lease_closes_on_drop() {
        let db = database("db1");
        let registry = SessionRegistry::new();
        let lease = registry.acquire(&doc! { "find": "c1" }, &db).unwrap();
        let session = lease.session().clone();
        assert!(!lease.is_pooled());
        drop(lease);
        assert!(session.is_closed());
    }

    #[test]
    fn test_listed_tokens() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let command = session_list("killSessions", &[a, b]);
        assert_eq!(listed_tokens(&command), vec![a, b]);
        assert!(listed_tokens(&doc! { "endSessions": 1i32 }).is_empty());
        assert!(listed_tokens(&doc! { "endSessions": [1i32, { "id": "x" }] }).is_empty());
    }

    #[test]
    fn test_close_all() {
        let db = database("db1");
        let mut registry = SessionRegistry::new();
        let token = registry.start(&db).unwrap();
        let session = registry.get(&token).unwrap().clone();
        registry.close_all();
        assert!(registry.is_empty());
        assert!(session.is_closed());
    }
}
