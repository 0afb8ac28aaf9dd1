//! Connection handler for the MongoDB wire protocol
//!
//! Reads one framed message at a time, dispatches the command it carries and
//! writes back a single reply.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use bson::{doc, Document};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::binding::TableResolver;
use super::protocol::frame::LENGTH_PREFIX_LEN;
use super::protocol::{
    encode_reply, packet_length, CommandKind, DriverError, DriverResult, Frame, OpCode, OpMsg,
    Payload, MAX_WIRE_VERSION, MIN_WIRE_VERSION,
};
use super::sessions::SessionRegistry;
use super::DriverOptions;
use crate::storage::StorageEngine;

pub mod admin;
pub mod aggregate;
pub mod document;
pub mod session;

/// Handler for a single driver connection
pub struct DriverHandler {
    pub(crate) connection_id: i32,
    pub(crate) resolver: TableResolver,
    /// Client session tokens opened on this connection
    pub(crate) sessions: SessionRegistry,
    pub(crate) options: Arc<DriverOptions>,
}

impl DriverHandler {
    pub fn new(connection_id: i32, storage: Arc<StorageEngine>, options: Arc<DriverOptions>) -> Self {
        let resolver = TableResolver::new(
            storage,
            options.default_database.clone(),
            options.storage_format,
        );
        Self {
            connection_id,
            resolver,
            sessions: SessionRegistry::new(),
            options,
        }
    }

    pub fn connection_id(&self) -> i32 {
        self.connection_id
    }

    /// Serve a driver connection until the peer hangs up or a fatal error occurs
    pub async fn handle_connection<S>(&mut self, mut stream: S, addr: String)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tracing::info!("Driver connection {} from {}", self.connection_id, addr);

        loop {
            let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("Driver connection closed: {}", addr);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Driver read error from {}: {}", addr, e);
                    break;
                }
            }

            let remaining = match packet_length(len_buf, self.options.max_message_size) {
                Ok(len) => len,
                Err(e) => {
                    tracing::error!("Dropping driver connection {}: {}", addr, e);
                    break;
                }
            };

            let mut packet = vec![0u8; LENGTH_PREFIX_LEN + remaining];
            packet[..LENGTH_PREFIX_LEN].copy_from_slice(&len_buf);
            if let Err(e) = stream.read_exact(&mut packet[LENGTH_PREFIX_LEN..]).await {
                tracing::warn!("Driver read payload error from {}: {}", addr, e);
                break;
            }

            let reply = match self.handle_packet(&packet).await {
                Ok(Some(reply)) => reply,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!("Failed to handle packet from {}: {}", addr, e);
                    break;
                }
            };

            if let Err(e) = send_reply(&mut stream, &reply).await {
                tracing::warn!("Failed to send reply to {}: {}", addr, e);
                break;
            }
        }

        self.sessions.close_all();
        tracing::info!("Driver connection {} from {} finished", self.connection_id, addr);
    }

    /// Process one complete message. Returns the encoded reply, `None` for
    /// opcodes that get no reply, or a fatal error that must end the connection.
    pub async fn handle_packet(&mut self, packet: &[u8]) -> DriverResult<Option<Vec<u8>>> {
        let frame = Frame::decode(packet)?;
        let request_id = frame.header.request_id;
        tracing::trace!(
            "opCode: {}, requestID: {}, responseTo: {}",
            frame.header.op_code,
            request_id,
            frame.header.response_to
        );

        let result = match frame.op_code() {
            Some(OpCode::Msg) => self.handle_message(frame.body).await,
            Some(OpCode::Query) => admin::handle_legacy_query(frame.body),
            _ => {
                tracing::debug!(
                    "Ignoring opcode {} on connection {}",
                    frame.header.op_code,
                    self.connection_id
                );
                return Ok(None);
            }
        };

        let document = match result {
            Ok(document) => document,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    "Command failed on connection {} (request {}): {}",
                    self.connection_id,
                    request_id,
                    e
                );
                error_document(&e)
            }
        };
        Ok(Some(encode_reply(request_id, &document)?))
    }

    async fn handle_message(&mut self, body: &[u8]) -> DriverResult<Document> {
        let message = OpMsg::parse(body)?;
        self.execute_command(message.body, message.payload).await
    }

    /// Run a command and return its reply document
    pub(crate) async fn execute_command(
        &mut self,
        command: Document,
        payload: Payload<'_>,
    ) -> DriverResult<Document> {
        let kind = CommandKind::from_document(&command);
        tracing::debug!("[conn {}] command: {}", self.connection_id, kind);

        match kind {
            CommandKind::Insert => document::handle_insert(self, &command, payload).await,
            CommandKind::Find => document::handle_find(self, &command),
            CommandKind::Update => document::handle_update(&command),
            CommandKind::Delete => document::handle_delete(self, &command),
            CommandKind::Count => document::handle_count(self, &command),
            CommandKind::Aggregate => aggregate::handle_aggregate(self, &command),
            CommandKind::Drop => admin::handle_drop(self, &command),
            CommandKind::Hello => Ok(admin::handle_hello(self)),
            CommandKind::BuildInfo => Ok(admin::handle_build_info()),
            CommandKind::GetParameter => Ok(admin::handle_get_parameter()),
            CommandKind::Ping => Ok(ok_document()),
            CommandKind::StartSession => session::handle_start_session(self, &command),
            CommandKind::KillSessions | CommandKind::EndSessions => {
                Ok(session::handle_end_sessions(self, &command))
            }
            CommandKind::RefreshSessions => Ok(session::handle_refresh_sessions(self, &command)),
            CommandKind::Unknown(name) => Ok(admin::handle_unknown(&name)),
        }
    }
}

async fn send_reply<S>(stream: &mut S, data: &[u8]) -> DriverResult<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(data).await?;
    stream.flush().await?;
    Ok(())
}

/// Name under which the command was sent (its first key, original case)
pub(crate) fn command_key(command: &Document) -> &str {
    command.keys().next().map(String::as_str).unwrap_or_default()
}

pub(crate) fn set_ok(document: &mut Document) {
    document.insert("ok", 1i32);
}

pub(crate) fn set_n(document: &mut Document, n: usize) {
    document.insert("n", i32::try_from(n).unwrap_or(i32::MAX));
}

pub(crate) fn set_wire_version(document: &mut Document) {
    document.insert("minWireVersion", MIN_WIRE_VERSION);
    document.insert("maxWireVersion", MAX_WIRE_VERSION);
}

pub(crate) fn ok_document() -> Document {
    let mut document = Document::new();
    set_ok(&mut document);
    document
}

/// Reply sent for a command that failed without breaking the connection
pub fn error_document(err: &DriverError) -> Document {
    doc! {
        "ok": 0i32,
        "errmsg": err.to_string(),
        "code": err.code(),
        "codeName": err.code_name(),
    }
}

/// Spawn a handler for incoming driver connections
pub fn spawn_driver_handler(
    storage: Arc<StorageEngine>,
    options: Arc<DriverOptions>,
) -> tokio::sync::mpsc::Sender<(TcpStream, SocketAddr)> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<(TcpStream, SocketAddr)>(100);
    let connection_ids = AtomicI32::new(1);

    tokio::spawn(async move {
        while let Some((stream, addr)) = rx.recv().await {
            let connection_id = connection_ids.fetch_add(1, Ordering::Relaxed);
            let storage = storage.clone();
            let options = options.clone();
            tokio::spawn(async move {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                }
                let mut handler = DriverHandler::new(connection_id, storage, options);
                handler.handle_connection(stream, addr.to_string()).await;
            });
        }
    });

    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::protocol::{decode_reply, encode_frame, encode_op_msg, Reply};
    use bson::Bson;

    fn handler() -> DriverHandler {
        DriverHandler::new(
            7,
            Arc::new(StorageEngine::default()),
            Arc::new(DriverOptions::default()),
        )
    }

    async fn run(handler: &mut DriverHandler, request_id: i32, command: Document) -> Reply {
        let packet = encode_op_msg(request_id, &command, &[]).unwrap();
        let reply = handler.handle_packet(&packet).await.unwrap().unwrap();
        decode_reply(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_reply_echoes_request_id() {
        let mut handler = handler();
        let reply = run(&mut handler, 41, doc! { "ping": 1i32, "$db": "admin" }).await;
        assert_eq!(reply.header.request_id, 41);
        assert_eq!(reply.header.response_to, 41);
        assert_eq!(reply.header.op_code, OpCode::Reply.as_i32());
        assert_eq!(reply.document, doc! { "ok": 1i32 });
    }

    #[tokio::test]
    async fn test_hello_reports_connection_id() {
        let mut handler = handler();
        let reply = run(&mut handler, 1, doc! { "isMaster": 1i32 }).await;
        let document = reply.document;
        assert_eq!(document.get_i32("connectionId").unwrap(), 7);
        assert!(document.get_bool("isWritablePrimary").unwrap());
        assert!(!document.get_bool("readOnly").unwrap());
        assert_eq!(document.get_i32("maxWireVersion").unwrap(), MAX_WIRE_VERSION);
    }

    #[tokio::test]
    async fn test_unknown_opcode_gets_no_reply() {
        let mut handler = handler();
        let packet = encode_frame(3, 0, 2010, &[0, 0, 0, 0]);
        assert!(handler.handle_packet(&packet).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_coalesced_packet_is_fatal() {
        let mut handler = handler();
        let mut packet = encode_op_msg(1, &doc! { "ping": 1i32 }, &[]).unwrap();
        packet.extend(encode_op_msg(2, &doc! { "ping": 1i32 }, &[]).unwrap());
        let err = handler.handle_packet(&packet).await.unwrap_err();
        assert!(matches!(err, DriverError::Coalesced { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_malformed_document_gets_error_reply() {
        let mut handler = handler();
        let mut body = vec![0u8; 4];
        body.push(0);
        body.extend_from_slice(&[9, 0, 0, 0, 0x99, b'a', 0, 0, 0]);
        let packet = encode_frame(9, 0, OpCode::Msg.as_i32(), &body);

        let reply = handler.handle_packet(&packet).await.unwrap().unwrap();
        let reply = decode_reply(&reply).unwrap();
        assert_eq!(reply.header.response_to, 9);
        assert_eq!(reply.document.get_i32("ok").unwrap(), 0);
        assert!(reply.document.get_str("errmsg").is_ok());
        assert!(matches!(reply.document.get("code"), Some(Bson::Int32(_))));
    }

    #[tokio::test]
    async fn test_connection_loop_over_duplex() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let task = tokio::spawn(async move {
            let mut handler = handler();
            handler.handle_connection(server, "duplex".to_string()).await;
        });

        let (mut reader, mut writer) = tokio::io::split(client);
        for request_id in [5, 6] {
            let packet = encode_op_msg(request_id, &doc! { "buildInfo": 1i32 }, &[]).unwrap();
            writer.write_all(&packet).await.unwrap();

            let mut len_buf = [0u8; 4];
            reader.read_exact(&mut len_buf).await.unwrap();
            let mut bytes = len_buf.to_vec();
            bytes.resize(i32::from_le_bytes(len_buf) as usize, 0);
            reader.read_exact(&mut bytes[4..]).await.unwrap();

            let reply = decode_reply(&bytes).unwrap();
            assert_eq!(reply.header.response_to, request_id);
            assert_eq!(reply.document.get_str("version").unwrap(), "6.0.0");
        }

        drop(writer);
        drop(reader);
        task.await.unwrap();
    }
}
