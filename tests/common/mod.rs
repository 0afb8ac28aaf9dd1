//! Common test utilities for driver integration tests
//!
//! Provides shared helpers for:
//! - Starting a gateway on an ephemeral port
//! - A minimal wire client sending OP_MSG / OP_QUERY and reading OP_REPLY

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bson::Document;
use docdb::driver::protocol::{
    decode_reply, encode_op_msg, encode_op_query, DocumentSequence, Reply,
};
use docdb::{DriverOptions, DriverServer, StorageEngine};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub struct TestServer {
    pub addr: SocketAddr,
    pub storage: Arc<StorageEngine>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<std::io::Result<()>>>,
}

impl TestServer {
    pub async fn client(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn start_server() -> TestServer {
    start_server_with(DriverOptions::default()).await
}

pub async fn start_server_with(options: DriverOptions) -> TestServer {
    let storage = Arc::new(StorageEngine::default());
    let server = DriverServer::bind("127.0.0.1:0", storage.clone(), options)
        .await
        .expect("Failed to bind test server");
    let addr = server.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.serve(async {
        let _ = rx.await;
    }));
    TestServer {
        addr,
        storage,
        shutdown: Some(tx),
        handle: Some(handle),
    }
}

pub struct TestClient {
    stream: TcpStream,
    next_request_id: i32,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr)
            .await
            .expect("Failed to connect to test server");
        Self {
            stream,
            next_request_id: 1,
        }
    }

    pub fn next_request_id(&mut self) -> i32 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }

    /// Send a command and return the reply document
    pub async fn command(&mut self, command: Document) -> Document {
        self.command_with_sequences(command, Vec::new()).await
    }

    pub async fn command_with_sequences(
        &mut self,
        command: Document,
        sequences: Vec<DocumentSequence>,
    ) -> Document {
        let request_id = self.next_request_id();
        let bytes = encode_op_msg(request_id, &command, &sequences).unwrap();
        let reply = self.request(&bytes).await;
        assert_eq!(reply.header.response_to, request_id);
        reply.document
    }

    pub async fn legacy_query(&mut self, namespace: &str, query: Document) -> Reply {
        let request_id = self.next_request_id();
        let bytes = encode_op_query(request_id, namespace, &query, None).unwrap();
        self.request(&bytes).await
    }

    pub async fn request(&mut self, bytes: &[u8]) -> Reply {
        self.send_raw(bytes).await;
        self.read_reply().await.expect("Connection closed before reply")
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Read one reply; `None` when the server closed the connection
    pub async fn read_reply(&mut self) -> Option<Reply> {
        let mut len_buf = [0u8; 4];
        let read = tokio::time::timeout(Duration::from_secs(5), self.stream.read_exact(&mut len_buf))
            .await
            .expect("Timed out waiting for reply");
        if read.is_err() {
            return None;
        }
        let total = i32::from_le_bytes(len_buf) as usize;
        let mut bytes = len_buf.to_vec();
        bytes.resize(total, 0);
        self.stream.read_exact(&mut bytes[4..]).await.ok()?;
        Some(decode_reply(&bytes).unwrap())
    }

    /// Whether the server closes the connection within a short grace period
    pub async fn is_closed_by_server(&mut self) -> bool {
        let mut buf = [0u8; 1];
        match tokio::time::timeout(Duration::from_secs(5), self.stream.read(&mut buf)).await {
            Ok(Ok(0)) | Ok(Err(_)) => true,
            _ => false,
        }
    }
}
