//! TCP front end for the driver endpoint

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::driver::{spawn_driver_handler, DriverOptions};
use crate::storage::StorageEngine;

/// Listener accepting MongoDB driver connections
pub struct DriverServer {
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    options: Arc<DriverOptions>,
}

impl DriverServer {
    pub async fn bind(
        addr: &str,
        storage: Arc<StorageEngine>,
        options: DriverOptions,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            storage,
            options: Arc::new(options),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Accept connections until `shutdown` resolves. Each connection is served
    /// by its own task.
    pub async fn serve<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = self.local_addr()?;
        let connections = spawn_driver_handler(self.storage.clone(), self.options.clone());
        tracing::info!("Listening for driver connections on {}", addr);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Driver listener on {} shutting down", addr);
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if connections.send((stream, peer)).await.is_err() {
                            tracing::error!("Connection handler is gone, stopping listener");
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Failed to accept driver connection: {}", e),
                },
            }
        }
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let server = DriverServer::bind(
            "127.0.0.1:0",
            Arc::new(StorageEngine::default()),
            DriverOptions::default(),
        )
        .await
        .unwrap();
        assert_ne!(server.local_addr().unwrap().port(), 0);

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(async {
            let _ = rx.await;
        }));
        tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
