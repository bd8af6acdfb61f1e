//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use grc_resilience::error::{CircuitOpenError, Classify, OperationError, VersionConflictError};
use grc_resilience::transactions::{ensure_version, TransactionalStore, Versioned};

/// Start a programmable HTTP backend on an ephemeral port.
///
/// `f` decides the status and body of every response.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        let _ = socket.read(&mut buf).await;

                        let (status, body) = f().await;
                        let status_text = match status {
                            200 => "200 OK",
                            404 => "404 Not Found",
                            409 => "409 Conflict",
                            429 => "429 Too Many Requests",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Error of an HTTP call made through the resilience primitives.
#[derive(Debug, Error)]
pub enum HttpCallError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),
}

impl Classify for HttpCallError {
    fn code(&self) -> Option<String> {
        match self {
            HttpCallError::Http(e) => e.code(),
            HttpCallError::CircuitOpen(e) => e.code(),
        }
    }
}

/// Client without connection pooling, so every attempt opens a new socket.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// In-memory transactional store; a transaction is the list of rows it wrote.
#[derive(Default)]
pub struct MemoryStore {
    pub committed: Mutex<Vec<Vec<String>>>,
    pub rollbacks: AtomicU32,
}

impl MemoryStore {
    pub fn rows(&self) -> Vec<String> {
        self.committed.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub fn transaction_sizes(&self) -> Vec<usize> {
        self.committed.lock().unwrap().iter().map(Vec::len).collect()
    }
}

impl TransactionalStore for MemoryStore {
    type Tx = Vec<String>;
    type Error = OperationError;

    fn begin(&self) -> BoxFuture<'_, Result<Vec<String>, OperationError>> {
        Box::pin(async { Ok(Vec::new()) })
    }

    fn commit(&self, tx: Vec<String>) -> BoxFuture<'_, Result<(), OperationError>> {
        Box::pin(async move {
            self.committed.lock().unwrap().push(tx);
            Ok(())
        })
    }

    fn rollback(&self, _tx: Vec<String>) -> BoxFuture<'_, Result<(), OperationError>> {
        Box::pin(async move {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }
}

/// A versioned row.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlRecord {
    pub id: String,
    pub status: String,
    pub version: u64,
}

impl Versioned for ControlRecord {
    fn version(&self) -> u64 {
        self.version
    }
}

/// Versioned table with compare-and-set updates.
#[derive(Default)]
pub struct VersionedTable {
    rows: Mutex<HashMap<String, ControlRecord>>,
    pub reads: AtomicU32,
}

impl VersionedTable {
    pub fn insert(&self, id: &str, status: &str) {
        self.rows.lock().unwrap().insert(
            id.to_string(),
            ControlRecord {
                id: id.to_string(),
                status: status.to_string(),
                version: 1,
            },
        );
    }

    pub async fn read(&self, id: &str) -> Result<Option<ControlRecord>, VersionConflictError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    /// Write `status` if the row is still at `expected` version.
    pub async fn update(&self, id: &str, expected: u64, status: &str) -> Result<ControlRecord, VersionConflictError> {
        let mut rows = self.rows.lock().unwrap();
        let Some(row) = rows.get_mut(id) else {
            return Err(VersionConflictError { expected, actual: 0 });
        };
        ensure_version(&*row, expected)?;
        row.status = status.to_string();
        row.version += 1;
        Ok(row.clone())
    }

    /// Simulate another writer bumping the row.
    pub fn touch(&self, id: &str) {
        if let Some(row) = self.rows.lock().unwrap().get_mut(id) {
            row.version += 1;
        }
    }

    pub fn get(&self, id: &str) -> Option<ControlRecord> {
        self.rows.lock().unwrap().get(id).cloned()
    }
}
