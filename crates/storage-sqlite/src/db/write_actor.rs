//! Single-writer actor for the document store.
//!
//! SQLite allows one writer at a time, so every mutation is funnelled through a
//! dedicated thread holding one pooled connection. Each job runs in its own
//! transaction; a job error rolls it back.

use diesel::sqlite::SqliteConnection;
use diesel::Connection;
use log::{debug, error};
use tokio::sync::{mpsc, oneshot};

use visitsync_core::errors::{Error, Result};

use super::DbPool;
use crate::errors::StorageError;

type Job = Box<dyn FnOnce(&mut SqliteConnection) + Send + 'static>;

/// Transaction error: either the job's own error or a diesel failure while
/// opening or committing.
enum TxError {
    Job(Error),
    Diesel(diesel::result::Error),
}

impl From<diesel::result::Error> for TxError {
    fn from(err: diesel::result::Error) -> Self {
        TxError::Diesel(err)
    }
}

#[derive(Clone)]
pub struct WriteHandle {
    tx: mpsc::UnboundedSender<Job>,
}

impl WriteHandle {
    /// Runs `job` on the writer thread inside a transaction and returns its
    /// result.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel::<Result<T>>();
        let wrapped: Job = Box::new(move |conn: &mut SqliteConnection| {
            let result = conn
                .transaction::<T, TxError, _>(|tx_conn| job(tx_conn).map_err(TxError::Job))
                .map_err(|err| match err {
                    TxError::Job(e) => e,
                    TxError::Diesel(e) => Error::from(StorageError::from(e)),
                });
            // The caller may have given up waiting.
            let _ = reply_tx.send(result);
        });

        self.tx
            .send(wrapped)
            .map_err(|_| StorageError::WriterUnavailable("write actor has stopped".to_string()))?;
        reply_rx.await.map_err(|_| {
            StorageError::WriterUnavailable("write actor dropped the job".to_string())
        })?
    }
}

/// Starts the writer thread. It stops once every `WriteHandle` is dropped.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<Job>();

    let spawned = std::thread::Builder::new()
        .name("visitsync-writer".to_string())
        .spawn(move || {
            let mut conn = match pool.get() {
                Ok(conn) => conn,
                Err(err) => {
                    error!("[VisitSync] Write actor could not get a connection: {}", err);
                    return;
                }
            };
            while let Some(job) = rx.blocking_recv() {
                job(&mut conn);
            }
            debug!("[VisitSync] Write actor stopped");
        });
    if let Err(err) = spawned {
        error!("[VisitSync] Failed to start write actor: {}", err);
    }

    WriteHandle { tx }
}
