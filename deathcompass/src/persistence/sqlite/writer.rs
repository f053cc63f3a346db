//! Background writer for the SQLite datastore.
//!
//! A single task owns a pool clone and drains a bounded job channel, so jobs
//! run in the order they were submitted. Failed writes are logged and dropped;
//! there is no retry and no on-disk queue.

use sqlx::SqlitePool;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::helpers::{upsert_location, LocationRow};
use crate::persistence::{DatastoreType, PersistenceError};

enum WriteJob {
    Upsert(LocationRow),
    UpsertBatch(Vec<LocationRow>),
    /// Acknowledged once every job queued before it has run.
    Flush(oneshot::Sender<()>),
}

/// Handle to the writer task.
pub struct RecordWriter {
    job_tx: mpsc::Sender<WriteJob>,
    task: JoinHandle<()>,
}

impl RecordWriter {
    pub fn spawn(pool: SqlitePool, capacity: usize) -> Self {
        let (job_tx, job_rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(run_writer(pool, job_rx));
        Self { job_tx, task }
    }

    /// Queue one upsert. Waits only if the queue is full.
    pub async fn submit(&self, row: LocationRow) -> Result<(), PersistenceError> {
        self.send(WriteJob::Upsert(row)).await
    }

    /// Queue a batch, applied in one transaction.
    pub async fn submit_batch(&self, rows: Vec<LocationRow>) -> Result<(), PersistenceError> {
        if rows.is_empty() {
            return Ok(());
        }
        self.send(WriteJob::UpsertBatch(rows)).await
    }

    /// Wait until everything submitted so far has been applied.
    pub async fn flush(&self) -> Result<(), PersistenceError> {
        let (tx, rx) = oneshot::channel();
        self.send(WriteJob::Flush(tx)).await?;
        rx.await
            .map_err(|_| PersistenceError::Closed(DatastoreType::Sqlite))
    }

    /// Stop accepting jobs, apply the ones already queued, and wait for the
    /// task to exit.
    pub async fn shutdown(self) {
        drop(self.job_tx);
        if let Err(e) = self.task.await {
            tracing::error!("Record writer task failed: {}", e);
        }
    }

    async fn send(&self, job: WriteJob) -> Result<(), PersistenceError> {
        self.job_tx
            .send(job)
            .await
            .map_err(|_| PersistenceError::Closed(DatastoreType::Sqlite))
    }
}

async fn run_writer(pool: SqlitePool, mut job_rx: mpsc::Receiver<WriteJob>) {
    tracing::debug!("Record writer started");

    while let Some(job) = job_rx.recv().await {
        match job {
            WriteJob::Upsert(row) => {
                if let Err(e) = upsert_location(&pool, &row).await {
                    tracing::warn!(
                        player = %row.record.player,
                        world = %row.record.world,
                        "Dropping death location write: {}",
                        e
                    );
                }
            }
            WriteJob::UpsertBatch(rows) => {
                let count = rows.len();
                if let Err(e) = upsert_batch(&pool, &rows).await {
                    tracing::warn!(count, "Dropping batch of death location writes: {}", e);
                } else {
                    tracing::debug!(count, "Applied batch of death location writes");
                }
            }
            WriteJob::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    tracing::debug!("Record writer channel closed, writer exiting");
}

async fn upsert_batch(pool: &SqlitePool, rows: &[LocationRow]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    for row in rows {
        upsert_location(&mut *tx, row).await?;
    }
    tx.commit().await
}
