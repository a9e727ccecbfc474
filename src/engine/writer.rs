// src/engine/writer.rs

//! Background journal writes.
//!
//! Each core step hands its ops to [`JournalWriter::submit`]. The ops are
//! written on the blocking pool, and the step's reply is released only once
//! every op is on disk. Writes for unrelated records run concurrently (up to
//! `max_concurrent_writes`), while writes touching the same record are chained
//! so they land in step order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::errors::{Result, SwarmError};
use crate::journal::{Journal, RecordKey};
use crate::store::JournalOp;

use super::Reply;

/// Where a finished step's reply goes.
pub type ReplyTx = oneshot::Sender<Result<Reply>>;

#[derive(Debug)]
pub struct JournalWriter {
    journal: Arc<Journal>,
    permits: Arc<Semaphore>,
    /// Completion signal of the latest in-flight write per record.
    chains: HashMap<RecordKey, oneshot::Receiver<()>>,
    in_flight: JoinSet<()>,
    fatal_tx: mpsc::UnboundedSender<SwarmError>,
}

impl JournalWriter {
    /// Build a writer plus the channel on which failed writes are reported.
    pub fn new(
        journal: Journal,
        max_concurrent_writes: usize,
    ) -> (Self, mpsc::UnboundedReceiver<SwarmError>) {
        let (fatal_tx, fatal_rx) = mpsc::unbounded_channel();
        let writer = Self {
            journal: Arc::new(journal),
            permits: Arc::new(Semaphore::new(max_concurrent_writes.max(1))),
            chains: HashMap::new(),
            in_flight: JoinSet::new(),
            fatal_tx,
        };
        (writer, fatal_rx)
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    /// Write `ops` in the background, then deliver `reply`.
    ///
    /// A step with no ops replies immediately.
    pub fn submit(&mut self, ops: Vec<JournalOp>, reply: Result<Reply>, reply_tx: Option<ReplyTx>) {
        if ops.is_empty() {
            if let Some(tx) = reply_tx {
                let _ = tx.send(reply);
            }
            return;
        }

        self.prune();

        let keys: HashSet<RecordKey> = ops.iter().map(JournalOp::key).collect();
        let mut waits = Vec::new();
        let mut signals = Vec::with_capacity(keys.len());
        for key in keys {
            let (done_tx, done_rx) = oneshot::channel();
            if let Some(prev) = self.chains.insert(key, done_rx) {
                waits.push(prev);
            }
            signals.push(done_tx);
        }

        let journal = Arc::clone(&self.journal);
        let permits = Arc::clone(&self.permits);
        let fatal_tx = self.fatal_tx.clone();

        self.in_flight.spawn(async move {
            for prev in waits {
                // A dropped sender means the predecessor finished or died.
                let _ = prev.await;
            }

            let outcome = match permits.acquire_owned().await {
                Ok(_permit) => write_ops(journal, ops).await,
                Err(_) => Err(SwarmError::Other(anyhow::anyhow!("journal writer closed"))),
            };

            let reply = match outcome {
                Ok(()) => reply,
                Err(e) => {
                    error!(error = %e, "journal write failed");
                    let msg = format!("state could not be persisted: {e}");
                    let _ = fatal_tx.send(e);
                    Err(SwarmError::Other(anyhow::anyhow!(msg)))
                }
            };

            for signal in signals {
                let _ = signal.send(());
            }
            if let Some(tx) = reply_tx {
                let _ = tx.send(reply);
            }
        });
    }

    /// Wait until every submitted write has finished.
    pub async fn flush(&mut self) {
        while let Some(res) = self.in_flight.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "journal write task did not complete");
            }
        }
        self.chains.clear();
        debug!("journal writes flushed");
    }

    /// Number of records with a write still in flight.
    pub fn pending_records(&mut self) -> usize {
        self.prune();
        self.chains.len()
    }

    fn prune(&mut self) {
        while let Some(res) = self.in_flight.try_join_next() {
            if let Err(e) = res {
                warn!(error = %e, "journal write task did not complete");
            }
        }
        self.chains.retain(|_, rx| {
            matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty))
        });
    }
}

async fn write_ops(journal: Arc<Journal>, ops: Vec<JournalOp>) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        for op in &ops {
            journal.apply(op)?;
        }
        Ok(())
    })
    .await
    .map_err(|e| SwarmError::Other(anyhow::anyhow!("journal write task panicked: {e}")))?
}
