// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::errors::{Result, SwarmError};

use super::core::{CoreStep, ManagerCore};
use super::writer::{JournalWriter, ReplyTx};
use super::{ManagerEvent, Reply};

/// One event plus where to send its reply.
#[derive(Debug)]
pub struct Request {
    pub event: ManagerEvent,
    pub reply: Option<ReplyTx>,
}

impl Request {
    pub fn new(event: ManagerEvent, reply: ReplyTx) -> Self {
        Self {
            event,
            reply: Some(reply),
        }
    }

    /// Fire-and-forget request; the outcome is only logged.
    pub fn notify(event: ManagerEvent) -> Self {
        Self { event, reply: None }
    }
}

/// Feeds requests into [`ManagerCore`] one at a time and hands the
/// resulting journal ops to the [`JournalWriter`].
///
/// All state lives in the core; this shell only owns the channels, the
/// sweep timer and the writer.
pub struct Runtime {
    core: ManagerCore,
    writer: JournalWriter,
    request_rx: mpsc::Receiver<Request>,
    fatal_rx: mpsc::UnboundedReceiver<SwarmError>,
    sweep_interval: Option<Duration>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(
        core: ManagerCore,
        writer: JournalWriter,
        fatal_rx: mpsc::UnboundedReceiver<SwarmError>,
        request_rx: mpsc::Receiver<Request>,
    ) -> Self {
        Self {
            core,
            writer,
            request_rx,
            fatal_rx,
            sweep_interval: None,
        }
    }

    /// Run a `GcSweep` every `interval`.
    pub fn with_sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval = interval.filter(|d| !d.is_zero());
        self
    }

    /// Main loop.
    ///
    /// Returns `Ok` after a `Shutdown` request or when every handle is
    /// dropped, and `Err` as soon as the core or the journal reports a
    /// fatal error.
    pub async fn run(mut self) -> Result<()> {
        info!("swarmstate runtime started");

        let mut sweep = self.sweep_interval.map(|every| {
            let mut timer = tokio::time::interval(every);
            timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            timer
        });

        loop {
            let request = tokio::select! {
                maybe = self.request_rx.recv() => match maybe {
                    Some(r) => r,
                    None => {
                        info!("request channel closed; shutting down");
                        Request::notify(ManagerEvent::Shutdown)
                    }
                },
                Some(err) = self.fatal_rx.recv() => {
                    error!(error = %err, "journal failure; stopping runtime");
                    self.writer.flush().await;
                    return Err(err);
                }
                _ = tick(&mut sweep) => Request::notify(ManagerEvent::GcSweep),
            };

            debug!(event = ?request.event, "runtime received event");
            let CoreStep {
                reply,
                journal,
                keep_running,
            } = self.core.step(request.event);

            match reply {
                Err(e) if e.is_fatal() => {
                    if let Some(tx) = request.reply {
                        let _ = tx.send(Err(SwarmError::Other(anyhow::anyhow!(
                            "manager stopped: {e}"
                        ))));
                    }
                    // Mutations made before the failure are still journaled.
                    self.writer.submit(journal, Ok(Reply::Ack), None);
                    self.writer.flush().await;
                    return Err(e);
                }
                reply => self.writer.submit(journal, reply, request.reply),
            }

            if !keep_running {
                info!("shutdown requested; stopping runtime");
                break;
            }
        }

        self.writer.flush().await;
        if let Ok(err) = self.fatal_rx.try_recv() {
            error!(error = %err, "journal failure during shutdown");
            return Err(err);
        }
        info!("runtime exiting");
        Ok(())
    }
}

async fn tick(timer: &mut Option<tokio::time::Interval>) {
    match timer {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
