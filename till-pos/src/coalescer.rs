//! EditCoalescer - per-tab debounce of low-urgency field edits
//!
//! Each draft owns one coalescer. Edits only mark a field as touched; the
//! values themselves stay in the draft, so whatever is sent at flush time is
//! always the latest local value.
//!
//! ```text
//! touch(field) ──► worker: deadline[field] = now + window(field)
//!                     │
//!          deadline reached / flush_now()
//!                     │
//!                     ▼
//!          sink.flush(FlushBatch { settled, pending })
//! ```
//!
//! The worker awaits each flush before handling the next message, so flushes
//! of one tab never overlap.

use crate::config::CoalesceWindows;
use crate::error::{PosError, PosResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Weak;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Idle wake-up when nothing is pending
const IDLE_SLEEP_SECS: u64 = 3600;

/// Field whose edits are coalesced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CoalescedField {
    Note,
    TenderedCash,
    PaymentMethod,
    PromotionCode,
}

impl CoalescedField {
    pub const ALL: [CoalescedField; 4] = [
        Self::Note,
        Self::TenderedCash,
        Self::PaymentMethod,
        Self::PromotionCode,
    ];
}

/// Fields handed to the sink on flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushBatch {
    /// Fields whose window elapsed (or all touched fields on a forced flush)
    pub settled: Vec<CoalescedField>,
    /// Fields still inside their window
    pub pending: Vec<CoalescedField>,
    /// Requested explicitly rather than by a timer
    pub forced: bool,
}

impl FlushBatch {
    pub fn is_pending(&self, field: CoalescedField) -> bool {
        self.pending.contains(&field)
    }
}

/// Receiver of settled edits
#[async_trait]
pub trait CoalescedSink: Send + Sync {
    async fn flush(&self, batch: FlushBatch) -> PosResult<()>;
}

enum Command {
    Touch(CoalescedField),
    FlushNow(oneshot::Sender<PosResult<()>>),
}

/// Per-tab debounce worker handle
pub struct EditCoalescer {
    tx: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
}

impl EditCoalescer {
    /// Spawn the worker. Must be called inside a tokio runtime.
    pub fn spawn(windows: CoalesceWindows, sink: Weak<dyn CoalescedSink>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let worker = CoalescerWorker {
            windows,
            sink,
            rx,
            shutdown: shutdown.clone(),
            deadlines: HashMap::new(),
        };
        tokio::spawn(worker.run());
        Self { tx, shutdown }
    }

    /// Record an edit, restarting the field's window
    pub fn touch(&self, field: CoalescedField) {
        if self.tx.send(Command::Touch(field)).is_err() {
            tracing::debug!(?field, "Coalescer stopped, edit not scheduled");
        }
    }

    /// Flush every touched field now and wait for the result
    pub async fn flush_now(&self) -> PosResult<()> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::FlushNow(ack))
            .map_err(|_| PosError::TabClosed)?;
        done.await.map_err(|_| PosError::TabClosed)?
    }

    /// Stop the worker; pending windows are dropped
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for EditCoalescer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct CoalescerWorker {
    windows: CoalesceWindows,
    sink: Weak<dyn CoalescedSink>,
    rx: mpsc::UnboundedReceiver<Command>,
    shutdown: CancellationToken,
    deadlines: HashMap<CoalescedField, Instant>,
}

impl CoalescerWorker {
    async fn run(mut self) {
        loop {
            let next = self.deadlines.values().min().copied();
            let wake = next.unwrap_or_else(|| Instant::now() + Duration::from_secs(IDLE_SLEEP_SECS));

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    if !self.deadlines.is_empty() {
                        tracing::debug!(pending = self.deadlines.len(), "Coalescer stopped with pending edits");
                    }
                    break;
                }

                cmd = self.rx.recv() => match cmd {
                    Some(Command::Touch(field)) => {
                        self.deadlines.insert(field, Instant::now() + self.windows.window(field));
                    }
                    Some(Command::FlushNow(ack)) => {
                        let mut settled: Vec<_> = self.deadlines.drain().map(|(f, _)| f).collect();
                        settled.sort();
                        let result = self.deliver(FlushBatch { settled, pending: Vec::new(), forced: true }).await;
                        let _ = ack.send(result);
                    }
                    None => break,
                },

                _ = tokio::time::sleep_until(wake), if next.is_some() => {
                    let now = Instant::now();
                    let mut settled = Vec::new();
                    self.deadlines.retain(|field, deadline| {
                        if *deadline <= now {
                            settled.push(*field);
                            false
                        } else {
                            true
                        }
                    });
                    settled.sort();
                    let mut pending: Vec<_> = self.deadlines.keys().copied().collect();
                    pending.sort();

                    if let Err(e) = self.deliver(FlushBatch { settled, pending, forced: false }).await {
                        tracing::warn!(error = %e, "Coalesced flush failed, local values kept");
                    }
                }
            }
        }
    }

    async fn deliver(&self, batch: FlushBatch) -> PosResult<()> {
        let Some(sink) = self.sink.upgrade() else {
            return Err(PosError::TabClosed);
        };
        sink.flush(batch).await
    }
}
