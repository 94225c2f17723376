//! Write-buffering saver.
//!
//! Producers hand checklists to a bounded queue; a single dispatcher task
//! owns the buffer and flushes it through a [`Flusher`] when
//!
//! 1. the buffer reaches `capacity`,
//! 2. `flush_period` passes without a new item, or
//! 3. the saver is closed (after draining the queue).
//!
//! Checklists the flusher could not persist stay at the head of the buffer
//! and are retried by the next flush. Whatever remains after the final flush
//! is logged and dropped.

use std::time::Duration;

use checklist_storage::Checklist;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::flusher::Flusher;

/// Stop signal and completion latch of the dispatcher.
struct DispatcherHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Bounded, asynchronously flushed buffer of checklists.
pub struct Saver {
    sender: mpsc::Sender<Checklist>,
    dispatcher: Mutex<Option<DispatcherHandle>>,
    /// Passed to every flush; cancelled by `close` once the dispatcher is done.
    flush_scope: CancellationToken,
}

impl Saver {
    /// Spawns the dispatcher task. Must be called from within a Tokio runtime.
    ///
    /// A zero `capacity` is raised to one.
    pub fn new<F: Flusher>(flusher: F, capacity: usize, flush_period: Duration) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let (stop, stop_rx) = oneshot::channel();
        let flush_scope = CancellationToken::new();

        let dispatcher = Dispatcher {
            flusher,
            capacity,
            flush_period,
            buffer: Vec::with_capacity(capacity),
            cancel: flush_scope.clone(),
        };
        let task = tokio::spawn(dispatcher.run(receiver, stop_rx));

        Self {
            sender,
            dispatcher: Mutex::new(Some(DispatcherHandle { stop, task })),
            flush_scope,
        }
    }

    /// Enqueues one checklist, waiting for room when the queue is full.
    ///
    /// Returns `false` once the saver is closed.
    pub async fn try_save(&self, checklist: Checklist) -> bool {
        if self.sender.is_closed() {
            return false;
        }
        match self.sender.send(checklist).await {
            Ok(()) => true,
            Err(mpsc::error::SendError(rejected)) => {
                debug!(checklist_id = %rejected.id, "Saver is closed, checklist rejected");
                false
            }
        }
    }

    /// Enqueues checklists in order, stopping at the first rejection.
    ///
    /// Returns the number of checklists accepted.
    #[instrument(skip(self, checklists), fields(total = checklists.len()))]
    pub async fn try_save_batch(&self, checklists: Vec<Checklist>) -> usize {
        let total = checklists.len();
        let mut saved = 0;
        for checklist in checklists {
            if !self.try_save(checklist).await {
                warn!(saved, total, "Saver closed while saving batch");
                break;
            }
            saved += 1;
        }
        debug!(saved, total, "Batch enqueued");
        saved
    }

    /// Stops accepting checklists, drains the queue, runs the final flush
    /// and waits for the dispatcher to exit. Later calls return immediately.
    pub async fn close(&self) {
        let mut dispatcher = self.dispatcher.lock().await;
        let Some(DispatcherHandle { stop, task }) = dispatcher.take() else {
            return;
        };

        // The dispatcher is gone already if the receiver was dropped.
        let _ = stop.send(());
        if let Err(err) = task.await {
            error!(error = %err, "Saver dispatcher terminated abnormally");
        }
        self.flush_scope.cancel();
        info!("Saver closed");
    }

    /// Returns true once the queue no longer accepts checklists.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl std::fmt::Debug for Saver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Saver")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// The task that owns the buffer.
struct Dispatcher<F> {
    flusher: F,
    capacity: usize,
    flush_period: Duration,
    buffer: Vec<Checklist>,
    cancel: CancellationToken,
}

impl<F: Flusher> Dispatcher<F> {
    async fn run(
        mut self,
        mut receiver: mpsc::Receiver<Checklist>,
        mut stop: oneshot::Receiver<()>,
    ) {
        loop {
            let timer = tokio::time::sleep(self.flush_period);
            tokio::select! {
                item = receiver.recv() => match item {
                    Some(checklist) => {
                        self.buffer.push(checklist);
                        self.record_buffered();
                        if self.buffer.len() >= self.capacity {
                            self.flush_now("capacity").await;
                        }
                    }
                    // Every sender is gone: the saver was dropped without `close`.
                    None => {
                        self.flush_now("shutdown").await;
                        break;
                    }
                },
                _ = &mut stop => {
                    receiver.close();
                    while let Some(checklist) = receiver.recv().await {
                        self.buffer.push(checklist);
                    }
                    self.flush_now("shutdown").await;
                    break;
                }
                _ = timer => self.flush_now("timer").await,
            }
        }

        self.report_dropped();
    }

    async fn flush_now(&mut self, trigger: &'static str) {
        if self.buffer.is_empty() {
            return;
        }

        let batch = std::mem::take(&mut self.buffer);
        let count = batch.len();
        metrics::counter!("ova_checklist_saver_flushes_total", "trigger" => trigger).increment(1);

        // The flusher returns failures in order; they stay ahead of later items.
        self.buffer = self.flusher.flush(&self.cancel, batch).await;
        self.record_buffered();

        debug!(
            trigger,
            flushed = count - self.buffer.len(),
            retained = self.buffer.len(),
            "Saver flush finished"
        );
    }

    fn report_dropped(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let ids: Vec<&str> = self.buffer.iter().map(|c| c.id.as_str()).collect();
        error!(
            count = self.buffer.len(),
            checklist_ids = ?ids,
            "Saver closed with unflushed checklists, dropping them"
        );
        metrics::counter!("ova_checklist_saver_dropped_items_total")
            .increment(self.buffer.len() as u64);
        self.buffer.clear();
        self.record_buffered();
    }

    fn record_buffered(&self) {
        metrics::gauge!("ova_checklist_saver_buffered_items").set(self.buffer.len() as f64);
    }
}
