//! Write scheduler.
//!
//! Callers enqueue serialized records; a single worker task owns the
//! [`ArchiveWriter`] and drains the queue in batches, one operation at a time,
//! in submission order.
//!
//! # Architecture
//!
//! ```text
//! [save_record()] → [Shared::enqueue] ──────────────┐
//!                                                   ▼
//! [flush/rotate/dispose] → [Command channel] → [Worker::run]
//!                                                   │ drain: rotate? → append
//!                                                   ▼
//!                                  [ArchiveWriter] ─(rotation)→ [compact task]
//! ```
//!
//! The worker wakes every batch interval, or as soon as a command arrives.
//! Every command drains queued writes before it acts, so records submitted
//! ahead of a flush, a forced rotation or disposal land first.

use std::collections::VecDeque;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep, Instant};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::lifecycle::{compact, CompactionStats, RotationPolicy};
use crate::storage::{ArchiveWriter, OpenArchives};

/// Stand-in deadline for batch intervals too long to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Lifecycle of the batch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Draining,
    Disposed,
}

impl SchedulerState {
    fn as_u8(self) -> u8 {
        match self {
            SchedulerState::Idle => 0,
            SchedulerState::Draining => 1,
            SchedulerState::Disposed => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => SchedulerState::Idle,
            1 => SchedulerState::Draining,
            _ => SchedulerState::Disposed,
        }
    }
}

/// One caller's write, waiting for the worker.
pub(crate) struct PendingOperation {
    serialized: String,
    done: oneshot::Sender<Result<()>>,
}

impl PendingOperation {
    pub(crate) fn new(serialized: String) -> (Self, oneshot::Receiver<Result<()>>) {
        let (done, receipt) = oneshot::channel();
        (Self { serialized, done }, receipt)
    }
}

pub(crate) enum Command {
    Flush(oneshot::Sender<()>),
    Rotate(oneshot::Sender<Result<String>>),
    Compact(oneshot::Sender<Result<CompactionStats>>),
    Shutdown(oneshot::Sender<Result<()>>),
}

#[derive(Default)]
struct Queue {
    operations: VecDeque<PendingOperation>,
    disposed: bool,
}

/// Snapshot of the worker's file bookkeeping, readable without the worker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ArchiveStatus {
    pub(crate) current_filename: Option<String>,
    pub(crate) last_rotation_ms: Option<i64>,
}

/// State shared between the public handle and the worker.
pub(crate) struct Shared {
    // The disposed flag lives under the queue lock: a submission either
    // enters the queue before disposal or is rejected.
    queue: Mutex<Queue>,
    state: AtomicU8,
    status: Mutex<ArchiveStatus>,
    compaction: tokio::sync::Mutex<()>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            state: AtomicU8::new(SchedulerState::Idle.as_u8()),
            status: Mutex::new(ArchiveStatus::default()),
            compaction: tokio::sync::Mutex::new(()),
        }
    }

    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue an operation, handing it back if the chronicler is disposed.
    pub(crate) fn enqueue(
        &self,
        operation: PendingOperation,
    ) -> std::result::Result<(), PendingOperation> {
        let mut queue = self.queue();
        if queue.disposed {
            return Err(operation);
        }
        queue.operations.push_back(operation);
        Ok(())
    }

    fn pop_front(&self) -> Option<PendingOperation> {
        self.queue().operations.pop_front()
    }

    /// Returns whether this call performed the transition.
    pub(crate) fn mark_disposed(&self) -> bool {
        let mut queue = self.queue();
        let first = !queue.disposed;
        queue.disposed = true;
        first
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.queue().disposed
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.queue().operations.len()
    }

    pub(crate) fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn status(&self) -> ArchiveStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, writer: &ArchiveWriter) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.current_filename = writer.current_filename().map(str::to_owned);
        status.last_rotation_ms = writer.last_rotation_ms();
    }

    /// One compaction pass at a time per chronicler.
    async fn compact(
        &self,
        directory: &Path,
        log_name: &str,
        open: &OpenArchives,
    ) -> Result<CompactionStats> {
        let _guard = self.compaction.lock().await;
        compact(directory, log_name, open).await
    }
}

/// Future for one submitted record. Resolves once the record is on disk.
#[must_use = "the write is queued either way; await it to observe the outcome"]
pub struct PendingWrite {
    state: PendingState,
}

enum PendingState {
    Rejected(Option<Error>),
    Queued(oneshot::Receiver<Result<()>>),
}

impl PendingWrite {
    pub(crate) fn rejected(err: Error) -> Self {
        Self {
            state: PendingState::Rejected(Some(err)),
        }
    }

    pub(crate) fn queued(receipt: oneshot::Receiver<Result<()>>) -> Self {
        Self {
            state: PendingState::Queued(receipt),
        }
    }
}

impl Future for PendingWrite {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            PendingState::Rejected(err) => {
                Poll::Ready(Err(err.take().unwrap_or(Error::Disposed)))
            }
            PendingState::Queued(receipt) => {
                Pin::new(receipt).poll(cx).map(|outcome| match outcome {
                    Ok(result) => result,
                    Err(_) => Err(Error::SchedulerStopped),
                })
            }
        }
    }
}

/// The batch loop. Sole owner of the active archive handle.
pub(crate) struct Worker {
    writer: ArchiveWriter,
    policy: RotationPolicy,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
    batch_interval: Duration,
}

impl Worker {
    pub(crate) fn new(
        writer: ArchiveWriter,
        policy: RotationPolicy,
        clock: Arc<dyn Clock>,
        shared: Arc<Shared>,
        batch_interval: Duration,
    ) -> Self {
        Self {
            writer,
            policy,
            clock,
            shared,
            batch_interval,
        }
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let timer = sleep(self.batch_interval);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                _ = &mut timer => {
                    self.drain().await;
                    timer.as_mut().reset(self.next_batch());
                }
                command = commands.recv() => match command {
                    Some(Command::Flush(ack)) => {
                        self.drain().await;
                        let _ = ack.send(());
                    }
                    Some(Command::Rotate(reply)) => {
                        self.drain().await;
                        let result = if self.shared.is_disposed() {
                            Err(Error::Disposed)
                        } else {
                            self.rotate().await
                        };
                        let _ = reply.send(result);
                    }
                    Some(Command::Compact(reply)) => {
                        if self.shared.is_disposed() {
                            let _ = reply.send(Err(Error::Disposed));
                        } else {
                            self.spawn_compaction(Some(reply));
                        }
                    }
                    Some(Command::Shutdown(reply)) => {
                        let result = self.shutdown().await;
                        let _ = reply.send(result);
                        break;
                    }
                    None => {
                        // Handle dropped without dispose.
                        if let Err(err) = self.shutdown().await {
                            warn!("closing {} failed: {}", self.writer.log_name(), err);
                        }
                        break;
                    }
                },
            }
        }
    }

    fn next_batch(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.batch_interval)
            .unwrap_or_else(|| now + FAR_FUTURE)
    }

    async fn drain(&mut self) {
        let mut drained = 0usize;
        while let Some(operation) = self.shared.pop_front() {
            if drained == 0 {
                self.shared.set_state(SchedulerState::Draining);
            }
            let result = self.execute(&operation.serialized).await;
            if let Err(err) = &result {
                warn!("write to {} failed: {}", self.writer.log_name(), err);
            }
            let _ = operation.done.send(result);
            drained += 1;
        }
        if drained > 0 {
            debug!("drained {} writes for {}", drained, self.writer.log_name());
            self.shared.set_state(SchedulerState::Idle);
        }
    }

    async fn execute(&mut self, serialized: &str) -> Result<()> {
        let now_ms = self.clock.now_ms();
        if self.writer.ensure_active_file(now_ms).await? {
            self.shared.publish(&self.writer);
        } else if self.policy.should_rotate(self.writer.last_rotation_ms(), now_ms) {
            self.rotate_at(now_ms).await?;
        }
        self.writer.append(serialized).await
    }

    async fn rotate(&mut self) -> Result<String> {
        let now_ms = self.clock.now_ms();
        self.rotate_at(now_ms).await
    }

    async fn rotate_at(&mut self, now_ms: i64) -> Result<String> {
        let result = self.writer.rotate(now_ms).await;
        self.shared.publish(&self.writer);
        let name = result?;
        info!("rotated {} to {}", self.writer.log_name(), name);
        self.spawn_compaction(None);
        Ok(name)
    }

    /// Compress retired archives in the background. Files the writer holds
    /// open, now or by the time the pass reaches them, are skipped.
    fn spawn_compaction(&self, reply: Option<oneshot::Sender<Result<CompactionStats>>>) {
        let open = self.writer.open_archives().clone();
        let shared = Arc::clone(&self.shared);
        let directory = self.writer.directory().to_path_buf();
        let log_name = self.writer.log_name().to_string();
        tokio::spawn(async move {
            let result = shared
                .compact(&directory, &log_name, &open)
                .await;
            match &result {
                Ok(stats) if stats.has_errors() => {
                    warn!("compaction of {} had errors: {}", log_name, stats.summary());
                }
                Ok(stats) => debug!("compaction of {}: {}", log_name, stats.summary()),
                Err(err) => warn!("compaction of {} failed: {}", log_name, err),
            }
            if let Some(reply) = reply {
                let _ = reply.send(result);
            }
        });
    }

    /// Drain whatever was queued before disposal, then close the archive.
    async fn shutdown(&mut self) -> Result<()> {
        self.shared.mark_disposed();
        self.drain().await;
        let result = self.writer.close().await;
        self.shared.publish(&self.writer);
        self.shared.set_state(SchedulerState::Disposed);
        result
    }
}
