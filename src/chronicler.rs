use std::path::Path;
use std::sync::Arc;

use log::{debug, info};
use tokio::sync::{mpsc, oneshot, OnceCell};

use crate::clock::{Clock, SystemClock};
use crate::config::ChroniclerConfig;
use crate::descriptor::Identity;
use crate::error::{Error, Result};
use crate::lifecycle::{CompactionStats, RotationPolicy};
use crate::record::{serialize_record, Record};
use crate::scheduler::{
    Command, PendingOperation, PendingWrite, SchedulerState, Shared, Worker,
};
use crate::storage::ArchiveWriter;

/// Text hosts show when no archive file has been created yet.
pub const NO_CURRENT_FILE: &str = "N/A";

/// Appends records to time-rotated JSON array archives.
///
/// Writes are queued and committed by a background task in submission order.
/// Retired files are gzip-compressed in the background. Call [`dispose`] to
/// drain the queue and close the active file; dropping the handle does the
/// same in the background without reporting the outcome.
///
/// Must be opened inside a tokio runtime.
///
/// [`dispose`]: Chronicler::dispose
pub struct Chronicler {
    identity: Identity,
    config: ChroniclerConfig,
    policy: RotationPolicy,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
    disposal: OnceCell<Result<()>>,
}

impl Chronicler {
    pub fn open(config: ChroniclerConfig) -> Result<Self> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(config: ChroniclerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::Config("a tokio runtime is required to open a chronicler".to_string())
        })?;

        let policy = RotationPolicy::from_settings(&config.rotation);
        let shared = Arc::new(Shared::new());
        let (commands, receiver) = mpsc::unbounded_channel();
        let worker = Worker::new(
            ArchiveWriter::new(&config.directory, &config.log_name),
            policy,
            Arc::clone(&clock),
            Arc::clone(&shared),
            config.batch_interval(),
        );
        runtime.spawn(worker.run(receiver));

        debug!(
            "opened chronicler {} in {} (rotation every {} ms)",
            config.log_name,
            config.directory.display(),
            policy.interval_ms()
        );

        Ok(Self {
            identity: Identity::new(config.log_name.clone()),
            config,
            policy,
            clock,
            shared,
            commands,
            disposal: OnceCell::new(),
        })
    }

    #[must_use]
    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn config(&self) -> &ChroniclerConfig {
        &self.config
    }

    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    pub fn log_name(&self) -> &str {
        &self.config.log_name
    }

    pub fn rotation_interval_ms(&self) -> u64 {
        self.policy.interval_ms()
    }

    /// Queue a record for writing.
    ///
    /// The record is serialized before this returns. The returned future
    /// resolves once this record has been written to the archive, or with the
    /// error that prevented it. After disposal it fails with
    /// [`Error::Disposed`] without touching the queue.
    pub fn save_record<R: Record + ?Sized>(&self, record: &R) -> PendingWrite {
        if self.shared.is_disposed() {
            return PendingWrite::rejected(Error::Disposed);
        }
        let serialized = match serialize_record(record) {
            Ok(serialized) => serialized,
            Err(err) => return PendingWrite::rejected(err.into()),
        };
        let (operation, receipt) = PendingOperation::new(serialized);
        match self.shared.enqueue(operation) {
            Ok(()) => PendingWrite::queued(receipt),
            Err(_) => PendingWrite::rejected(Error::Disposed),
        }
    }

    /// Write everything queued so far without waiting for the batch interval.
    ///
    /// Resolves after every previously submitted record has been committed or
    /// has failed.
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        if self.commands.send(Command::Flush(ack)).is_err() {
            return self.stopped();
        }
        match done.await {
            Ok(()) => Ok(()),
            Err(_) => self.stopped(),
        }
    }

    /// Retire the active file now and return the name of its successor.
    pub async fn rotate_log(&self) -> Result<String> {
        if self.shared.is_disposed() {
            return Err(Error::Disposed);
        }
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::Rotate(reply))
            .map_err(|_| Error::Disposed)?;
        outcome.await.map_err(|_| Error::Disposed)?
    }

    /// Compress every retired archive of this chronicler now.
    pub async fn compact_logs(&self) -> Result<CompactionStats> {
        if self.shared.is_disposed() {
            return Err(Error::Disposed);
        }
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::Compact(reply))
            .map_err(|_| Error::Disposed)?;
        outcome.await.map_err(|_| Error::Disposed)?
    }

    /// Name of the archive currently written to, if one has been created.
    pub fn current_filename(&self) -> Option<String> {
        self.shared.status().current_filename
    }

    pub fn seconds_since_rotation(&self) -> i64 {
        let status = self.shared.status();
        self.policy
            .seconds_since_rotation(status.last_rotation_ms, self.clock.now_ms())
    }

    pub fn seconds_until_rotation(&self) -> i64 {
        let status = self.shared.status();
        self.policy
            .seconds_until_rotation(status.last_rotation_ms, self.clock.now_ms())
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.shared.state()
    }

    pub fn pending_writes(&self) -> usize {
        self.shared.pending_len()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Stop accepting writes, commit everything already queued and close the
    /// active archive.
    ///
    /// Idempotent: later calls, concurrent or not, return the outcome of the
    /// first without repeating the teardown.
    pub async fn dispose(&self) -> Result<()> {
        self.disposal.get_or_init(|| self.shutdown()).await.clone()
    }

    async fn shutdown(&self) -> Result<()> {
        self.shared.mark_disposed();
        let (reply, outcome) = oneshot::channel();
        if self.commands.send(Command::Shutdown(reply)).is_err() {
            return Err(Error::SchedulerStopped);
        }
        let result = outcome.await.unwrap_or(Err(Error::SchedulerStopped));
        info!("disposed chronicler {}", self.config.log_name);
        result
    }

    fn stopped(&self) -> Result<()> {
        if self.shared.is_disposed() {
            Ok(())
        } else {
            Err(Error::SchedulerStopped)
        }
    }
}
