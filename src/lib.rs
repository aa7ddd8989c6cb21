//! Durable, time-rotated JSON archives with an ordered asynchronous write queue.
//!
//! A [`Chronicler`] appends records to `{log_name}.{epoch_ms}.json` files in
//! one directory. Each file is a JSON array that is closed when the file is
//! retired; retired files are gzip-compressed to `{name}.gz` in the background.

pub mod chronicler;
pub mod clock;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod lifecycle;
pub mod record;
pub mod scheduler;
pub mod storage;

pub use chronicler::{Chronicler, NO_CURRENT_FILE};
pub use clock::{Clock, ManualClock, QuantaClock, SystemClock};
pub use config::ChroniclerConfig;
pub use descriptor::{ChroniclerProperties, HostedChronicler, Identity};
pub use error::{Error, Result};
pub use lifecycle::{CompactionStats, RotationSettings};
pub use record::Record;
pub use scheduler::{PendingWrite, SchedulerState};
