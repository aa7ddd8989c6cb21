//! Archive lifecycle: when to retire a file, and what happens to it afterwards.
//!
//! - Rotation policy evaluation (time-based only)
//! - Atomic gzip compression of retired archives
//! - Directory compaction passes with statistics
//!
//! # Example
//!
//! ```rust,ignore
//! use chronicler::lifecycle::{compact, RotationPolicy, RotationSettings};
//!
//! let policy = RotationPolicy::from_settings(&RotationSettings::hours(1));
//! assert_eq!(policy.interval_ms(), 3_600_000);
//!
//! // Compress everything the writer does not hold open
//! let stats = compact(dir, "audit", writer.open_archives()).await?;
//! println!("{}", stats.summary());
//! ```

mod compressor;
mod manager;
mod policy;
mod stats;

pub use compressor::compress_archive;
pub use manager::compact;
pub use policy::{
    milliseconds_from_settings, RotationPolicy, RotationSettings, MS_PER_DAY, MS_PER_HOUR,
    MS_PER_MINUTE, MS_PER_SECOND,
};
pub use stats::CompactionStats;
