//! Epoch filenames: `{log_name}.{epoch_ms}.json`, compressed as `{name}.gz`.

use std::path::{Path, PathBuf};

pub const ARCHIVE_SUFFIX: &str = ".json";
pub const COMPRESSED_SUFFIX: &str = ".gz";

pub fn archive_filename(log_name: &str, epoch_ms: i64) -> String {
    format!("{log_name}.{epoch_ms}{ARCHIVE_SUFFIX}")
}

pub fn archive_path(directory: &Path, log_name: &str, epoch_ms: i64) -> PathBuf {
    directory.join(archive_filename(log_name, epoch_ms))
}

pub fn compressed_filename(name: &str) -> String {
    format!("{name}{COMPRESSED_SUFFIX}")
}

pub fn is_compressed(name: &str) -> bool {
    name.ends_with(".json.gz")
}

/// Creation timestamp of a plaintext archive owned by `log_name`.
///
/// Only `{log_name}.{digits}.json` matches; another logger whose name merely
/// starts with `log_name` does not.
pub fn parse_archive_timestamp(log_name: &str, file_name: &str) -> Option<i64> {
    let stem = file_name
        .strip_prefix(log_name)?
        .strip_prefix('.')?
        .strip_suffix(ARCHIVE_SUFFIX)?;
    if stem.is_empty() || !stem.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    stem.parse::<i64>().ok()
}
