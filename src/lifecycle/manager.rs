//! Compaction of retired archives in a log directory.

use std::path::{Path, PathBuf};
use std::time::Instant;

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::lifecycle::{compress_archive, CompactionStats};
use crate::storage::naming::{is_compressed, parse_archive_timestamp};
use crate::storage::OpenArchives;

/// Compress every retired plaintext archive of `log_name` in `directory`.
///
/// Archives named in `open` are still being written and are left alone. The
/// set is consulted when the directory is listed and again right before each
/// file is compressed. Files are processed one after another, oldest first; a failure on one file is recorded in the
/// stats and does not stop the rest of the pass. Only a failure to list the
/// directory fails the pass as a whole.
pub async fn compact(
    directory: &Path,
    log_name: &str,
    open: &OpenArchives,
) -> Result<CompactionStats> {
    let start = Instant::now();
    let mut stats = CompactionStats::new();

    let candidates = retired_archives(directory, log_name, open).await?;
    stats.scanned_count = candidates.len();

    for (name, path) in candidates {
        if open.contains(&name) {
            debug!("{} was opened for writing; skipping", path.display());
            stats.scanned_count -= 1;
            continue;
        }
        match compress_on_blocking_pool(path.clone()).await {
            Ok((original_size, compressed_size)) => {
                debug!(
                    "compressed {} ({} -> {} bytes)",
                    path.display(),
                    original_size,
                    compressed_size
                );
                stats.record_compression(original_size, compressed_size);
            }
            Err(err) => {
                warn!("failed to compress {}: {}", path.display(), err);
                stats.record_error(format!("{}: {}", path.display(), err));
            }
        }
    }

    stats.duration = start.elapsed();
    Ok(stats)
}

/// Plaintext archives of `log_name` not held open, oldest first.
async fn retired_archives(
    directory: &Path,
    log_name: &str,
    open: &OpenArchives,
) -> Result<Vec<(String, PathBuf)>> {
    if !tokio::fs::try_exists(directory).await? {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    let mut entries = tokio::fs::read_dir(directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let name = match file_name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if is_compressed(name) || open.contains(name) {
            continue;
        }
        let timestamp = match parse_archive_timestamp(log_name, name) {
            Some(timestamp) => timestamp,
            None => continue,
        };
        if !entry.file_type().await?.is_file() {
            continue;
        }
        found.push((timestamp, name.to_string(), entry.path()));
    }

    found.sort_unstable();
    Ok(found
        .into_iter()
        .map(|(_, name, path)| (name, path))
        .collect())
}

async fn compress_on_blocking_pool(path: PathBuf) -> Result<(u64, u64)> {
    tokio::task::spawn_blocking(move || compress_archive(&path))
        .await
        .map_err(|err| Error::from(std::io::Error::new(std::io::ErrorKind::Other, err)))?
}
