use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, warn};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};
use crate::storage::naming::{archive_filename, archive_path, compressed_filename};

const OPEN_BRACKET: &[u8] = b"[";
const CLOSE_BRACKET: &[u8] = b"]";
const SEPARATOR: &str = ",\n";

/// Names of archives the writer holds open.
///
/// A name is claimed before the file is created and released only after its
/// closing `]` is on disk, so compaction can skip it by name at any moment in
/// between. Clones share one set.
#[derive(Debug, Clone, Default)]
pub struct OpenArchives {
    names: Arc<Mutex<HashSet<String>>>,
}

impl OpenArchives {
    fn names(&self) -> MutexGuard<'_, HashSet<String>> {
        self.names.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().contains(name)
    }

    /// Returns false when the name was already held.
    pub(crate) fn claim(&self, name: &str) -> bool {
        self.names().insert(name.to_string())
    }

    pub(crate) fn release(&self, name: &str) {
        self.names().remove(name);
    }
}

/// The one archive file open for writing.
struct ActiveFile {
    name: String,
    path: PathBuf,
    file: File,
    first_write: bool,
}

/// Owns the active archive handle and the JSON array framing around it.
///
/// Between open and close a file holds `[` followed by comma-separated records;
/// the closing `]` is written only when the file is retired.
pub struct ArchiveWriter {
    directory: PathBuf,
    log_name: String,
    active: Option<ActiveFile>,
    open: OpenArchives,
    last_rotation_ms: Option<i64>,
    files_created: u64,
}

impl ArchiveWriter {
    pub fn new(directory: impl Into<PathBuf>, log_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            log_name: log_name.into(),
            active: None,
            open: OpenArchives::default(),
            last_rotation_ms: None,
            files_created: 0,
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    pub fn current_filename(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.name.as_str())
    }

    /// Shared view of the names this writer holds open.
    pub fn open_archives(&self) -> &OpenArchives {
        &self.open
    }

    pub fn last_rotation_ms(&self) -> Option<i64> {
        self.last_rotation_ms
    }

    pub fn files_created(&self) -> u64 {
        self.files_created
    }

    /// True when there is no active file, or the active file vanished from disk.
    pub async fn needs_new_file(&self) -> Result<bool> {
        match &self.active {
            None => Ok(true),
            Some(active) => Ok(!tokio::fs::try_exists(&active.path).await?),
        }
    }

    /// Open a fresh archive unless the current one is usable.
    ///
    /// Returns whether a new file was created.
    pub async fn ensure_active_file(&mut self, now_ms: i64) -> Result<bool> {
        if !self.needs_new_file().await? {
            return Ok(false);
        }
        if let Some(stale) = self.active.take() {
            warn!(
                "active archive {} is missing on disk; starting a new file",
                stale.path.display()
            );
            self.open.release(&stale.name);
        }
        let fresh = self.create_file(now_ms).await?;
        self.install(fresh, now_ms);
        Ok(true)
    }

    /// Retire the active file and continue in a new one.
    ///
    /// The new file is opened before the old one is closed, so a failure to
    /// open leaves the current file active. Once the new file is open the
    /// rotation stands: a failure to close the old one is logged, not returned.
    /// Returns the new filename.
    pub async fn rotate(&mut self, now_ms: i64) -> Result<String> {
        let fresh = self.create_file(now_ms).await?;
        let name = fresh.name.clone();
        let previous = self.active.take();
        self.install(fresh, now_ms);

        if let Some(previous) = previous {
            let path = previous.path.clone();
            if let Err(err) = self.retire(previous).await {
                warn!("closing retired archive {} failed: {}", path.display(), err);
            }
        }
        Ok(name)
    }

    /// Append one serialized record to the active file.
    pub async fn append(&mut self, serialized: &str) -> Result<()> {
        let active = self.active.as_mut().ok_or(Error::NoActiveFile)?;
        if active.first_write {
            active.file.write_all(serialized.as_bytes()).await?;
        } else {
            let mut buf = String::with_capacity(SEPARATOR.len() + serialized.len());
            buf.push_str(SEPARATOR);
            buf.push_str(serialized);
            active.file.write_all(buf.as_bytes()).await?;
        }
        active.file.flush().await?;
        active.first_write = false;
        Ok(())
    }

    /// Close the JSON array and release the handle. No-op without an active file.
    pub async fn close(&mut self) -> Result<()> {
        match self.active.take() {
            Some(active) => self.retire(active).await,
            None => Ok(()),
        }
    }

    async fn retire(&self, active: ActiveFile) -> Result<()> {
        let name = active.name.clone();
        let result = finalize(active).await;
        self.open.release(&name);
        result
    }

    fn install(&mut self, fresh: ActiveFile, now_ms: i64) {
        self.active = Some(fresh);
        self.last_rotation_ms = Some(now_ms);
        self.files_created = self.files_created.saturating_add(1);
    }

    async fn create_file(&self, now_ms: i64) -> Result<ActiveFile> {
        tokio::fs::create_dir_all(&self.directory).await?;

        // Two files created within one millisecond would share a name. A
        // compacted predecessor still owns its name through the `.gz` copy.
        let mut stamp = now_ms;
        loop {
            let name = archive_filename(&self.log_name, stamp);
            if tokio::fs::try_exists(self.directory.join(compressed_filename(&name))).await? {
                stamp = stamp.saturating_add(1);
                continue;
            }
            let path = archive_path(&self.directory, &self.log_name, stamp);
            let claimed = self.open.claim(&name);
            match open_new(&path).await {
                Ok(file) => {
                    debug!("created archive {}", path.display());
                    return Ok(ActiveFile {
                        name,
                        path,
                        file,
                        first_write: true,
                    });
                }
                Err(err) => {
                    if claimed {
                        self.open.release(&name);
                    }
                    match err {
                        Error::Io(io) if io.kind() == ErrorKind::AlreadyExists => {
                            stamp = stamp.saturating_add(1);
                        }
                        err => return Err(err),
                    }
                }
            }
        }
    }
}

async fn open_new(path: &Path) -> Result<File> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(OPEN_BRACKET).await?;
    file.flush().await?;
    Ok(file)
}

async fn finalize(mut active: ActiveFile) -> Result<()> {
    active.file.write_all(CLOSE_BRACKET).await?;
    active.file.flush().await?;
    active.file.sync_all().await?;
    debug!("closed archive {}", active.path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_first_file_holds_open_bracket() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("nested").join("logs");
        let mut writer = ArchiveWriter::new(&dir, "audit");

        assert!(writer.needs_new_file().await?);
        assert!(writer.ensure_active_file(1_000).await?);
        assert!(!writer.ensure_active_file(1_001).await?);

        assert_eq!(writer.current_filename(), Some("audit.1000.json"));
        assert_eq!(writer.last_rotation_ms(), Some(1_000));
        assert_eq!(std::fs::read(dir.join("audit.1000.json"))?, b"[");
        Ok(())
    }

    #[tokio::test]
    async fn test_append_and_close_frames_json_array() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ArchiveWriter::new(temp_dir.path(), "audit");

        writer.ensure_active_file(5).await?;
        writer.append(r#"{"a":1}"#).await?;
        writer.append(r#"{"a":2}"#).await?;
        assert_eq!(
            std::fs::read_to_string(temp_dir.path().join("audit.5.json"))?,
            "[{\"a\":1},\n{\"a\":2}"
        );

        writer.close().await?;
        let text = std::fs::read_to_string(temp_dir.path().join("audit.5.json"))?;
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, serde_json::json!([{"a": 1}, {"a": 2}]));
        assert_eq!(writer.current_filename(), None);
        Ok(())
    }

    #[tokio::test]
    async fn test_rotate_closes_previous_and_resets_separator() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ArchiveWriter::new(temp_dir.path(), "audit");

        writer.ensure_active_file(10).await?;
        writer.append("1").await?;
        let name = writer.rotate(20).await?;
        writer.append("2").await?;

        assert_eq!(name, "audit.20.json");
        assert_eq!(writer.last_rotation_ms(), Some(20));
        assert_eq!(std::fs::read_to_string(temp_dir.path().join("audit.10.json"))?, "[1]");
        assert_eq!(std::fs::read_to_string(temp_dir.path().join("audit.20.json"))?, "[2");
        assert_eq!(writer.files_created(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_same_millisecond_rotation_gets_distinct_name() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ArchiveWriter::new(temp_dir.path(), "audit");

        writer.ensure_active_file(10).await?;
        let name = writer.rotate(10).await?;

        assert_eq!(name, "audit.11.json");
        assert!(writer.open_archives().contains("audit.11.json"));
        assert_eq!(std::fs::read_to_string(temp_dir.path().join("audit.10.json"))?, "[]");
        Ok(())
    }

    #[tokio::test]
    async fn test_compacted_name_is_not_reused() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("audit.10.json.gz"), b"gz")?;
        let mut writer = ArchiveWriter::new(temp_dir.path(), "audit");

        writer.ensure_active_file(10).await?;
        assert_eq!(writer.current_filename(), Some("audit.11.json"));
        Ok(())
    }

    #[tokio::test]
    async fn test_vanished_file_is_replaced() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ArchiveWriter::new(temp_dir.path(), "audit");

        writer.ensure_active_file(10).await?;
        std::fs::remove_file(temp_dir.path().join("audit.10.json"))?;

        assert!(writer.needs_new_file().await?);
        assert!(writer.ensure_active_file(30).await?);
        assert_eq!(writer.current_filename(), Some("audit.30.json"));
        Ok(())
    }

    #[tokio::test]
    async fn test_open_names_cover_active_file_until_closed() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ArchiveWriter::new(temp_dir.path(), "audit");
        let open = writer.open_archives().clone();

        writer.ensure_active_file(10).await?;
        assert!(open.contains("audit.10.json"));

        writer.rotate(20).await?;
        assert!(!open.contains("audit.10.json"));
        assert!(open.contains("audit.20.json"));

        std::fs::remove_file(temp_dir.path().join("audit.20.json"))?;
        writer.ensure_active_file(30).await?;
        assert!(!open.contains("audit.20.json"));
        assert!(open.contains("audit.30.json"));

        writer.close().await?;
        assert!(!open.contains("audit.30.json"));
        Ok(())
    }

    #[tokio::test]
    async fn test_rotation_stands_when_old_file_fails_to_close() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ArchiveWriter::new(temp_dir.path(), "audit");
        writer.ensure_active_file(10).await?;

        // A read-only handle makes writing the closing bracket fail.
        let old_path = temp_dir.path().join("audit.10.json");
        writer.active.as_mut().unwrap().file = File::open(&old_path).await?;

        let name = writer.rotate(20).await?;
        assert_eq!(name, "audit.20.json");
        assert_eq!(writer.current_filename(), Some("audit.20.json"));
        assert!(!writer.open_archives().contains("audit.10.json"));

        writer.append("1").await?;
        assert_eq!(std::fs::read_to_string(temp_dir.path().join("audit.20.json"))?, "[1");
        Ok(())
    }

    #[tokio::test]
    async fn test_append_without_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut writer = ArchiveWriter::new(temp_dir.path(), "audit");
        assert!(matches!(writer.append("1").await, Err(Error::NoActiveFile)));
        assert!(writer.close().await.is_ok());
    }
}
