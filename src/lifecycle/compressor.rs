//! Atomic gzip compression of one retired archive.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::Result;
use crate::storage::naming::COMPRESSED_SUFFIX;

/// Compress `path` into `{path}.gz` and remove the original.
///
/// The gzip stream is written to a `.gz.tmp` file first and renamed into place
/// after it is synced, so the original is only removed once a complete
/// compressed copy exists. Returns `(original_size, compressed_size)`.
///
/// Blocking; run it on the blocking pool.
pub fn compress_archive(path: &Path) -> Result<(u64, u64)> {
    let gz_path = suffixed(path, COMPRESSED_SUFFIX);
    let gz_tmp = suffixed(path, ".gz.tmp");

    // A crashed earlier pass may have left a partial stream behind.
    let _ = std::fs::remove_file(&gz_tmp);

    let original_size = match write_gzip(path, &gz_tmp) {
        Ok(size) => size,
        Err(err) => {
            let _ = std::fs::remove_file(&gz_tmp);
            return Err(err);
        }
    };
    let compressed_size = std::fs::metadata(&gz_tmp)?.len();

    std::fs::rename(&gz_tmp, &gz_path)?;

    std::fs::remove_file(path)?;

    Ok((original_size, compressed_size))
}

fn write_gzip(src: &Path, dest: &Path) -> Result<u64> {
    let mut input = BufReader::new(File::open(src)?);
    let output = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(dest)?;

    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    let original_size = std::io::copy(&mut input, &mut encoder)?;
    let writer = encoder.finish()?;
    let output = writer.into_inner().map_err(|err| err.into_error())?;
    output.sync_all()?;
    Ok(original_size)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_compress_archive_atomic() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit.1.json");
        let body = format!("[{}]", vec!["{\"k\":\"value\"}"; 200].join(",\n"));
        std::fs::write(&path, &body)?;

        let (original, compressed) = compress_archive(&path)?;

        assert_eq!(original, body.len() as u64);
        assert!(compressed > 0 && compressed < original);
        assert!(!path.exists(), "plaintext should be removed");

        let gz_path = temp_dir.path().join("audit.1.json.gz");
        let mut decoded = String::new();
        GzDecoder::new(File::open(&gz_path)?).read_to_string(&mut decoded)?;
        assert_eq!(decoded, body);
        Ok(())
    }

    #[test]
    fn test_compress_archive_cleans_up_tmp() -> Result<()> {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit.1.json");
        std::fs::write(&path, "[1]")?;
        std::fs::write(temp_dir.path().join("audit.1.json.gz.tmp"), b"old")?;

        compress_archive(&path)?;

        assert!(!temp_dir.path().join("audit.1.json.gz.tmp").exists());
        assert!(temp_dir.path().join("audit.1.json.gz").exists());
        Ok(())
    }

    #[test]
    fn test_missing_source_keeps_nothing_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("audit.1.json");

        assert!(compress_archive(&path).is_err());
        assert!(!temp_dir.path().join("audit.1.json.gz").exists());
        assert!(!temp_dir.path().join("audit.1.json.gz.tmp").exists());
    }
}
