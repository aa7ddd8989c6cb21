//! Statistics for compaction passes.

use std::time::Duration;

/// Statistics from one compaction pass over a log directory.
#[derive(Debug, Clone, Default)]
pub struct CompactionStats {
    /// Number of retired plaintext archives found.
    pub scanned_count: usize,

    /// Number of archives compressed and removed.
    pub compressed_count: usize,

    /// Plaintext bytes before compression.
    pub original_bytes: u64,

    /// Total bytes saved by compression.
    pub bytes_saved: u64,

    /// Errors encountered during the pass, one per failed file.
    pub errors: Vec<String>,

    /// Time taken for the pass.
    pub duration: Duration,
}

impl CompactionStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful compression.
    pub fn record_compression(&mut self, original_size: u64, compressed_size: u64) {
        self.compressed_count += 1;
        self.original_bytes += original_size;
        self.bytes_saved += original_size.saturating_sub(compressed_size);
    }

    pub fn record_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Fraction of plaintext bytes removed by compression (0.0 to 1.0).
    pub fn compression_ratio(&self) -> f64 {
        if self.original_bytes == 0 {
            0.0
        } else {
            self.bytes_saved as f64 / self.original_bytes as f64
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "scanned={} compressed={} saved={}B ratio={:.2} errors={} took={:?}",
            self.scanned_count,
            self.compressed_count,
            self.bytes_saved,
            self.compression_ratio(),
            self.error_count(),
            self.duration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_compression() {
        let mut stats = CompactionStats::new();
        stats.record_compression(1_000, 200);
        stats.record_compression(500, 600);

        assert_eq!(stats.compressed_count, 2);
        assert_eq!(stats.original_bytes, 1_500);
        assert_eq!(stats.bytes_saved, 800);
        assert!((stats.compression_ratio() - 800.0 / 1_500.0).abs() < 1e-9);
    }

    #[test]
    fn test_errors() {
        let mut stats = CompactionStats::new();
        assert!(!stats.has_errors());
        assert_eq!(stats.compression_ratio(), 0.0);

        stats.record_error("audit.1.json: permission denied".to_string());
        assert!(stats.has_errors());
        assert_eq!(stats.error_count(), 1);
        assert!(stats.summary().contains("errors=1"));
    }
}
