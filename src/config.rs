use crate::error::SetupError;
use std::path::{Path, PathBuf};

/// Namespace id of encyclopedia articles (everything else is talk, user, file, ...)
pub const MAIN_NAMESPACE: i32 = 0;

/// Articles per output file
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Pages handed to a worker in one dispatch
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Chunks that may wait in the work queue per worker before the reader blocks
pub const QUEUE_DEPTH_PER_WORKER: usize = 4;

/// zstd level used for batch files
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Progress update interval (tick every N results)
pub const PROGRESS_INTERVAL: u64 = 1000;

pub const BATCH_FILE_PREFIX: &str = "wikipedia_batch_";
pub const BATCH_FILE_SUFFIX: &str = ".jsonl.zst";

pub const ARTICLE_URL_PREFIX: &str = "https://en.wikipedia.org/wiki?curid=";

/// Section headings whose whole section is dropped from article text
pub const SECTION_DENYLIST: [&str; 6] = [
    "See also",
    "Further reading",
    "Notes",
    "References",
    "External links",
    "Bibliography",
];

/// Wikilinks with this target prefix are category memberships, not prose
pub const CATEGORY_PREFIX: &str = "Category:";

/// Deepest link/template/tag nesting the markup parser accepts
pub const MAX_NESTING_DEPTH: usize = 64;

/// One fewer than the hardware threads, leaving a core for the reader and writer.
pub fn default_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Everything a pipeline run needs, fixed before the run starts.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dump_path: PathBuf,
    pub output_dir: PathBuf,
    pub batch_size: usize,
    pub num_workers: usize,
    pub chunk_size: usize,
    pub compression_level: i32,
    /// Stop after this many eligible pages (for testing)
    pub limit: Option<u64>,
}

impl PipelineConfig {
    pub fn new(dump_path: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Self {
        Self {
            dump_path: dump_path.as_ref().to_path_buf(),
            output_dir: output_dir.as_ref().to_path_buf(),
            batch_size: DEFAULT_BATCH_SIZE,
            num_workers: default_workers(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            limit: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    /// Checks values that would otherwise only fail deep inside the run.
    pub fn validate(&self) -> Result<(), SetupError> {
        if self.batch_size == 0 {
            return Err(SetupError::InvalidConfig("batch size must be at least 1".into()));
        }
        if self.num_workers == 0 {
            return Err(SetupError::InvalidConfig("worker count must be at least 1".into()));
        }
        if self.chunk_size == 0 {
            return Err(SetupError::InvalidConfig("chunk size must be at least 1".into()));
        }
        if !zstd::compression_level_range().contains(&self.compression_level) {
            return Err(SetupError::InvalidConfig(format!(
                "compression level {} outside {:?}",
                self.compression_level,
                zstd::compression_level_range()
            )));
        }
        if !self.dump_path.is_file() {
            return Err(SetupError::DumpMissing(self.dump_path.clone()));
        }
        Ok(())
    }

    /// Bound on queued chunks between the reader and the workers.
    pub fn work_queue_depth(&self) -> usize {
        self.num_workers * QUEUE_DEPTH_PER_WORKER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_workers_is_at_least_one() {
        assert!(default_workers() >= 1);
    }

    #[test]
    fn new_uses_defaults() {
        let config = PipelineConfig::new("dump.xml.bz2", "out");
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.compression_level, DEFAULT_COMPRESSION_LEVEL);
        assert_eq!(config.num_workers, default_workers());
        assert!(config.limit.is_none());
    }

    #[test]
    fn validate_rejects_missing_dump() {
        let config = PipelineConfig::new("/definitely/not/here.xml.bz2", "out");
        assert!(matches!(config.validate(), Err(SetupError::DumpMissing(_))));
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let dump = NamedTempFile::new().unwrap();
        let config = PipelineConfig::new(dump.path(), "out").with_batch_size(0);
        assert!(matches!(config.validate(), Err(SetupError::InvalidConfig(_))));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let dump = NamedTempFile::new().unwrap();
        let config = PipelineConfig::new(dump.path(), "out").with_workers(0);
        assert!(matches!(config.validate(), Err(SetupError::InvalidConfig(_))));
    }

    #[test]
    fn validate_rejects_out_of_range_level() {
        let dump = NamedTempFile::new().unwrap();
        let config = PipelineConfig::new(dump.path(), "out").with_compression_level(1000);
        assert!(matches!(config.validate(), Err(SetupError::InvalidConfig(_))));
    }

    #[test]
    fn validate_accepts_existing_dump() {
        let dump = NamedTempFile::new().unwrap();
        let config = PipelineConfig::new(dump.path(), "out").with_workers(2);
        assert!(config.validate().is_ok());
        assert_eq!(config.work_queue_depth(), 2 * QUEUE_DEPTH_PER_WORKER);
    }
}
