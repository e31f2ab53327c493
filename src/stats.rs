use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics collected during the extraction process
#[derive(Debug, Default)]
pub struct ExtractionStats {
    pub pages_seen: AtomicU64,
    pub pages_eligible: AtomicU64,
    pub skipped_namespace: AtomicU64,
    pub skipped_redirect: AtomicU64,
    pub skipped_empty: AtomicU64,
    pub articles_cleaned: AtomicU64,
    pub articles_discarded: AtomicU64,
    pub cleaning_failures: AtomicU64,
    pub batches_written: AtomicU64,
    pub articles_written: AtomicU64,
    pub bytes_written: AtomicU64,
}

impl ExtractionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_pages_seen(&self) {
        self.pages_seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_eligible(&self) {
        self.pages_eligible.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped_namespace(&self) {
        self.skipped_namespace.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped_redirect(&self) {
        self.skipped_redirect.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_skipped_empty(&self) {
        self.skipped_empty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cleaned(&self) {
        self.articles_cleaned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_discarded(&self) {
        self.articles_discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failures(&self) {
        self.cleaning_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_batch(&self, articles: u64, bytes: u64) {
        self.batches_written.fetch_add(1, Ordering::Relaxed);
        self.articles_written.fetch_add(articles, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn pages(&self) -> u64 {
        self.pages_seen.load(Ordering::Relaxed)
    }

    pub fn eligible(&self) -> u64 {
        self.pages_eligible.load(Ordering::Relaxed)
    }

    pub fn skipped_namespace(&self) -> u64 {
        self.skipped_namespace.load(Ordering::Relaxed)
    }

    pub fn skipped_redirect(&self) -> u64 {
        self.skipped_redirect.load(Ordering::Relaxed)
    }

    pub fn skipped_empty(&self) -> u64 {
        self.skipped_empty.load(Ordering::Relaxed)
    }

    pub fn cleaned(&self) -> u64 {
        self.articles_cleaned.load(Ordering::Relaxed)
    }

    pub fn discarded(&self) -> u64 {
        self.articles_discarded.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.cleaning_failures.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> u64 {
        self.batches_written.load(Ordering::Relaxed)
    }

    pub fn articles_written(&self) -> u64 {
        self.articles_written.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }
}
