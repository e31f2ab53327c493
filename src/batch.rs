use crate::models::{Batch, CleanArticle};
use tracing::warn;

/// Groups articles into numbered batches in the order they arrive.
///
/// Numbers start at 0 and are handed out only when a batch is emitted, so they
/// are gap-free. Only the batch returned by [`Batcher::finish`] may be short.
pub struct Batcher {
    batch_size: usize,
    pending: Vec<CleanArticle>,
    next_number: u32,
}

impl Batcher {
    pub fn new(batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch size must be at least 1");
        Self {
            batch_size,
            pending: Vec::with_capacity(batch_size),
            next_number: 0,
        }
    }

    /// Adds an article, returning a full batch once `batch_size` is reached.
    ///
    /// The cleaner never yields empty text. Debug builds panic on it; release
    /// builds drop the article and log it.
    pub fn push(&mut self, article: CleanArticle) -> Option<Batch> {
        debug_assert!(
            !article.text.is_empty(),
            "article {} reached the batcher with empty text",
            article.id
        );
        if article.text.is_empty() {
            warn!(page_id = article.id, "Dropping article with empty text");
            return None;
        }

        self.pending.push(article);
        if self.pending.len() >= self.batch_size {
            Some(self.take())
        } else {
            None
        }
    }

    /// Emits whatever is left as a final, possibly short, batch.
    pub fn finish(mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    /// Articles accepted but not yet emitted.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    fn take(&mut self) -> Batch {
        let articles = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let batch = Batch {
            number: self.next_number,
            articles,
        };
        self.next_number += 1;
        batch
    }
}
