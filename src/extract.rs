use crate::batch::Batcher;
use crate::cleaner::clean_article;
use crate::config::{PipelineConfig, PROGRESS_INTERVAL};
use crate::error::{CleanError, SetupError};
use crate::models::{Batch, CleanArticle, RawPage};
use crate::pool::{PoolEvent, WorkerPool};
use crate::source::PageSource;
use crate::stats::ExtractionStats;
use crate::writer::{BatchReceipt, BatchWriter};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where a run is. Moves forward only, and never skips `Draining`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Idle,
    Streaming,
    Draining,
    Flushing,
    Done,
}

/// Outcome of a successful run.
#[derive(Debug)]
pub struct ExtractionReport {
    pub stats: ExtractionStats,
    pub batches: Vec<BatchReceipt>,
}

type CleanOutcome = (u64, Result<Option<CleanArticle>, CleanError>);

/// Streams the dump through the cleaner and writes every batch.
///
/// Setup problems fail before any page is read. A failed batch write aborts
/// the run immediately. A dump that breaks mid-stream still has its in-flight
/// pages cleaned and its last partial batch written before the error is
/// returned.
pub fn run_extraction(config: &PipelineConfig) -> Result<ExtractionReport> {
    config.validate()?;
    fs::create_dir_all(&config.output_dir).map_err(|source| SetupError::OutputDir {
        path: config.output_dir.clone(),
        source,
    })?;

    info!(
        dump = %config.dump_path.display(),
        output = %config.output_dir.display(),
        batch_size = config.batch_size,
        workers = config.num_workers,
        chunk_size = config.chunk_size,
        "Starting extraction"
    );

    let stats = ExtractionStats::new();
    let writer = BatchWriter::new(&config.output_dir).with_level(config.compression_level);
    let pool = WorkerPool::new(
        config.num_workers,
        config.chunk_size,
        config.work_queue_depth(),
    )?;

    let (outcome, batches) = {
        let source = PageSource::open(&config.dump_path, &stats)?.with_limit(config.limit);
        let mut pipeline = Pipeline::new(config.batch_size, &writer, &stats);

        pipeline.advance(PipelineState::Streaming);
        let streamed = pool.run(
            source,
            |page: &RawPage| -> CleanOutcome { (page.id, clean_article(page)) },
            |event| pipeline.handle(event),
        );

        let outcome = match streamed {
            Err(e) if pipeline.write_failed => Err(e),
            Ok(()) => pipeline.flush(),
            // Still write what was cleaned before the dump broke.
            Err(source_error) => match pipeline.flush() {
                Ok(()) => Err(source_error.context("Dump could not be read to the end")),
                Err(write_error) => Err(write_error),
            },
        };
        (outcome, pipeline.finish())
    };
    outcome?;

    info!(
        batches = stats.batches(),
        articles = stats.articles_written(),
        bytes = stats.bytes(),
        "Extraction finished"
    );

    Ok(ExtractionReport { stats, batches })
}

/// Coordinator-side state: owns the batcher and talks to the writer.
struct Pipeline<'a> {
    state: PipelineState,
    batcher: Option<Batcher>,
    writer: &'a BatchWriter,
    stats: &'a ExtractionStats,
    receipts: Vec<BatchReceipt>,
    progress: ProgressBar,
    results: u64,
    write_failed: bool,
}

impl<'a> Pipeline<'a> {
    fn new(batch_size: usize, writer: &'a BatchWriter, stats: &'a ExtractionStats) -> Self {
        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} [{elapsed_precise}] {pos} pages {msg}")
                .unwrap(),
        );
        progress.enable_steady_tick(Duration::from_millis(100));

        Self {
            state: PipelineState::Idle,
            batcher: Some(Batcher::new(batch_size)),
            writer,
            stats,
            receipts: Vec::new(),
            progress,
            results: 0,
            write_failed: false,
        }
    }

    fn advance(&mut self, next: PipelineState) {
        if next <= self.state {
            return;
        }
        if next > PipelineState::Draining && self.state < PipelineState::Draining {
            self.advance(PipelineState::Draining);
        }
        debug!(from = ?self.state, to = ?next, "Pipeline state change");
        self.state = next;
    }

    fn handle(&mut self, event: PoolEvent<RawPage, CleanOutcome>) -> Result<()> {
        match event {
            PoolEvent::Completed((id, outcome)) => {
                self.tick();
                match outcome {
                    Ok(Some(article)) => {
                        self.stats.inc_cleaned();
                        let full = self.batcher.as_mut().and_then(|b| b.push(article));
                        if let Some(batch) = full {
                            self.write(batch)?;
                        }
                    }
                    Ok(None) => {
                        self.stats.inc_discarded();
                        debug!(page_id = id, "No text left after cleaning");
                    }
                    Err(e) => self.failed(id, &e),
                }
            }
            PoolEvent::Panicked { item, message } => {
                self.tick();
                self.failed(item.id, &CleanError::Panicked(message));
            }
            PoolEvent::SourceExhausted => self.advance(PipelineState::Draining),
        }
        Ok(())
    }

    fn failed(&self, page_id: u64, error: &CleanError) {
        self.stats.inc_failures();
        debug!(page_id, error = %error, "Cleaning failed, page discarded");
    }

    fn tick(&mut self) {
        self.results += 1;
        if self.results % PROGRESS_INTERVAL == 0 {
            self.progress.set_position(self.results);
        }
    }

    /// Writes the last partial batch. Runs once every result has been consumed.
    fn flush(&mut self) -> Result<()> {
        self.advance(PipelineState::Flushing);
        if let Some(batch) = self.batcher.take().and_then(Batcher::finish) {
            self.write(batch)?;
        }
        self.advance(PipelineState::Done);
        Ok(())
    }

    fn write(&mut self, batch: Batch) -> Result<()> {
        match self.writer.write(&batch) {
            Ok(receipt) => {
                self.stats.add_batch(receipt.articles as u64, receipt.bytes);
                info!(
                    batch = receipt.number,
                    articles = receipt.articles,
                    bytes = receipt.bytes,
                    path = %receipt.path.display(),
                    "Batch written"
                );
                self.progress.set_message(format!(
                    "| {} batches, {} articles",
                    self.stats.batches(),
                    self.stats.articles_written()
                ));
                self.receipts.push(receipt);
                Ok(())
            }
            Err(e) => {
                self.write_failed = true;
                let pending = self.batcher.as_ref().map_or(0, Batcher::pending);
                error!(
                    batch = batch.number,
                    lost_articles = batch.len() + pending,
                    error = %e,
                    "Batch write failed, aborting"
                );
                Err(e).with_context(|| format!("Failed to write batch {}", batch.number))
            }
        }
    }

    fn finish(self) -> Vec<BatchReceipt> {
        self.progress.finish_and_clear();
        if self.state != PipelineState::Done {
            warn!(state = ?self.state, "Extraction stopped early");
        }
        self.receipts
    }
}
