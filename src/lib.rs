//! wikiclean: Wikipedia dump to cleaned JSONL batches
//!
//! Streams a MediaWiki XML export (optionally bzip2-compressed), keeps main
//! namespace articles that are not redirects, strips their wikitext down to
//! plain prose and writes the result as numbered, zstd-compressed JSON Lines
//! files of a fixed number of articles each.
//!
//! # Architecture
//!
//! - **Streaming XML parsing** -- One page in memory at a time; multistream bz2
//!   dumps decoded on the fly
//! - **Parallel cleaning** -- A feeder task and N workers on a dedicated rayon
//!   pool, connected by bounded crossbeam channels so a slow writer throttles
//!   the reader
//! - **Single coordinator** -- The calling thread consumes results in completion
//!   order, numbers batches and writes them one at a time
//! - **Atomic writes** -- Each batch is written to a temp file and renamed into
//!   place
//! - **Lock-free counters** -- Statistics are shared `AtomicU64`s
//!
//! # Key Modules
//!
//! - [`parser`] -- Streaming XML reader with BZ2 decompression
//! - [`source`] -- Eligibility filtering over the page stream
//! - [`markup`] -- Wikitext tree, section exclusion and plain-text rendering
//! - [`cleaner`] -- Raw page to clean article
//! - [`pool`] -- Bounded-queue worker pool with per-item panic isolation
//! - [`batch`] -- Gap-free batch numbering
//! - [`writer`] -- Compressed JSONL batch files and reading them back
//! - [`extract`] -- The end-to-end run and its lifecycle
//! - [`models`] -- Core data types (WikiPage, RawPage, CleanArticle, Batch)
//! - [`stats`] -- Thread-safe atomic counters
//! - [`config`] -- Constants and the per-run configuration
//! - [`error`] -- Domain error types
//!
//! # Example Usage
//!
//! ```bash
//! wikiclean -v extract -i enwiki-latest-pages-articles.xml.bz2 -o batches/
//! wikiclean inspect batches/wikipedia_batch_0000.jsonl.zst --show 5
//! ```

pub mod batch;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod extract;
pub mod markup;
pub mod models;
pub mod parser;
pub mod pool;
pub mod source;
pub mod stats;
pub mod writer;
