//! Fixed-size worker pool between the page source and the batch writer.
//!
//! A feeder task owns the source and pushes chunks onto a bounded work queue;
//! workers pull chunks, run the job on each item and push one event per item
//! onto a bounded results queue, which the calling thread drains. Both queues
//! being bounded is what throttles the source when the consumer falls behind.

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// What the consumer sees, in completion order.
#[derive(Debug)]
pub enum PoolEvent<T, R> {
    /// The job returned for one item.
    Completed(R),
    /// The job panicked on `item`; the pool keeps going.
    Panicked { item: T, message: String },
    /// The source has nothing more to queue. Sent exactly once, even when the
    /// source stopped on an error; results for queued items may still follow.
    SourceExhausted,
}

pub struct WorkerPool {
    pool: ThreadPool,
    num_workers: usize,
    chunk_size: usize,
    queue_depth: usize,
}

impl WorkerPool {
    /// `queue_depth` bounds the work queue in chunks; the results queue holds
    /// `queue_depth * chunk_size` events.
    pub fn new(num_workers: usize, chunk_size: usize, queue_depth: usize) -> Result<Self> {
        let num_workers = num_workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_workers + 1)
            .thread_name(|i| format!("wikiclean-worker-{}", i))
            .build()
            .context("Failed to build worker thread pool")?;

        Ok(Self {
            pool,
            num_workers,
            chunk_size: chunk_size.max(1),
            queue_depth: queue_depth.max(1),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Runs `job` over every item of `source`, handing each event to `sink` on
    /// the calling thread.
    ///
    /// Returns once every task has been joined. If `sink` fails, queued work is
    /// abandoned and that error is returned. Otherwise a source error is
    /// returned after every item queued before it has been delivered.
    pub fn run<T, R, I, F, S>(&self, source: I, job: F, mut sink: S) -> Result<()>
    where
        T: Send,
        R: Send,
        I: Iterator<Item = Result<T>> + Send,
        F: Fn(&T) -> R + Sync,
        S: FnMut(PoolEvent<T, R>) -> Result<()>,
    {
        let (work_tx, work_rx) = bounded::<Vec<T>>(self.queue_depth);
        let (event_tx, event_rx) = bounded::<PoolEvent<T, R>>(self.queue_depth * self.chunk_size);
        let mut source_error: Option<anyhow::Error> = None;
        let chunk_size = self.chunk_size;
        let job = &job;

        let sink_result = self.pool.in_place_scope(|scope| {
            for worker in 0..self.num_workers {
                let work_rx = work_rx.clone();
                let event_tx = event_tx.clone();
                scope.spawn(move |_| work_loop(worker, work_rx, event_tx, job));
            }
            drop(work_rx);

            let feeder_events = event_tx;
            let source_error = &mut source_error;
            scope.spawn(move |_| {
                *source_error = feed(source, chunk_size, work_tx);
                // Disconnected means the consumer already gave up.
                let _ = feeder_events.send(PoolEvent::SourceExhausted);
            });

            let result = event_rx.iter().try_for_each(&mut sink);
            // Unblocks any task still waiting to send.
            drop(event_rx);
            result
        });

        sink_result?;
        match source_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Chunks the source onto the work queue. Stops at the first source error or
/// when every worker has gone away.
fn feed<T, I>(source: I, chunk_size: usize, work_tx: Sender<Vec<T>>) -> Option<anyhow::Error>
where
    I: Iterator<Item = Result<T>>,
{
    let mut chunk = Vec::with_capacity(chunk_size);
    let mut queued: u64 = 0;

    for item in source {
        match item {
            Ok(item) => chunk.push(item),
            Err(e) => {
                flush_chunk(&work_tx, &mut chunk, &mut queued);
                warn!(error = %e, queued, "Source failed, draining queued work");
                return Some(e);
            }
        }
        if chunk.len() >= chunk_size && !flush_chunk(&work_tx, &mut chunk, &mut queued) {
            debug!(queued, "Workers gone, feeder stopping");
            return None;
        }
    }

    flush_chunk(&work_tx, &mut chunk, &mut queued);
    debug!(queued, "Source exhausted");
    None
}

/// Sends the pending chunk, if any. False once nobody is receiving.
fn flush_chunk<T>(work_tx: &Sender<Vec<T>>, chunk: &mut Vec<T>, queued: &mut u64) -> bool {
    if chunk.is_empty() {
        return true;
    }
    let capacity = chunk.capacity();
    let full = std::mem::replace(chunk, Vec::with_capacity(capacity));
    let len = full.len() as u64;
    if work_tx.send(full).is_err() {
        return false;
    }
    *queued += len;
    true
}

fn work_loop<T, R, F>(
    worker: usize,
    work_rx: Receiver<Vec<T>>,
    event_tx: Sender<PoolEvent<T, R>>,
    job: &F,
) where
    F: Fn(&T) -> R,
{
    let mut handled: u64 = 0;

    for chunk in work_rx.iter() {
        for item in chunk {
            let event = match catch_unwind(AssertUnwindSafe(|| job(&item))) {
                Ok(result) => PoolEvent::Completed(result),
                Err(payload) => PoolEvent::Panicked {
                    item,
                    message: panic_message(payload.as_ref()),
                },
            };
            if event_tx.send(event).is_err() {
                debug!(worker, handled, "Consumer gone, worker stopping");
                return;
            }
            handled += 1;
        }
    }

    debug!(worker, handled, "Worker finished");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
