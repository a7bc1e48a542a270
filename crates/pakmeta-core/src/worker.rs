//! A single enrichment worker: one thread draining one FIFO queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::JoinHandle;

use tracing::{debug, trace, warn};

use crate::error::PoolError;
use crate::fetch::{EnrichOutcome, Fetcher};
use crate::record::PackageHandle;

/// Thread-side state of a worker.
struct EnrichmentWorker {
    worker_id: usize,
    queue_rx: flume::Receiver<PackageHandle>,
    load: Arc<AtomicUsize>,
    fetcher: Arc<Fetcher>,
}

impl EnrichmentWorker {
    /// Main loop of a worker thread.
    ///
    /// Blocks while the queue is empty. Once the handle side has been stopped
    /// the remaining queued records are still processed, then the loop exits.
    fn run(self) {
        debug!(worker_id = self.worker_id, "enrichment worker started");

        while let Ok(record) = self.queue_rx.recv() {
            trace!(worker_id = self.worker_id, package_id = record.id(), "enriching");

            let outcome = self.fetcher.enrich(&record);
            if let EnrichOutcome::Abandoned { attempts } = outcome {
                debug!(
                    worker_id = self.worker_id,
                    package_id = record.id(),
                    attempts,
                    "record left without catalog data"
                );
            }

            // The slot is freed whatever the outcome; the record is never requeued here.
            record.clear_queued();
            self.load.fetch_sub(1, Ordering::AcqRel);
        }

        debug!(worker_id = self.worker_id, "enrichment worker drained, exiting");
    }
}

/// Pool-side handle to a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    worker_id: usize,
    queue_tx: Option<flume::Sender<PackageHandle>>,
    load: Arc<AtomicUsize>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawn a worker thread named `enrich-worker-{worker_id}`.
    pub fn spawn(worker_id: usize, fetcher: Arc<Fetcher>) -> Result<Self, PoolError> {
        let (queue_tx, queue_rx) = flume::unbounded();
        let load = Arc::new(AtomicUsize::new(0));

        let worker = EnrichmentWorker {
            worker_id,
            queue_rx,
            load: Arc::clone(&load),
            fetcher,
        };

        let thread = std::thread::Builder::new()
            .name(format!("enrich-worker-{worker_id}"))
            .spawn(move || worker.run())
            .map_err(|source| PoolError::SpawnWorker { source })?;

        Ok(Self {
            worker_id,
            queue_tx: Some(queue_tx),
            load,
            thread: Some(thread),
        })
    }

    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Records queued or in flight on this worker.
    ///
    /// Not synchronised with concurrent `submit` calls; placement only needs an
    /// approximate reading.
    pub fn current_load(&self) -> usize {
        self.load.load(Ordering::Acquire)
    }

    pub fn is_stopped(&self) -> bool {
        self.queue_tx.is_none()
    }

    /// Append a record to this worker's queue.
    pub fn submit(&self, record: PackageHandle) -> Result<(), PoolError> {
        let Some(tx) = &self.queue_tx else {
            return Err(PoolError::WorkerStopped {
                worker_id: self.worker_id,
            });
        };

        self.load.fetch_add(1, Ordering::AcqRel);
        if tx.send(record).is_err() {
            self.load.fetch_sub(1, Ordering::AcqRel);
            return Err(PoolError::WorkerStopped {
                worker_id: self.worker_id,
            });
        }
        Ok(())
    }

    /// Ask the worker to exit once its queue is empty. Does not block.
    pub fn request_stop(&mut self) {
        // Dropping the only sender lets `recv` drain what is left, then fail.
        self.queue_tx.take();
    }

    /// Stop the worker and wait for it to drain.
    pub fn join(mut self) {
        self.request_stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(worker_id = self.worker_id, "enrichment worker panicked");
            }
        }
    }
}
