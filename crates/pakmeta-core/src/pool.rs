//! Load-balancing of enrichment requests over a growing set of workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::error::PoolError;
use crate::fetch::Fetcher;
use crate::record::PackageHandle;
use crate::worker::WorkerHandle;

/// Places records on the first worker below `max_load_per_worker`, spawning a
/// new worker when none qualifies.
///
/// The roster only grows (up to `max_workers`) until [`Self::stop_all`].
/// Once every worker is saturated and the roster is full, `enqueue` fails with
/// [`PoolError::Saturated`] instead of spawning more threads.
#[derive(Debug)]
pub struct WorkerPool {
    fetcher: Arc<Fetcher>,
    max_load_per_worker: usize,
    max_workers: usize,
    workers: Mutex<Vec<WorkerHandle>>,
    /// Workers told to stop but not joined yet.
    retired: Mutex<Vec<WorkerHandle>>,
    next_worker_id: AtomicUsize,
}

impl WorkerPool {
    pub fn new(fetcher: Arc<Fetcher>, max_load_per_worker: usize, max_workers: usize) -> Self {
        Self {
            fetcher,
            max_load_per_worker,
            max_workers,
            workers: Mutex::new(Vec::new()),
            retired: Mutex::new(Vec::new()),
            next_worker_id: AtomicUsize::new(0),
        }
    }

    /// Hand `record` to a worker. Never waits on network I/O.
    ///
    /// Returns the id of the worker the record was placed on.
    pub fn enqueue(&self, record: PackageHandle) -> Result<usize, PoolError> {
        let mut workers = lock(&self.workers);

        if let Some(worker) = workers
            .iter()
            .find(|w| w.current_load() < self.max_load_per_worker)
        {
            worker.submit(record)?;
            return Ok(worker.worker_id());
        }

        if workers.len() >= self.max_workers {
            return Err(PoolError::Saturated {
                workers: workers.len(),
                max_load: self.max_load_per_worker,
            });
        }

        let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let worker = WorkerHandle::spawn(worker_id, Arc::clone(&self.fetcher))?;
        debug!(worker_id, roster = workers.len() + 1, "spawned enrichment worker");
        worker.submit(record)?;
        workers.push(worker);
        Ok(worker_id)
    }

    /// Number of workers on the roster.
    pub fn worker_count(&self) -> usize {
        lock(&self.workers).len()
    }

    /// Current load of each worker, in roster order.
    pub fn loads(&self) -> Vec<usize> {
        lock(&self.workers)
            .iter()
            .map(WorkerHandle::current_load)
            .collect()
    }

    /// Tell every worker to stop once drained and clear the roster.
    ///
    /// Does not wait; see [`Self::join_stopped`].
    pub fn stop_all(&self) {
        let mut workers = std::mem::take(&mut *lock(&self.workers));
        if workers.is_empty() {
            return;
        }
        info!(workers = workers.len(), "stopping enrichment workers");
        for worker in &mut workers {
            worker.request_stop();
        }
        lock(&self.retired).extend(workers);
    }

    /// Block until every worker stopped by [`Self::stop_all`] has drained its queue.
    pub fn join_stopped(&self) {
        let retired = std::mem::take(&mut *lock(&self.retired));
        for worker in retired {
            worker.join();
        }
    }

    /// `stop_all` followed by `join_stopped`.
    pub fn shutdown(&self) {
        self.stop_all();
        self.join_stopped();
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop_all();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::TransportError;
    use crate::fetch::CatalogDataCache;
    use crate::fetch::tests::{APP_BODY, ScriptedTransport};
    use crate::record::{PackageRecord, PackageStatus, RawPackage};
    use crate::transport::{CatalogEndpoints, CatalogTransport, TransportResponse};

    /// Blocks every GET until a permit is sent through the gate.
    struct GatedTransport {
        gate: flume::Receiver<()>,
    }

    impl CatalogTransport for GatedTransport {
        fn get(&self, url: &str, _timeout: Duration) -> Result<TransportResponse, TransportError> {
            match self.gate.recv() {
                Ok(()) => Ok(TransportResponse::new(200, APP_BODY)),
                Err(_) => Err(TransportError::Other {
                    url: url.to_owned(),
                    message: "gate closed".into(),
                }),
            }
        }
    }

    fn pool_with(
        transport: Arc<dyn CatalogTransport>,
        max_load: usize,
        max_workers: usize,
    ) -> WorkerPool {
        let fetcher = Fetcher::new(
            transport,
            CatalogEndpoints::new("https://catalog.test"),
            Arc::new(CatalogDataCache::new(-1)),
            1,
            Duration::from_secs(1),
        );
        WorkerPool::new(Arc::new(fetcher), max_load, max_workers)
    }

    fn record(id: &str) -> PackageHandle {
        PackageRecord::new_handle(RawPackage::new(id))
    }

    #[test]
    fn four_records_fill_first_worker_then_spawn_second() {
        let (gate_tx, gate_rx) = flume::unbounded();
        let pool = pool_with(Arc::new(GatedTransport { gate: gate_rx }), 3, 16);
        let records: Vec<_> = (0..4).map(|i| record(&format!("app.N{i}"))).collect();

        let placed: Vec<_> = records
            .iter()
            .map(|r| pool.enqueue(Arc::clone(r)).expect("enqueue"))
            .collect();

        assert_eq!(placed, vec![0, 0, 0, 1]);
        assert_eq!(pool.worker_count(), 2);
        assert_eq!(pool.loads(), vec![3, 1]);

        for _ in 0..records.len() {
            gate_tx.send(()).expect("gate open");
        }
        pool.shutdown();

        assert!(records.iter().all(|r| r.status() == PackageStatus::Ready));
    }

    #[test]
    fn saturated_pool_rejects() {
        let (gate_tx, gate_rx) = flume::unbounded();
        let pool = pool_with(Arc::new(GatedTransport { gate: gate_rx }), 1, 2);

        pool.enqueue(record("a.A")).expect("first worker");
        pool.enqueue(record("b.B")).expect("second worker");
        let err = pool.enqueue(record("c.C")).unwrap_err();
        assert!(matches!(err, PoolError::Saturated { workers: 2, max_load: 1 }));

        drop(gate_tx);
        pool.shutdown();
    }

    #[test]
    fn stop_all_clears_roster_and_new_work_spawns_fresh_workers() {
        let transport = Arc::new(ScriptedTransport::always(200, APP_BODY));
        let pool = pool_with(transport, 3, 16);

        let first = record("a.A");
        pool.enqueue(Arc::clone(&first)).expect("enqueue");
        pool.stop_all();
        assert_eq!(pool.worker_count(), 0);

        let second = record("b.B");
        assert_eq!(pool.enqueue(Arc::clone(&second)).expect("enqueue"), 1);
        pool.shutdown();

        assert_eq!(first.status(), PackageStatus::Ready);
        assert_eq!(second.status(), PackageStatus::Ready);
    }

    #[test]
    fn drained_worker_is_reused() {
        let transport = Arc::new(ScriptedTransport::always(200, APP_BODY));
        let pool = pool_with(transport, 1, 16);

        let first = record("a.A");
        pool.enqueue(Arc::clone(&first)).expect("enqueue");
        while pool.loads() != vec![0] {
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(pool.enqueue(record("b.B")).expect("enqueue"), 0);
        assert_eq!(pool.worker_count(), 1);
        pool.shutdown();
    }
}
