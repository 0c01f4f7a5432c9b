//! Worker Load Table and the Worker Selector.
//!
//! The selector is the only writer that increments a counter; a
//! [`WorkLoadGuard`] is the only writer that decrements one, released on any
//! exit from a stream (completion, error, or cancellation) via `Drop`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-worker in-flight-stream counters.
pub struct WorkerLoadTable {
    loads: Vec<AtomicUsize>,
}

impl WorkerLoadTable {
    pub fn new(worker_count: usize) -> Self {
        assert!(worker_count > 0, "need at least one worker");
        Self {
            loads: (0..worker_count).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.loads.len()
    }

    pub fn load(&self, worker_index: usize) -> usize {
        self.loads[worker_index].load(Ordering::Relaxed)
    }

    /// Picks the worker with the minimum current load, ties broken by
    /// lowest index, and increments its counter.
    pub fn select_worker(&self) -> usize {
        let mut best = 0;
        let mut best_load = self.loads[0].load(Ordering::Relaxed);

        for (index, counter) in self.loads.iter().enumerate().skip(1) {
            let load = counter.load(Ordering::Relaxed);
            if load < best_load {
                best = index;
                best_load = load;
            }
        }

        self.loads[best].fetch_add(1, Ordering::Relaxed);
        best
    }

    fn release(&self, worker_index: usize) {
        self.loads[worker_index].fetch_sub(1, Ordering::Relaxed);
    }
}

/// Releases its worker's load counter when dropped, regardless of whether
/// the stream it guards completed, errored, or was cancelled.
pub struct WorkLoadGuard {
    table: Arc<WorkerLoadTable>,
    worker_index: usize,
}

impl WorkLoadGuard {
    pub fn new(table: Arc<WorkerLoadTable>, worker_index: usize) -> Self {
        Self {
            table,
            worker_index,
        }
    }

    pub fn worker_index(&self) -> usize {
        self.worker_index
    }
}

impl Drop for WorkLoadGuard {
    fn drop(&mut self) {
        self.table.release(self.worker_index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_minimum_load_breaking_ties_by_lowest_index() {
        let table = WorkerLoadTable::new(3);
        assert_eq!(table.select_worker(), 0);
        assert_eq!(table.select_worker(), 1);
        assert_eq!(table.select_worker(), 2);
        // All loaded to 1; lowest index wins again.
        assert_eq!(table.select_worker(), 0);
    }

    #[test]
    fn guard_drop_releases_load_conserving_the_total() {
        let table = Arc::new(WorkerLoadTable::new(2));
        let before: usize = (0..table.len()).map(|i| table.load(i)).sum();

        let worker = table.select_worker();
        {
            let _guard = WorkLoadGuard::new(table.clone(), worker);
            assert_eq!(table.load(worker), 1);
        }

        let after: usize = (0..table.len()).map(|i| table.load(i)).sum();
        assert_eq!(before, after);
    }

    #[test]
    fn guard_releases_even_when_scope_exits_via_error() {
        let table = Arc::new(WorkerLoadTable::new(1));
        let worker = table.select_worker();

        let result: Result<(), &'static str> = (|| {
            let _guard = WorkLoadGuard::new(table.clone(), worker);
            Err("simulated failure")
        })();
        assert!(result.is_err());

        assert_eq!(table.load(worker), 0);
    }
}
