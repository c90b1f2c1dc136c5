//! Shared worker pool for offloadable pure ring operations
//!
//! The core is single-owner per ciphertext — mutation only ever happens
//! through the owning scheme instance — but individual ring-level operations
//! (NTT butterfly layers, per-coefficient arithmetic, digit decompositions)
//! may fan out across a small thread pool. This module is the one place that
//! capability lives; it has no notion of ciphertexts, keys, or schemes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use crate::error::{HecError, HecResult};

/// Cooperative cancellation signal shared across the caller side of a
/// long-running, pool-backed batch (spec §5: suspension points are I/O and
/// pool-wide batches, not a full async/await surface, so cancellation is a
/// flag checked between batches rather than a future that can be dropped).
///
/// Cloning a token shares the same underlying flag; cancelling any clone
/// cancels all of them.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A fresh, not-yet-cancelled token.
    pub fn new() -> Self {
        CancellationToken { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Signal cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether [`CancellationToken::cancel`] has been called on this token
    /// or any of its clones.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Convenience check for a loop body: `token.check()?;` between batches.
    pub fn check(&self) -> HecResult<()> {
        if self.is_cancelled() {
            Err(HecError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A small fixed-size pool of worker threads dispatching boxed closures.
///
/// Sized to the logical CPU count by default (spec §5: "worker pool (sized
/// to logical CPU count by default)").
pub struct WorkerPool {
    senders: Vec<mpsc::Sender<Job>>,
}

type Job = Box<dyn FnOnce() + Send + 'static>;

impl WorkerPool {
    /// Build a pool with `size` worker threads.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        let mut senders = Vec::with_capacity(size);
        for _ in 0..size {
            let (tx, rx) = mpsc::channel::<Job>();
            thread::spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
            });
            senders.push(tx);
        }
        WorkerPool { senders }
    }

    /// Build a pool sized to the number of logical CPUs available, falling
    /// back to 1 if that cannot be determined.
    pub fn default_sized() -> Self {
        let n = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::new(n)
    }

    /// Run `items` through `f`, fanning out across the pool and collecting
    /// results in the original order. Blocks until every item has been
    /// processed. This is the "chunked parallel transform" contract NTT
    /// requires: the output must be bit-exact with the serial form, so `f`
    /// must be a pure function of its input.
    pub fn map<T, U, F>(&self, items: Vec<T>, f: F) -> Vec<U>
    where
        T: Send + 'static,
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = std::sync::Arc::new(f);
        let (result_tx, result_rx) = mpsc::channel::<(usize, U)>();
        let n = items.len();
        for (idx, item) in items.into_iter().enumerate() {
            let f = f.clone();
            let tx = result_tx.clone();
            let worker = idx % self.senders.len();
            let _ = self.senders[worker].send(Box::new(move || {
                let out = f(item);
                let _ = tx.send((idx, out));
            }));
        }
        drop(result_tx);
        let mut slots: Vec<Option<U>> = (0..n).map(|_| None).collect();
        for _ in 0..n {
            if let Ok((idx, out)) = result_rx.recv() {
                slots[idx] = Some(out);
            }
        }
        slots.into_iter().map(|s| s.expect("every index produced a result")).collect()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::default_sized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_preserves_order() {
        let pool = WorkerPool::new(4);
        let items: Vec<u64> = (0..100).collect();
        let out = pool.map(items.clone(), |x| x * x);
        let expected: Vec<u64> = items.iter().map(|x| x * x).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn cancellation_token_is_shared_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(HecError::Cancelled)));
    }
}
