//! Work-stealing batch scheduler.
//!
//! A batch of `N` items is split into one contiguous slice per worker. Each
//! worker claims indices from its own slice with an atomic cursor and, once
//! that slice is exhausted, steals single indices from the slices of other
//! workers that still have more than [`STEAL_THRESHOLD`] items left. Every
//! index is claimed by exactly one worker regardless of steal activity.
//!
//! The pool lives for a single call: threads are scoped to the batch and all
//! of them are joined before the call returns.
//!
//! # Examples
//!
//! ```rust
//! use s5tools::run_batch;
//!
//! # fn main() -> s5tools::Result<()> {
//! let items: Vec<u64> = (0..1000).collect();
//! let squares = run_batch(&items, 4, |x| Ok(x * x))?;
//! assert_eq!(squares[10], 100);
//! assert_eq!(squares.len(), 1000);
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use crate::{Result, S5Error};

/// Default number of records held in flight by one scheduler call.
pub const BATCH_SIZE: usize = 4096;

/// A slice is only stolen from while more than this many items remain.
pub const STEAL_THRESHOLD: usize = 1;

/// Resolves a user thread count, where zero means every available core.
pub fn resolve_threads(num_threads: usize) -> usize {
    if num_threads == 0 {
        num_cpus::get()
    } else {
        num_threads
    }
}

/// Per-item work run by a [`BatchScheduler`].
///
/// Implementors are shared by reference across all workers of a batch, so any
/// state they hold must be read-only or internally synchronized.
///
/// # Examples
///
/// ```rust
/// use s5tools::{BatchProcessor, BatchScheduler, Result};
///
/// struct Scale(i64);
///
/// impl BatchProcessor for Scale {
///     type Item = i64;
///     type Output = i64;
///
///     fn process(&self, item: &i64) -> Result<i64> {
///         Ok(item * self.0)
///     }
/// }
///
/// # fn main() -> Result<()> {
/// let items: Vec<i64> = (0..100).collect();
/// let scaled = BatchScheduler::new(3).run(&items, &Scale(-2))?;
/// assert_eq!(scaled[50], -100);
/// # Ok(())
/// # }
/// ```
pub trait BatchProcessor: Sync {
    type Item: Sync;
    type Output: Send;

    /// Processes one item.
    ///
    /// An error stops the whole batch.
    fn process(&self, item: &Self::Item) -> Result<Self::Output>;
}

/// Contiguous range of item indices owned by one worker
struct Slice {
    cursor: AtomicUsize,
    end: usize,
}
impl Slice {
    fn claim(&self) -> Option<usize> {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed);
        (idx < self.end).then_some(idx)
    }
    fn remaining(&self) -> usize {
        self.end.saturating_sub(self.cursor.load(Ordering::Relaxed))
    }
}

/// Fixed-size worker pool for one batch at a time.
#[derive(Clone, Copy, Debug)]
pub struct BatchScheduler {
    num_threads: usize,
}
impl BatchScheduler {
    /// Creates a scheduler; `0` uses every available core.
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: resolve_threads(num_threads).max(1),
        }
    }
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Runs a [`BatchProcessor`] over every item.
    pub fn run<P: BatchProcessor>(
        &self,
        items: &[P::Item],
        processor: &P,
    ) -> Result<Vec<P::Output>> {
        self.run_fn(items, |item| processor.process(item))
    }

    /// Runs `f` over every item and returns the results in item order.
    ///
    /// The first failing item stops all workers from claiming further items;
    /// its error is returned once every worker has been joined.
    pub fn run_fn<T, R, F>(&self, items: &[T], f: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync,
    {
        let n = items.len();
        let workers = self.num_threads.min(n);
        if workers <= 1 {
            return items.iter().map(&f).collect();
        }

        let step = n.div_ceil(workers);
        let slices: Vec<Slice> = (0..workers)
            .map(|tid| Slice {
                cursor: AtomicUsize::new((tid * step).min(n)),
                end: ((tid + 1) * step).min(n),
            })
            .collect();
        let stop = AtomicBool::new(false);

        let outcomes: Vec<thread::Result<Result<Vec<(usize, R)>>>> = thread::scope(|s| {
            let handles: Vec<_> = (0..workers)
                .map(|tid| {
                    let (f, slices, stop) = (&f, &slices, &stop);
                    s.spawn(move || -> Result<Vec<(usize, R)>> {
                        let mut done = Vec::with_capacity(step);
                        while !stop.load(Ordering::Relaxed) {
                            let claimed = slices[tid].claim().or_else(|| steal(slices, tid));
                            let Some(idx) = claimed else {
                                break;
                            };
                            match f(&items[idx]) {
                                Ok(result) => done.push((idx, result)),
                                Err(e) => {
                                    stop.store(true, Ordering::Relaxed);
                                    return Err(e);
                                }
                            }
                        }
                        Ok(done)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join()).collect()
        });

        let mut slots: Vec<Option<R>> = (0..n).map(|_| None).collect();
        let mut first_error = None;
        for (tid, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Err(_) => {
                    first_error.get_or_insert(S5Error::WorkerPanicked(tid));
                }
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Ok(Ok(done)) => {
                    for (idx, result) in done {
                        slots[idx] = Some(result);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        slots
            .into_iter()
            .collect::<Option<Vec<R>>>()
            .ok_or_else(|| S5Error::Process("batch item was never processed".into()))
    }
}

/// Claims one index from the first other slice that still has work to spare.
fn steal(slices: &[Slice], tid: usize) -> Option<usize> {
    slices
        .iter()
        .enumerate()
        .filter(|(victim, _)| *victim != tid)
        .filter(|(_, slice)| slice.remaining() > STEAL_THRESHOLD)
        .find_map(|(_, slice)| slice.claim())
}

/// Processes every item with `f` on `num_threads` workers.
///
/// Shorthand for [`BatchScheduler::new`] followed by [`BatchScheduler::run_fn`].
pub fn run_batch<T, R, F>(items: &[T], num_threads: usize, f: F) -> Result<Vec<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> Result<R> + Sync,
{
    BatchScheduler::new(num_threads).run_fn(items, f)
}
