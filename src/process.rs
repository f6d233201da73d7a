//! Process-based worker pool.
//!
//! Used where each slice of work must run in its own address space. Files
//! are split into contiguous slices by count, one OS process handles each
//! slice and writes its own independent outputs, and the parent waits for
//! every child before reporting. A single worker runs in-process.

use std::ops::Range;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus};

use log::{debug, error, info};

use crate::{parallel::resolve_threads, Result, S5Error};

/// Splits `n` items into at most `workers` contiguous ranges of
/// `ceil(n / workers)` items. Empty trailing ranges are dropped.
///
/// ```rust
/// use s5tools::partition;
///
/// assert_eq!(partition(10, 4), vec![0..3, 3..6, 6..9, 9..10]);
/// assert_eq!(partition(4, 3), vec![0..2, 2..4]);
/// assert_eq!(partition(2, 8), vec![0..1, 1..2]);
/// assert!(partition(0, 4).is_empty());
/// ```
pub fn partition(n: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.clamp(1, n.max(1));
    let step = n.div_ceil(workers).max(1);
    (0..workers)
        .map(|i| (i * step).min(n)..((i + 1) * step).min(n))
        .filter(|r| !r.is_empty())
        .collect()
}

/// Work handed to one process of a [`run_processes`] call.
pub trait ProcessTask: Sync {
    /// Builds the command that processes `files` as worker `worker`.
    fn command(&self, worker: usize, files: &[PathBuf]) -> Result<Command>;

    /// Processes `files` in the calling process.
    fn run_inline(&self, worker: usize, files: &[PathBuf]) -> Result<()>;
}

fn check_status(pid: u32, status: ExitStatus) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    if let Some(code) = status.code() {
        return Err(S5Error::ChildFailed { pid, code });
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(S5Error::ChildSignaled { pid, signal });
        }
    }
    Err(S5Error::ChildFailed { pid, code: -1 })
}

/// Runs `task` over `files` on up to `workers` processes (`0` for one per core).
///
/// Every spawned child is waited for. The first spawn failure, non-zero exit
/// or signal is returned afterwards; there is no partial success.
pub fn run_processes<T: ProcessTask>(files: &[PathBuf], workers: usize, task: &T) -> Result<()> {
    if files.is_empty() {
        return Err(S5Error::NoInputFiles);
    }
    let ranges = partition(files.len(), resolve_threads(workers));
    if ranges.len() == 1 {
        debug!("Running {} files in-process", files.len());
        return task.run_inline(0, files);
    }
    info!("Spawning {} processes for {} files", ranges.len(), files.len());

    let mut children: Vec<(usize, Child)> = Vec::with_capacity(ranges.len());
    let mut first_error = None;
    for (worker, range) in ranges.into_iter().enumerate() {
        let spawned = task
            .command(worker, &files[range])
            .and_then(|mut cmd| cmd.spawn().map_err(S5Error::from));
        match spawned {
            Ok(child) => {
                debug!("Worker {worker} started as pid {}", child.id());
                children.push((worker, child));
            }
            Err(e) => {
                error!("Could not start worker {worker}: {e}");
                first_error = Some(e);
                break;
            }
        }
    }

    for (worker, mut child) in children {
        let pid = child.id();
        let outcome = child
            .wait()
            .map_err(S5Error::from)
            .and_then(|status| check_status(pid, status));
        if let Err(e) = outcome {
            error!("Worker {worker}: {e}");
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
