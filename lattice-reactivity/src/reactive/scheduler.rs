//! Job Scheduler
//!
//! The scheduler defers work to the end of the current turn. Any number of
//! `queue_job` calls for the same job before a flush coalesce into a single
//! execution.
//!
//! # Flushing
//!
//! The host decides where a turn ends: it either calls [`flush_jobs`]
//! directly or awaits [`next_tick`], which yields to the tokio executor once
//! and then flushes.
//!
//! A flush takes the whole pending set up front. Jobs queued while the flush
//! is running wait for the next flush, so a job that re-queues itself cannot
//! spin forever inside one flush.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

/// Unique identifier for a job. Pending jobs are deduplicated by ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(u64);

impl JobId {
    /// Generate a new unique job ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

/// A deferred callable with a stable identity.
///
/// Clones share the ID, so queueing any clone dedups against the others.
#[derive(Clone)]
pub struct Job {
    id: JobId,
    run: Rc<dyn Fn()>,
}

impl Job {
    /// Wrap `run` in a job with a fresh ID.
    pub fn new(run: impl Fn() + 'static) -> Self {
        Self {
            id: JobId::new(),
            run: Rc::new(run),
        }
    }

    /// The job's ID.
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Execute the job now, outside of any flush.
    pub fn run(&self) {
        (self.run)();
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish()
    }
}

thread_local! {
    static QUEUE: RefCell<IndexMap<JobId, Job>> = RefCell::new(IndexMap::new());
    static FLUSHING: Cell<bool> = const { Cell::new(false) };
}

/// Enqueue `job` for the next flush.
///
/// Returns `false` if the job was already pending.
pub fn queue_job(job: &Job) -> bool {
    QUEUE.with(|queue| {
        let mut queue = queue.borrow_mut();
        if queue.contains_key(&job.id) {
            return false;
        }
        queue.insert(job.id, job.clone());
        true
    })
}

/// Whether any job is waiting for a flush.
pub fn has_pending_jobs() -> bool {
    QUEUE.with(|queue| !queue.borrow().is_empty())
}

/// Clears the flushing flag even if a job panics.
struct FlushGuard;

impl FlushGuard {
    fn acquire() -> Option<Self> {
        if FLUSHING.with(|flushing| flushing.replace(true)) {
            return None;
        }
        Some(FlushGuard)
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        FLUSHING.with(|flushing| flushing.set(false));
    }
}

/// Run every pending job once and return how many ran.
///
/// Calling this from inside a job is a no-op that returns 0.
pub fn flush_jobs() -> usize {
    let Some(_guard) = FlushGuard::acquire() else {
        return 0;
    };

    let jobs = QUEUE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
    let count = jobs.len();
    for job in jobs.into_values() {
        job.run();
    }

    if count > 0 {
        tracing::debug!(jobs = count, "flushed job queue");
    }
    count
}

/// Let the rest of the current turn run, then flush the job queue.
///
/// Returns the number of jobs that ran.
pub async fn next_tick() -> usize {
    tokio::task::yield_now().await;
    flush_jobs()
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_job() -> (Rc<Cell<usize>>, Job) {
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let job = Job::new(move || runs_clone.set(runs_clone.get() + 1));
        (runs, job)
    }

    #[test]
    fn same_job_coalesces() {
        let (runs, job) = counting_job();

        assert!(queue_job(&job));
        assert!(!queue_job(&job));
        assert!(!queue_job(&job.clone()));
        assert!(has_pending_jobs());

        assert_eq!(flush_jobs(), 1);
        assert_eq!(runs.get(), 1);
        assert!(!has_pending_jobs());
    }

    #[test]
    fn distinct_jobs_all_run() {
        let (a_runs, a) = counting_job();
        let (b_runs, b) = counting_job();

        queue_job(&a);
        queue_job(&b);

        assert_eq!(flush_jobs(), 2);
        assert_eq!(a_runs.get(), 1);
        assert_eq!(b_runs.get(), 1);
    }

    #[test]
    fn jobs_queued_during_flush_wait_for_the_next_one() {
        let runs = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<Job>>> = Rc::new(RefCell::new(None));

        let (runs_clone, slot_clone) = (runs.clone(), slot.clone());
        let job = Job::new(move || {
            runs_clone.set(runs_clone.get() + 1);
            if let Some(me) = slot_clone.borrow().as_ref() {
                queue_job(me);
            }
        });
        *slot.borrow_mut() = Some(job.clone());

        queue_job(&job);
        assert_eq!(flush_jobs(), 1);
        assert_eq!(runs.get(), 1);
        assert!(has_pending_jobs());

        // Break the self-reference so the next flush is the last one.
        slot.borrow_mut().take();
        assert_eq!(flush_jobs(), 1);
        assert_eq!(runs.get(), 2);
        assert!(!has_pending_jobs());
    }

    #[test]
    fn nested_flush_is_a_no_op() {
        let nested = Rc::new(Cell::new(usize::MAX));
        let nested_clone = nested.clone();
        let job = Job::new(move || nested_clone.set(flush_jobs()));

        queue_job(&job);
        flush_jobs();
        assert_eq!(nested.get(), 0);
    }

    #[test]
    fn empty_flush_runs_nothing() {
        assert_eq!(flush_jobs(), 0);
    }

    #[tokio::test]
    async fn next_tick_flushes_pending_jobs() {
        let (runs, job) = counting_job();
        queue_job(&job);
        queue_job(&job);

        assert_eq!(next_tick().await, 1);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn panicking_job_does_not_wedge_the_queue() {
        let failing = Job::new(|| panic!("job failed"));
        queue_job(&failing);
        assert!(std::panic::catch_unwind(flush_jobs).is_err());

        let (runs, job) = counting_job();
        queue_job(&job);
        assert_eq!(flush_jobs(), 1);
        assert_eq!(runs.get(), 1);
    }
}
