//! Work-Stealing Task Pool
//!
//! # Architecture
//!
//! ```text
//!                  ┌────────────────────────────────────────────────┐
//!                  │                   TaskPool                     │
//!                  │                                                │
//!  Submitters ─────┼──► dispatch counter ──► try-push probe scan ───┤
//!  (any thread)    │                                                │
//!                  │   ┌──────────────┬──────────────┬───────────┐  │
//!                  │   │   Worker 0   │   Worker 1   │ Worker N  │  │
//!                  │   │ ┌──────────┐ │ ┌──────────┐ │ ┌───────┐ │  │
//!                  │   │ │ Queue 0  │◄┼─┤ Queue 1  │◄┼─┤Queue N│ │  │
//!                  │   │ │(mutex +  │ │ │          │ │ │       │ │  │
//!                  │   │ │ condvar) │ │ │          │ │ │       │ │  │
//!                  │   │ └────┬─────┘ │ └────┬─────┘ │ └───┬───┘ │  │
//!                  │   │      ▼       │      ▼       │     ▼     │  │
//!                  │   │  steal scan over all queues, own-queue  │  │
//!                  │   │  blocking pop, cooperative drain        │  │
//!                  │   └─────────────────────────────────────────┘  │
//!                  │                      ▲                         │
//!                  │    Shared: queued counter, accepting gate,     │
//!                  │            exited flags                        │
//!                  └────────────────────────────────────────────────┘
//! ```
//!
//! - One mutex-protected FIFO per worker; worker *i* parks only on queue *i*
//! - Submissions round-robin over queues using non-blocking pushes
//! - Workers scan all queues with non-blocking pops before parking
//! - After shutdown, workers cooperatively drain every queue before exiting
//!
//! # Correctness Invariants
//!
//! - **Work-conserving**: every accepted task executes; `done()` cannot
//!   strand queued work (drain phase). Acceptance itself is exact: a push
//!   succeeds only on a queue whose done latch is unset, decided under the
//!   queue lock, so submissions racing `done()` either run or are rejected
//!   through their handle, never lost.
//! - **Counter discipline**: `queued` is incremented *before* the push that
//!   publishes a task and decremented *after* a successful pop, so a task's
//!   presence on any queue implies `queued > 0` from every thread's view.
//!   The submit path increments speculatively and reverts on try-push
//!   failure to preserve this.
//! - **Panic isolation**: task panics are captured into the task's handle
//!   (see `task.rs`); worker threads never unwind.
//! - **Termination**: `done` happens-before every worker's exit; exit flags
//!   are set only once `queued` reads zero.
//!
//! # Performance Invariants
//!
//! - **Contention-free fast path**: submit and steal use only `try_lock`;
//!   a busy queue is skipped, not waited on.
//! - **Deterministic parking**: a worker that finds nothing blocks on its
//!   *own* queue, so wakeups need no "who sleeps where" bookkeeping.
//! - **Bounded probing**: `probe_factor * workers` attempts per scan bound
//!   wasted work under saturation. The factor is a tuning knob, not a
//!   correctness parameter.

use crate::error::JoinError;
use crate::queue::TaskQueue;
use crate::task::{self, Task, TaskHandle};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

// ============================================================================
// Configuration
// ============================================================================

/// Pool configuration.
///
/// | Knob           | Effect                                            |
/// |----------------|---------------------------------------------------|
/// | `workers`      | Thread and queue count                            |
/// | `probe_factor` | try-push / steal attempts per scan, times workers |
#[derive(Clone, Copy, Debug)]
pub struct PoolConfig {
    /// Number of worker threads (and queues). Must be at least 1.
    pub workers: usize,

    /// Probe budget multiplier for the submit scan and the steal scan.
    ///
    /// Higher values find an uncontended queue more often under load;
    /// lower values fail over to blocking behavior sooner.
    pub probe_factor: usize,
}

impl PoolConfig {
    /// Validate configuration. Panics on invalid values.
    pub fn validate(&self) {
        assert!(self.workers > 0, "workers must be > 0");
        assert!(self.probe_factor > 0, "probe_factor must be > 0");
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            probe_factor: 10,
        }
    }
}

// ============================================================================
// Shared state
// ============================================================================

/// State shared between the pool owner, its workers, and every `PoolHandle`.
///
/// # Invariants
///
/// - `queues.len() == exited.len() == workers`
/// - `queued` counts tasks accepted by a queue but not yet popped
/// - `accepting` is monotonic: once false, never true again (a `reset`
///   builds a fresh `Shared` instead of reopening this one)
struct Shared {
    /// Per-worker FIFOs. Worker *i* blocks only on `queues[i]` but steals
    /// from all of them.
    queues: Box<[TaskQueue]>,

    /// Outstanding-work counter: accepted but not yet popped.
    ///
    /// Queue lengths are not globally observable (each sits behind its own
    /// lock), so this atomic is what the drain phase and
    /// `wait_for_completion` terminate on. Relaxed ordering suffices: the
    /// counter only answers "does any work remain", never which task.
    queued: AtomicUsize,

    /// Submission gate. Closed by `done()`; closed-gate submissions resolve
    /// their handle with [`JoinError::ShutDown`].
    accepting: AtomicBool,

    /// Per-worker exit flags, written once by the owning worker at the end
    /// of its drain phase.
    exited: Box<[AtomicBool]>,

    /// Dispatch counter anchoring the round-robin probe scan. Only its
    /// value modulo the queue count matters.
    next_queue: AtomicUsize,

    probe_factor: usize,
}

impl Shared {
    fn new(config: &PoolConfig) -> Self {
        Self {
            queues: (0..config.workers).map(|_| TaskQueue::new()).collect(),
            queued: AtomicUsize::new(0),
            accepting: AtomicBool::new(true),
            exited: (0..config.workers).map(|_| AtomicBool::new(false)).collect(),
            next_queue: AtomicUsize::new(0),
            probe_factor: config.probe_factor,
        }
    }

    fn submit<F, T>(&self, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (task, handle) = task::create(f);
        self.submit_task(task);
        handle
    }

    fn submit_task(&self, mut task: Task) {
        // Fast-path rejection. The authoritative check is the per-queue done
        // latch below: a submitter that loads `accepting` just before
        // `done()` lands still cannot strand a task, because latched queues
        // refuse pushes under the same lock that gates worker exit.
        if !self.accepting.load(Ordering::Acquire) {
            task.fail(JoinError::ShutDown);
            return;
        }

        let n = self.queues.len();
        let idx = self.next_queue.fetch_add(1, Ordering::Relaxed);

        for k in 0..self.probe_factor * n {
            // Speculative increment: the counter must already be positive
            // when the push makes the task visible, otherwise a worker could
            // pop-and-decrement first and drive the count through zero while
            // work is still live.
            self.queued.fetch_add(1, Ordering::Relaxed);
            match self.queues[(idx + k) % n].try_push(task) {
                Ok(()) => return,
                Err(t) => {
                    self.queued.fetch_sub(1, Ordering::Relaxed);
                    task = t;
                }
            }
        }

        // Every probe lost its lock race (or found a latch); take the
        // blocking path on the anchor queue.
        self.queued.fetch_add(1, Ordering::Relaxed);
        if let Err(task) = self.queues[idx % n].push(task) {
            self.queued.fetch_sub(1, Ordering::Relaxed);
            task.fail(JoinError::ShutDown);
        }
    }

    fn done(&self) {
        self.accepting.store(false, Ordering::Release);
        for q in self.queues.iter() {
            q.set_done();
        }
    }
}

// ============================================================================
// Worker loop
// ============================================================================

/// Per-worker state machine.
///
/// ```text
///   Scanning ──try-pop hit──────────────► Executing ──┐
///      │                                      ▲       │
///      │ all probes miss                      │       │
///      ▼                                      │       │
///   Self-blocking pop on own queue ──task─────┘       │
///      │                                              │
///      │ empty and done-latched                       │
///      ▼                                              │
///   Draining: steal rounds until queued == 0 ◄────────┘
///      │                                    (loop back to Scanning)
///      ▼
///   set exited flag, return
/// ```
///
/// The scan starts at the worker's own index so an uncontended worker takes
/// its own work first and stealing stays the exception. Blocking on the own
/// queue gives each worker a deterministic parking spot. The drain phase is
/// mandatory: the latch releases blocked poppers while other queues may
/// still hold accepted tasks, and those must execute before exit.
fn worker_run(shared: &Shared, id: usize) {
    let n = shared.queues.len();
    let probes = shared.probe_factor * n;

    loop {
        let mut stolen = None;
        for k in 0..probes {
            if let Some(t) = shared.queues[(id + k) % n].try_pop() {
                stolen = Some(t);
                break;
            }
        }

        let task = match stolen {
            Some(t) => t,
            None => match shared.queues[id].pop() {
                Some(t) => t,
                // Own queue empty with the latch set: drain and exit.
                None => break,
            },
        };

        shared.queued.fetch_sub(1, Ordering::Relaxed);
        task.invoke();
    }

    // The latch released us while other queues may still hold accepted
    // tasks. Keep stealing until the global count reads zero so no task is
    // stranded and no handle hangs.
    while shared.queued.load(Ordering::Relaxed) != 0 {
        for k in 0..n {
            if let Some(t) = shared.queues[(id + k) % n].try_pop() {
                shared.queued.fetch_sub(1, Ordering::Relaxed);
                t.invoke();
            }
        }
        thread::yield_now();
    }

    shared.exited[id].store(true, Ordering::Release);
}

fn spawn_workers(shared: &Arc<Shared>, count: usize) -> Vec<thread::JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let shared = Arc::clone(shared);
            thread::Builder::new()
                .name(format!("pool-worker-{id}"))
                .spawn(move || worker_run(&shared, id))
                .expect("failed to spawn worker thread")
        })
        .collect()
}

// ============================================================================
// PoolHandle (the seam for submitters that do not own the pool)
// ============================================================================

/// Cheap, clonable submitter.
///
/// Tasks that spawn follow-on tasks capture one of these; so do producer
/// threads that outlive no particular borrow of the pool. `Clone + Send +
/// Sync`; any number of handles may submit concurrently.
///
/// A handle taken before [`TaskPool::reset`] stays bound to the generation
/// it was created from: after the reset its submissions are rejected with
/// [`JoinError::ShutDown`].
#[derive(Clone)]
pub struct PoolHandle {
    shared: Arc<Shared>,
}

impl PoolHandle {
    /// Submits a callable; see [`TaskPool::submit`].
    pub fn submit<F, T>(&self, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.shared.submit(f)
    }

    /// Submits a pre-built task; see [`TaskPool::submit_task`].
    pub fn submit_task(&self, task: Task) {
        self.shared.submit_task(task);
    }

    /// Returns `true` while the pool accepts new submissions.
    #[inline]
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
    }
}

// ============================================================================
// TaskPool
// ============================================================================

/// Fixed-width pool of worker threads executing one-shot tasks.
///
/// # Lifecycle
///
/// 1. Create with [`TaskPool::new`] / [`TaskPool::with_workers`] /
///    [`TaskPool::with_config`]; workers start immediately.
/// 2. Submit work from any thread, including worker threads.
/// 3. Call [`TaskPool::done`] to stop accepting work, then
///    [`TaskPool::wait_for_completion`] to rendezvous with the drain.
///
/// Dropping the pool performs `done` + join; because workers drain before
/// exiting, every accepted task still executes.
///
/// # Example
///
/// ```
/// use taskpool_rs::TaskPool;
///
/// let pool = TaskPool::with_workers(4);
/// let handle = pool.submit(|| 6 * 7);
/// pool.done();
/// pool.wait_for_completion();
/// assert_eq!(handle.join().unwrap(), 42);
/// ```
pub struct TaskPool {
    shared: Arc<Shared>,
    workers: Vec<thread::JoinHandle<()>>,
    config: PoolConfig,
}

impl TaskPool {
    /// Creates a pool sized to the machine's logical CPU count.
    pub fn new() -> Self {
        Self::with_config(PoolConfig::default())
    }

    /// Creates a pool with `workers` threads. Panics if `workers` is zero.
    pub fn with_workers(workers: usize) -> Self {
        Self::with_config(PoolConfig {
            workers,
            ..PoolConfig::default()
        })
    }

    /// Creates a pool from an explicit configuration.
    pub fn with_config(config: PoolConfig) -> Self {
        config.validate();
        let shared = Arc::new(Shared::new(&config));
        let workers = spawn_workers(&shared, config.workers);
        Self {
            shared,
            workers,
            config,
        }
    }

    /// Number of worker threads (and queues).
    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Submits a callable and returns the handle to its eventual outcome.
    ///
    /// The dispatch scan probes `probe_factor * workers` queues round-robin
    /// with non-blocking pushes, then falls back to one blocking push; only
    /// that terminal push can block. After [`done`](Self::done) the
    /// submission is rejected and the handle resolves immediately with
    /// [`JoinError::ShutDown`].
    pub fn submit<F, T>(&self, f: F) -> TaskHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.shared.submit(f)
    }

    /// Submits a task whose handle the caller already holds (see
    /// [`task::create`]). Same dispatch logic as [`submit`](Self::submit).
    pub fn submit_task(&self, task: Task) {
        self.shared.submit_task(task);
    }

    /// Returns a clonable submitter bound to this pool.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Snapshot of the outstanding-work counter: tasks accepted by a queue
    /// and not yet popped by a worker. Stale by the time it is read; useful
    /// for tests and diagnostics, not coordination.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.shared.queued.load(Ordering::Relaxed)
    }

    /// Returns `true` while the pool accepts new submissions.
    #[inline]
    pub fn is_accepting(&self) -> bool {
        self.shared.accepting.load(Ordering::Acquire)
    }

    /// Closes the submission gate and sets every queue's done latch.
    /// Idempotent; safe to call concurrently with submissions (racing
    /// submitters either make it in and are drained, or are rejected).
    pub fn done(&self) {
        self.shared.done();
    }

    /// Blocks until every accepted task has executed and every worker has
    /// finished draining.
    ///
    /// Must be preceded by [`done`](Self::done): workers only begin their
    /// exit protocol once the latch is set. Yield-spins rather than waiting
    /// on a condvar; worker exit is a once-per-pool event and the spin
    /// costs nothing extra in synchronization.
    pub fn wait_for_completion(&self) {
        loop {
            thread::yield_now();

            if self.shared.queued.load(Ordering::Relaxed) != 0 {
                continue;
            }
            if self
                .shared
                .exited
                .iter()
                .all(|flag| flag.load(Ordering::Acquire))
            {
                return;
            }
        }
    }

    /// Shuts the pool down and restarts it with fresh queues, a zeroed
    /// counter, and new workers.
    ///
    /// Requires `&mut self`: calling this while other threads still submit
    /// through the same pool reference is ruled out by the borrow, and
    /// submissions through an old [`PoolHandle`] are rejected with
    /// [`JoinError::ShutDown`] because handles stay bound to the previous
    /// generation.
    pub fn reset(&mut self) {
        self.shared.done();
        for worker in self.workers.drain(..) {
            worker.join().expect("worker thread panicked");
        }

        debug_assert_eq!(self.shared.queued.load(Ordering::Relaxed), 0);

        self.shared = Arc::new(Shared::new(&self.config));
        self.workers = spawn_workers(&self.shared, self.config.workers);
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shared.done();
        for worker in self.workers.drain(..) {
            // Task panics are captured inside invoke; a panicked worker
            // thread means a bug in the pool itself.
            worker.join().expect("worker thread panicked");
        }
    }
}
