//! One-shot, type-erased tasks and their completion channels.
//!
//! A [`Task`] owns a callable plus the producer half of a one-shot
//! completion channel; the paired [`TaskHandle`] owns the consumer half.
//! The callable's arguments are bound at construction time as closure
//! captures, so a queued task is invoked without arguments, from any worker
//! thread, exactly once.
//!
//! # Correctness Invariants
//!
//! - **One-shot**: `invoke` and `fail` consume the task; a channel is never
//!   written twice.
//! - **Always resolved**: every handle eventually observes an outcome. The
//!   producer half resolves the channel with `Abandoned` on drop if the
//!   task never ran.
//! - **Panic isolation**: panics inside the callable are caught and routed
//!   to the handle; they never unwind into the worker loop.
//! - **Publication**: the completion write happens-before the corresponding
//!   join return, via the channel mutex.

use crate::error::JoinError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};

// ============================================================================
// Completion channel
// ============================================================================

/// Single-producer / single-consumer one-shot cell.
///
/// Mutex + Condvar rather than atomics: completion is a once-per-task event,
/// and the condvar gives blocking joins without a spin loop.
struct Channel<T> {
    slot: Mutex<Option<Result<T, JoinError>>>,
    cv: Condvar,
}

impl<T> Channel<T> {
    fn complete(&self, outcome: Result<T, JoinError>) {
        let mut slot = self.slot.lock().expect("completion channel poisoned");
        assert!(slot.is_none(), "completion channel resolved twice");
        *slot = Some(outcome);
        // Drop the lock before notifying so the joiner does not wake into a
        // held mutex.
        drop(slot);
        self.cv.notify_all();
    }
}

/// Producer half of the channel. Exactly one per task.
///
/// Dropping an unresolved promise resolves the channel with `Abandoned`;
/// that is what turns "the pool died with my task still queued" into an
/// observable outcome instead of a joiner that hangs forever.
struct Promise<T> {
    channel: Arc<Channel<T>>,
    resolved: bool,
}

impl<T> Promise<T> {
    fn resolve(mut self, outcome: Result<T, JoinError>) {
        self.resolved = true;
        self.channel.complete(outcome);
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.resolved {
            self.channel.complete(Err(JoinError::Abandoned));
        }
    }
}

/// Consumer half of a task's completion channel.
///
/// A handle is independent of its task's lifetime: it may outlive the task
/// and the pool that ran it. Joining consumes the handle, so "at most one
/// join" is enforced by the type system rather than at runtime.
pub struct TaskHandle<T> {
    channel: Arc<Channel<T>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the paired task resolves, then returns its value or the
    /// captured failure.
    pub fn join(self) -> Result<T, JoinError> {
        let mut slot = self.channel.slot.lock().expect("completion channel poisoned");
        while slot.is_none() {
            slot = self
                .channel
                .cv
                .wait(slot)
                .expect("completion channel poisoned");
        }
        slot.take().expect("resolved channel lost its outcome")
    }

    /// Non-blocking readiness probe.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.channel
            .slot
            .lock()
            .expect("completion channel poisoned")
            .is_some()
    }
}

// ============================================================================
// Type-erased task
// ============================================================================

/// Object-safe seam between the pool and a monomorphized callable.
///
/// Owned-`self` methods make the one-shot contract structural: a runner is
/// executed or discarded, never both, never twice.
trait RunOnce: Send {
    /// Execute the callable and resolve the channel with its outcome.
    fn run(self: Box<Self>);

    /// Resolve the channel with `err` without executing the callable.
    fn discard(self: Box<Self>, err: JoinError);
}

struct Runner<F, T> {
    f: F,
    promise: Promise<T>,
}

impl<F, T> RunOnce for Runner<F, T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    fn run(self: Box<Self>) {
        let Runner { f, promise } = *self;
        let outcome = panic::catch_unwind(AssertUnwindSafe(f)).map_err(JoinError::Panicked);
        promise.resolve(outcome);
    }

    fn discard(self: Box<Self>, err: JoinError) {
        let Runner { f, promise } = *self;
        drop(f);
        promise.resolve(Err(err));
    }
}

/// A deferred invocation: captured callable, captured arguments, and the
/// producer half of its completion channel.
///
/// Tasks are moved, never copied. Ownership flows submitter -> queue ->
/// worker; the worker consumes the task by invoking it. Because `invoke`
/// takes `self` by value, the "invoke a moved-from task" error of similar
/// designs is unrepresentable here.
pub struct Task {
    runner: Box<dyn RunOnce>,
}

impl Task {
    /// Runs the callable, capturing its value or panic into the paired
    /// handle. Safe to call from any thread.
    pub(crate) fn invoke(self) {
        self.runner.run();
    }

    /// Resolves the paired handle with `err` without running the callable.
    pub(crate) fn fail(self, err: JoinError) {
        self.runner.discard(err);
    }
}

/// Creates a task and its paired handle.
///
/// `f` carries the callable and its arguments; whichever worker pops the
/// task invokes `f` exactly once and the outcome lands in the handle.
/// The task and handle are independent after creation: dropping the handle
/// discards the result without cancelling the task, and dropping the task
/// unexecuted resolves the handle with [`JoinError::Abandoned`].
pub fn create<F, T>(f: F) -> (Task, TaskHandle<T>)
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let channel = Arc::new(Channel {
        slot: Mutex::new(None),
        cv: Condvar::new(),
    });
    let promise = Promise {
        channel: Arc::clone(&channel),
        resolved: false,
    };
    let task = Task {
        runner: Box::new(Runner { f, promise }),
    };
    (task, TaskHandle { channel })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn invoke_delivers_value() {
        let (task, handle) = create(|| 40 + 2);
        assert!(!handle.is_finished());
        task.invoke();
        assert!(handle.is_finished());
        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn invoke_delivers_unit() {
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        let (task, handle) = create(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        task.invoke();
        handle.join().unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panic_is_captured_not_propagated() {
        let (task, handle) = create(|| -> u32 { panic!("boom") });
        // Invoking on this thread must not unwind.
        task.invoke();
        let err = handle.join().unwrap_err();
        assert_eq!(err.panic_message(), Some("boom"));
    }

    #[test]
    fn dropped_task_resolves_abandoned() {
        let (task, handle) = create(|| 1);
        drop(task);
        assert!(handle.is_finished());
        assert!(matches!(handle.join(), Err(JoinError::Abandoned)));
    }

    #[test]
    fn failed_task_reports_given_error() {
        let ran = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ran);
        let (task, handle) = create(move || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        task.fail(JoinError::ShutDown);
        assert!(matches!(handle.join(), Err(JoinError::ShutDown)));
        // The callable must not have run.
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn join_blocks_until_invoked() {
        let (task, handle) = create(|| 7u64);

        let joiner = thread::spawn(move || handle.join().unwrap());

        // Give the joiner time to start and block.
        thread::sleep(Duration::from_millis(50));
        assert!(!joiner.is_finished());

        task.invoke();
        assert_eq!(joiner.join().unwrap(), 7);
    }

    #[test]
    fn captured_state_flows_through() {
        let base = String::from("answer");
        let (task, handle) = create(move || format!("{base}: {}", 6 * 7));
        task.invoke();
        assert_eq!(handle.join().unwrap(), "answer: 42");
    }
}
