//! Per-worker synchronized FIFO with a shutdown latch.
//!
//! Each pool worker owns one queue for blocking pops and may steal from any
//! other queue via `try_pop`. The try-variants acquire the mutex without
//! blocking, which keeps the submit fast path and the steal scan free of
//! lock contention: a queue whose lock is busy is simply skipped.
//!
//! # Correctness Invariants
//!
//! - FIFO order per queue; the backing deque is touched only under the mutex.
//! - The done latch is monotonic and lives inside the locked state, so
//!   `set_done` cannot slip between a popper's empty-check and its wait.
//! - A waiter blocked in `pop` is released by a push or by the latch.
//! - Pushes fail once the latch is set. Acceptance and worker exit are
//!   decided under the same lock, so an accepted task is always observed by
//!   a live worker and a rejected one is returned to the caller.
//!
//! Mutex poisoning is a fatal process error here. Task panics cannot poison
//! these locks because they are caught inside `Task::invoke`, outside any
//! queue critical section.

use crate::task::Task;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, TryLockError};

struct State {
    tasks: VecDeque<Task>,
    done: bool,
}

pub(crate) struct TaskQueue {
    state: Mutex<State>,
    cv: Condvar,
}

impl TaskQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                tasks: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
        }
    }

    /// Non-blocking pop. `None` when the lock is contended or the queue is
    /// empty; the caller is a steal scan and treats both the same way.
    pub(crate) fn try_pop(&self) -> Option<Task> {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return None,
            Err(TryLockError::Poisoned(e)) => panic!("task queue mutex poisoned: {e}"),
        };
        state.tasks.pop_front()
    }

    /// Non-blocking push. On lock contention or a latched queue the task is
    /// handed back to the caller, which retains ownership.
    ///
    /// Refusing latched queues under the same lock that gates worker exit is
    /// what makes post-shutdown rejection exact: a push that succeeds is
    /// ordered before the latch, so the owning worker has not begun its exit
    /// protocol and the task is guaranteed to execute.
    pub(crate) fn try_push(&self, task: Task) -> Result<(), Task> {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(task),
            Err(TryLockError::Poisoned(e)) => panic!("task queue mutex poisoned: {e}"),
        };
        if state.done {
            return Err(task);
        }
        state.tasks.push_back(task);
        drop(state);
        self.cv.notify_one();
        Ok(())
    }

    /// Blocking pop. Returns `None` only when the queue is empty and the
    /// done latch is set; that is the worker's signal to start draining.
    pub(crate) fn pop(&self) -> Option<Task> {
        let mut state = self.state.lock().expect("task queue mutex poisoned");
        while state.tasks.is_empty() && !state.done {
            state = self.cv.wait(state).expect("task queue mutex poisoned");
        }
        state.tasks.pop_front()
    }

    /// Blocking push: waits for the lock, never for space. Fails only when
    /// the done latch is already set.
    pub(crate) fn push(&self, task: Task) -> Result<(), Task> {
        let mut state = self.state.lock().expect("task queue mutex poisoned");
        if state.done {
            return Err(task);
        }
        state.tasks.push_back(task);
        drop(state);
        self.cv.notify_one();
        Ok(())
    }

    /// Sets the done latch and wakes every waiter. Idempotent.
    pub(crate) fn set_done(&self) {
        let mut state = self.state.lock().expect("task queue mutex poisoned");
        state.done = true;
        drop(state);
        self.cv.notify_all();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.state.lock().expect("task queue mutex poisoned").tasks.len()
    }
}
