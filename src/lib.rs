//! Work-stealing task pool with result handles.
//!
//! A fixed set of worker threads executes one-shot tasks submitted from any
//! thread. Each worker owns a mutex-protected FIFO; submissions round-robin
//! over the queues with non-blocking pushes, and workers scan every queue
//! with non-blocking pops before parking on their own. The design follows
//! the "one queue per worker, steal on empty" scheme from Sean Parent's
//! "Better Code: Concurrency".
//!
//! # Module map
//! - [`task`]: type-erased one-shot tasks and their completion channels.
//! - [`pool`]: worker threads, dispatch, shutdown, and draining.
//! - [`error`]: the failure taxonomy surfaced through handles.
//! - [`search`]: the bundled file-search client (`fsearch` binary).
//!
//! # Quick start
//!
//! ```
//! use taskpool_rs::TaskPool;
//!
//! let pool = TaskPool::with_workers(2);
//! let handle = pool.submit(|| 2 + 2);
//! assert_eq!(handle.join().unwrap(), 4);
//! ```
//!
//! Submitted callables may panic: the panic is captured into the handle and
//! never unwinds a worker. Once [`TaskPool::done`] is called the pool drains
//! every accepted task before its workers exit, so no handle is left
//! hanging.

pub mod error;
pub mod pool;
mod queue;
pub mod search;
pub mod task;

pub use error::JoinError;
pub use pool::{PoolConfig, PoolHandle, TaskPool};
pub use task::{Task, TaskHandle};
