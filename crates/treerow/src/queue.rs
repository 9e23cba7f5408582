#![forbid(unsafe_code)]

//! Single-flight sequential task queue with a drain signal.
//!
//! # Design
//!
//! Every structural mutation of the projection runs as one task on a
//! [`TaskQueue`]. Tasks execute strictly one at a time in submission
//! order, each awaited to completion before the next starts, no matter
//! how many callers submit concurrently. Serialization rides on a fair
//! (FIFO) async mutex rather than a shared task list, so there is no
//! list being spliced while it is iterated.
//!
//! # Failure Modes
//!
//! - **Task error**: propagates to the submitter through [`TaskQueue::run`]'s
//!   return value. The queue advances to the next task; the drain signal
//!   always fires once the queue empties.
//! - **Task cancellation**: dropping the future returned by `run` releases
//!   the task's pending slot (drop guard), so a cancelled task cannot
//!   wedge [`TaskQueue::drain`].
//! - **Stuck task**: a fetch that never resolves stalls the queue
//!   indefinitely. No timeout exists at this layer; cancellation belongs
//!   to the backend.

use std::cell::Cell;
use std::rc::Rc;

use tokio::sync::{Mutex, Notify};

/// Shared interior for [`TaskQueue`].
struct QueueInner {
    /// Fair mutex: waiters acquire in FIFO order, which is what turns
    /// concurrent submissions into sequential execution.
    turn: Mutex<()>,
    /// Tasks submitted and not yet finished (running included).
    pending: Cell<usize>,
    /// Signalled each time `pending` returns to zero.
    drained: Notify,
}

/// A single-flight sequential task runner.
///
/// Cloning a `TaskQueue` creates a new handle to the **same** queue.
/// The type is single-threaded (`!Send`), like the rest of the engine.
pub struct TaskQueue {
    inner: Rc<QueueInner>,
}

impl Clone for TaskQueue {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.inner.pending.get())
            .finish()
    }
}

/// Releases one pending slot when dropped, firing the drain signal if
/// the queue became empty. Drop-based so cancellation is covered.
struct PendingSlot {
    inner: Rc<QueueInner>,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        let remaining = self.inner.pending.get().saturating_sub(1);
        self.inner.pending.set(remaining);
        if remaining == 0 {
            self.inner.drained.notify_waiters();
        }
    }
}

impl TaskQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(QueueInner {
                turn: Mutex::new(()),
                pending: Cell::new(0),
                drained: Notify::new(),
            }),
        }
    }

    /// Run `task` after every previously submitted task has completed.
    ///
    /// The task's output (including an error output) is returned to the
    /// caller unchanged; an erring task does not stop the queue.
    ///
    /// A task counts as pending from the first poll of the returned
    /// future until it completes or is dropped.
    pub async fn run<T>(&self, task: impl Future<Output = T>) -> T {
        self.inner.pending.set(self.inner.pending.get() + 1);
        let _slot = PendingSlot {
            inner: Rc::clone(&self.inner),
        };
        let _turn = self.inner.turn.lock().await;
        task.await
    }

    /// Whether no task is pending or running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.pending.get() == 0
    }

    /// Resolve once the queue is empty.
    ///
    /// Yields once before the first check so tasks spawned earlier in the
    /// same scheduler tick get a chance to enter the queue. Resolves
    /// immediately after that if nothing is pending. Concurrent drain
    /// waiters all wake on the same signal.
    pub async fn drain(&self) {
        tokio::task::yield_now().await;
        loop {
            let drained = self.inner.drained.notified();
            if self.is_empty() {
                return;
            }
            drained.await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
