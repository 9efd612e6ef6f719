//! Counting semaphore (spec §4.5), built entirely on
//! [`crate::block`]/[`crate::unblock`] plus its own FIFO waiter queue.
//! Translated from `examples/original_source/libuthread/sem.c`, which was
//! left as a stub with the wake/block calls pseudocoded in comments — this
//! fills those in.

use std::cell::UnsafeCell;

use crate::preempt;
use crate::queue::Queue;
use crate::sched;
use crate::thread::ThreadId;

struct Inner {
    count: usize,
    waiters: Queue<ThreadId>,
}

/// A counting semaphore with FIFO wakeup order.
///
/// Under this crate's single-threaded execution model (spec §4.5) the
/// classic "wake race" between `up` and `down` can't be observed the way it
/// could on a real multiprocessor, but [`Semaphore::down`] still re-checks
/// `count` in a loop after waking up: another thread may run (and take the
/// freed slot) between this thread's `unblock` and its next scheduled turn.
pub struct Semaphore {
    inner: UnsafeCell<Inner>,
}

// SAFETY: all access goes through `preempt::Guard`-protected sections, and
// only one uthread (or the idle loop) ever executes at a time — see
// `sched`'s module docs for the same argument applied to the scheduler
// singleton.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    /// Create a semaphore with the given initial count and an empty waiter
    /// set.
    pub fn new(count: usize) -> Self {
        Semaphore {
            inner: UnsafeCell::new(Inner {
                count,
                waiters: Queue::new(),
            }),
        }
    }

    /// Take a resource, blocking the caller until one is available.
    pub fn down(&self) {
        loop {
            let acquired = {
                let _g = preempt::Guard::new();
                // SAFETY: guarded by `_g`.
                let inner = unsafe { &mut *self.inner.get() };
                if inner.count > 0 {
                    inner.count -= 1;
                    true
                } else {
                    inner.waiters.enqueue(sched::current());
                    false
                }
            };
            if acquired {
                return;
            }
            sched::block();
        }
    }

    /// Release a resource. If the waiter set is non-empty, unblocks the
    /// oldest waiting thread.
    pub fn up(&self) {
        let _g = preempt::Guard::new();
        // SAFETY: guarded by `_g`.
        let inner = unsafe { &mut *self.inner.get() };
        inner.count += 1;
        if let Some(waiter) = inner.waiters.dequeue() {
            sched::unblock(waiter);
        }
    }

    /// Number of waiters currently blocked on this semaphore. Exposed for
    /// tests and diagnostics; not part of the original C API.
    pub fn waiter_count(&self) -> usize {
        let _g = preempt::Guard::new();
        // SAFETY: guarded by `_g`.
        unsafe { (*self.inner.get()).waiters.len() }
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        let waiters = unsafe { (*self.inner.get()).waiters.len() };
        debug_assert_eq!(
            waiters, 0,
            "semaphore dropped with {waiters} thread(s) still waiting on it"
        );
    }
}
