//! Thread Control Block.
//!
//! Mirrors `examples/valibali-cluu/kernel/src/scheduler/thread.rs`'s
//! `ThreadId`/`Thread` split, with one deliberate omission: there is no
//! `state: ThreadState` field. Spec §9's Design Notes are explicit that a
//! TCB's state is "which set currently owns its reference", not a field
//! that could drift out of sync with the sets — so the sets in `sched.rs`
//! are the only place a thread's lifecycle stage is recorded.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::{Context, Stack};

/// Default per-thread stack size. Large enough for ordinary library code;
/// there is no overflow detection (an explicit Non-goal).
pub const DEFAULT_STACK_SIZE: usize = 256 * 1024;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque thread handle. Ids are never reused within a process's lifetime
/// (a monotonic counter, not a recycled slot index), so a stale `ThreadId`
/// an application holds onto can never alias a later, unrelated thread —
/// unlike the raw `uthread_t` pointer of the C original, which *can* alias
/// after `free()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    pub(crate) fn next() -> Self {
        ThreadId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The reserved id of the idle thread, always the first one created by
    /// [`crate::run`].
    pub(crate) const IDLE: ThreadId = ThreadId(0);
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

/// One user thread (or the idle thread): a stack plus the machine context
/// resumed to run on it. Exclusively owned by whichever of
/// `sched::Scheduler`'s sets currently references its id.
pub struct Thread {
    pub id: ThreadId,
    pub context: Context,
    // Kept alive for the thread's lifetime; `Context` only borrows its
    // memory while initializing, `makecontext` doesn't keep a live
    // reference, but the stack allocation itself must outlive every
    // switch into this thread.
    pub stack: Stack,
}

impl Thread {
    /// The idle thread: a no-op entry (spec §4.4 — the idle loop doesn't
    /// need one, since it is the context `run()` never leaves except by
    /// switching into user threads), given just enough of a context to be
    /// a valid `switch` target from the very first dispatch.
    pub fn idle() -> Self {
        Thread {
            id: ThreadId::IDLE,
            context: Context::empty(),
            stack: Stack::new(0),
        }
    }

    pub fn spawn(entry: impl FnOnce() + 'static) -> Self {
        let mut stack = Stack::new(DEFAULT_STACK_SIZE);
        let context = Context::new(&mut stack, entry);
        Thread {
            id: ThreadId::next(),
            context,
            stack,
        }
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread").field("id", &self.id).finish()
    }
}
