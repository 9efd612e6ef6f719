//! Scheduler core: TCB lifecycle, ready/blocked/zombie sets, the idle loop
//! (spec §4.4).
//!
//! The global scheduler state is a single process-wide singleton (spec §9
//! Design Notes: "a single lazily initialized singleton... is acceptable
//! because `run` is the single lifecycle boundary"). It is reached through
//! a bare `UnsafeCell`, not a `Mutex`: there is never more than one flow of
//! control active at a time (Non-goal: multi-core parallelism), and the
//! *other* place executions could interleave — the `SIGVTALRM` handler —
//! is masked out for the whole mutation window by [`crate::preempt::Guard`]
//! before any access happens. A `Mutex` would add nothing but the
//! possibility of a reentrant-lock deadlock if that discipline were ever
//! violated; the `Guard` requirement is documented on every access point
//! instead.

use std::collections::HashMap;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::preempt;
use crate::queue::Queue;
use crate::thread::{Thread, ThreadId};

struct Scheduler {
    idle: Thread,
    threads: HashMap<ThreadId, Thread>,
    ready: Queue<ThreadId>,
    blocked: Queue<ThreadId>,
    zombie: Queue<ThreadId>,
    current: ThreadId,
}

struct SchedulerCell(std::cell::UnsafeCell<Option<Scheduler>>);

// SAFETY: see module docs — access is serialized by `preempt::Guard`
// masking the only other source of reentrancy (the alarm handler).
unsafe impl Sync for SchedulerCell {}

static SCHEDULER: SchedulerCell = SchedulerCell(std::cell::UnsafeCell::new(None));

/// Run `f` against the live scheduler. Must only be called while a
/// [`preempt::Guard`] is held. Returns `None` if `run()` hasn't been
/// called yet (or has already returned).
fn with<R>(f: impl FnOnce(&mut Scheduler) -> R) -> Option<R> {
    // SAFETY: caller holds a `preempt::Guard`; see module docs.
    let slot = unsafe { &mut *SCHEDULER.0.get() };
    slot.as_mut().map(f)
}

fn require<R>(f: impl FnOnce(&mut Scheduler) -> R) -> Result<R> {
    with(f).ok_or(Error::NotRunning)
}

/// Handle of the thread currently executing.
pub fn current() -> ThreadId {
    let _g = preempt::Guard::new();
    with(|s| s.current).unwrap_or(ThreadId::IDLE)
}

/// Create a new thread running `f`; appended to the tail of the ready set.
/// A `create` called during another thread's execution runs after every
/// thread already on the ready set (spec §4.4 tie-break).
pub fn create(f: impl FnOnce() + 'static) -> Result<ThreadId> {
    let _g = preempt::Guard::new();
    require(|s| {
        let thread = Thread::spawn(f);
        let id = thread.id;
        s.threads.insert(id, thread);
        s.ready.enqueue(id);
        log::debug!("created {id}");
        id
    })
}

/// Append the caller to the ready set and return control to idle. Returns
/// once every thread ready at the moment of the call has had one turn.
pub fn yield_now() {
    let id = {
        let _g = preempt::Guard::new();
        match with(|s| {
            let id = s.current;
            s.ready.enqueue(id);
            id
        }) {
            Some(id) => id,
            None => return, // not running; nothing to yield from
        }
    };
    log::trace!("{id} yields");
    switch_to_idle(id);
}

/// Append the caller to the zombie set and return control to idle. Its
/// stack and TCB are released on idle's next reaping pass. Never returns.
pub fn exit() -> ! {
    let id = {
        let _g = preempt::Guard::new();
        with(|s| {
            let id = s.current;
            s.zombie.enqueue(id);
            id
        })
        .expect("exit() called while scheduler is not running")
    };
    log::debug!("{id} exits");
    switch_to_idle(id);
    unreachable!("a zombie thread was resumed after exit()")
}

/// Append the caller to the blocked set and return control to idle. Resumes
/// only once some other thread calls [`unblock`] with this thread's id.
pub fn block() {
    let id = {
        let _g = preempt::Guard::new();
        match with(|s| {
            let id = s.current;
            s.blocked.enqueue(id);
            id
        }) {
            Some(id) => id,
            None => return,
        }
    };
    log::trace!("{id} blocks");
    switch_to_idle(id);
}

/// If `t` is in the blocked set, move it to the ready set. No-op otherwise
/// (spec §4.4: includes threads not currently blocked at all).
pub fn unblock(t: ThreadId) {
    let _g = preempt::Guard::new();
    with(|s| {
        if s.blocked.delete(t) {
            s.ready.enqueue(t);
            log::trace!("{t} unblocked");
        }
    });
}

/// Switch from the currently running thread `from` back into the idle
/// context. Performed with preemption re-enabled (spec §4.6: the switch
/// itself need not be masked, only the state mutation that preceded it).
fn switch_to_idle(from: ThreadId) {
    // SAFETY: `from`'s own context and `idle`'s context are disjoint
    // fields of `Scheduler`; taking raw pointers to both and releasing the
    // implicit borrow before the FFI call avoids holding two overlapping
    // `&mut` borrows across `Context::switch`.
    let (from_ctx, idle_ctx): (*mut Context, *mut Context) = unsafe {
        let slot = &mut *SCHEDULER.0.get();
        let sched = slot.as_mut().expect("scheduler running");
        let thread = sched.threads.get_mut(&from).expect("live thread id");
        (&mut thread.context, &mut sched.idle.context)
    };
    unsafe { (*from_ctx).switch(&mut *idle_ctx) };
}

/// Bootstrap the scheduler and run its idle loop until every user thread
/// has exited (spec §4.4).
pub fn run(preempt_enabled: bool, f: impl FnOnce() + 'static) -> Result<()> {
    let first_id = {
        let _g = preempt::Guard::new();
        let idle = Thread::idle();
        let first = Thread::spawn(move || {
            f();
            exit();
        });
        let first_id = first.id;

        let mut threads = HashMap::new();
        threads.insert(first_id, first);
        let mut ready = Queue::new();
        ready.enqueue(first_id);

        let scheduler = Scheduler {
            idle,
            threads,
            ready,
            blocked: Queue::new(),
            zombie: Queue::new(),
            current: ThreadId::IDLE,
        };
        unsafe { *SCHEDULER.0.get() = Some(scheduler) };
        first_id
    };

    preempt::start(preempt_enabled);
    log::debug!("run() starting idle loop, first thread {first_id}");

    idle_loop();

    preempt::stop();
    let _g = preempt::Guard::new();
    with(|s| {
        // A thread that blocked with no matching `unblock` is permanently
        // blocked (spec §4.4 edge cases) — `run` still returns `Ok`, but the
        // blocked set must be explicitly drained here rather than dropped
        // non-empty, since `Queue::drop` asserts emptiness.
        while let Some(t) = s.blocked.dequeue() {
            log::warn!("{t} still blocked when run() returned (no matching unblock)");
        }
    });
    unsafe { *SCHEDULER.0.get() = None };
    Ok(())
}

fn idle_loop() {
    loop {
        let next = {
            let _g = preempt::Guard::new();
            with(|s| {
                let next = s.ready.dequeue();
                if let Some(id) = next {
                    s.current = id;
                }
                next
            })
            .flatten()
        };

        let Some(id) = next else {
            break;
        };

        switch_into(id);

        let _g = preempt::Guard::new();
        with(|s| {
            while let Some(z) = s.zombie.dequeue() {
                s.threads.remove(&z);
                log::debug!("reaped {z}");
            }
        });
    }
}

/// Switch from idle into the selected thread `id`. Mirrors
/// [`switch_to_idle`] in the opposite direction.
fn switch_into(id: ThreadId) {
    let (idle_ctx, thread_ctx): (*mut Context, *mut Context) = unsafe {
        let slot = &mut *SCHEDULER.0.get();
        let sched = slot.as_mut().expect("scheduler running");
        let thread = sched.threads.get_mut(&id).expect("ready id has a TCB");
        (&mut sched.idle.context, &mut thread.context)
    };
    unsafe { (*idle_ctx).switch(&mut *thread_ctx) };
}
