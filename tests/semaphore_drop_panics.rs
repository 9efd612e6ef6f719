//! Spec §8 testable property: "`sem_destroy` on a semaphore with waiters
//! returns `-1`." This crate's `Semaphore` has no separate destroy
//! operation (`Drop` plays that role, per `SPEC_FULL.md`'s `[MODULE:
//! semaphore]` section), so the equivalent here is that dropping a
//! `Semaphore` while a thread is still parked in its waiter queue panics
//! in a debug build (`Semaphore::drop`'s `debug_assert_eq!`).

mod common;

use uthread::Semaphore;

#[test]
#[should_panic(expected = "thread(s) still waiting")]
fn dropping_a_semaphore_with_a_pending_waiter_panics() {
    let _lock = common::test_lock();
    common::init_logging();

    let sem = Semaphore::new(0);
    // Share `sem` with the created thread as a raw pointer rather than by
    // reference: the thread below blocks on `down()` and is never
    // unblocked, so it never resumes and never needs to observe `sem`'s
    // drop — only this function's stack frame owns it, and that's what we
    // drop explicitly at the end.
    let sem_addr = &sem as *const Semaphore as usize;

    uthread::run(false, move || {
        uthread::create(move || {
            // SAFETY: `sem` outlives this whole `run` call; this thread
            // blocks forever inside `down()` and is force-drained out of
            // the blocked set (never resumed) once `run` returns, so the
            // pointer is never used after `sem` is dropped below.
            let sem = unsafe { &*(sem_addr as *const Semaphore) };
            sem.down();
        })
        .unwrap();
        uthread::yield_now();
    })
    .unwrap();

    drop(sem);
}
