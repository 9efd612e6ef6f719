//! Timer-driven preemption (spec §4.3).
//!
//! A periodic `SIGVTALRM` (virtual-time alarm: fires based on CPU time
//! consumed by this process, not wall-clock time) invokes [`crate::yield_now`]
//! from the signal handler so a thread that never cooperatively yields can't
//! starve the others. Translated from
//! `examples/original_source/libuthread/preempt.c`, including its
//! capture-and-restore of whatever handler/timer `start` overwrote (spec
//! §4.3: "On `preempt_stop`, restore the previously captured handler and
//! previously captured timer configuration"); the nesting counter
//! generalizes the teacher's single `PREEMPTION_DISABLED: AtomicBool` flag
//! (`examples/valibali-cluu/kernel/src/scheduler/mod.rs`) to the nonnegative
//! nesting count spec §4.3 requires.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Preemption signals per second of process virtual time.
pub const HZ: u32 = 100;

static ENABLED: AtomicBool = AtomicBool::new(false);
static DISABLE_COUNT: AtomicUsize = AtomicUsize::new(0);

/// The handler and timer configuration `start` overwrote, captured so
/// `stop` can restore them exactly (spec §4.3: "On `preempt_stop`, restore
/// the previously captured handler and previously captured timer
/// configuration"), mirroring
/// `examples/original_source/libuthread/preempt.c`'s `prev_handler`/
/// `prev_timer` globals.
struct PrevState {
    sigaction: libc::sigaction,
    timer: libc::itimerval,
}

struct PrevStateCell(UnsafeCell<Option<PrevState>>);

// SAFETY: only ever touched from `start`/`stop`, both of which the scheduler
// calls only from `run()`'s single-threaded bootstrap/teardown path.
unsafe impl Sync for PrevStateCell {}

static PREV: PrevStateCell = PrevStateCell(UnsafeCell::new(None));

extern "C" fn handle_alarm(_signum: libc::c_int) {
    crate::yield_now();
}

fn signal_set() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = MaybeUninit::zeroed().assume_init();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGVTALRM);
        set
    }
}

/// Start preemption if `preempt` is true. If false, this and every other
/// function in this module become no-ops — the "preemption off" mode of
/// spec §4.3.
pub fn start(preempt: bool) {
    if !preempt {
        return;
    }

    unsafe {
        let mut sa: libc::sigaction = MaybeUninit::zeroed().assume_init();
        sa.sa_sigaction = handle_alarm as usize;
        sa.sa_flags = 0;
        libc::sigemptyset(&mut sa.sa_mask);

        let mut old_sa: libc::sigaction = MaybeUninit::zeroed().assume_init();
        libc::sigaction(libc::SIGVTALRM, &sa, &mut old_sa);

        let interval_usec = (1_000_000 / HZ) as i64;
        let timer = libc::itimerval {
            it_interval: libc::timeval {
                tv_sec: 0,
                tv_usec: interval_usec,
            },
            it_value: libc::timeval {
                tv_sec: 0,
                tv_usec: interval_usec,
            },
        };
        let mut old_timer: libc::itimerval = MaybeUninit::zeroed().assume_init();
        if libc::setitimer(libc::ITIMER_VIRTUAL, &timer, &mut old_timer) == -1 {
            // Restore the handler we just installed before giving up.
            libc::sigaction(libc::SIGVTALRM, &old_sa, std::ptr::null_mut());
            log::warn!("setitimer failed, preemption disabled for this run");
            return;
        }

        *PREV.0.get() = Some(PrevState {
            sigaction: old_sa,
            timer: old_timer,
        });
    }

    ENABLED.store(true, Ordering::SeqCst);
}

/// Restore whatever signal handler and timer configuration `start`
/// overwrote.
pub fn stop() {
    if !ENABLED.swap(false, Ordering::SeqCst) {
        return;
    }
    // SAFETY: set by the matching `start()` call on this same single-
    // threaded bootstrap/teardown path; `ENABLED` being true guarantees it.
    let prev = unsafe { (*PREV.0.get()).take() }
        .expect("ENABLED implies start() populated PREV");
    unsafe {
        libc::sigaction(libc::SIGVTALRM, &prev.sigaction, std::ptr::null_mut());
        libc::setitimer(libc::ITIMER_VIRTUAL, &prev.timer, std::ptr::null_mut());
    }
}

/// Mask the alarm signal on the 0→1 transition, incrementing the nesting
/// count. A no-op if preemption was never started.
pub fn disable() {
    if !ENABLED.load(Ordering::SeqCst) {
        return;
    }
    if DISABLE_COUNT.fetch_add(1, Ordering::SeqCst) == 0 {
        unsafe {
            libc::sigprocmask(libc::SIG_BLOCK, &signal_set(), std::ptr::null_mut());
        }
    }
}

/// Unmask the alarm signal on the 1→0 transition, decrementing the nesting
/// count. Underflow (more `enable` than `disable`) is not policed, per
/// spec §4.3, and will not panic — it saturates at zero instead of
/// wrapping so a stray extra `enable` can't flip the mask on by surprise.
pub fn enable() {
    if !ENABLED.load(Ordering::SeqCst) {
        return;
    }
    let prev = DISABLE_COUNT.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
        Some(n.saturating_sub(1))
    });
    if prev == Ok(1) {
        unsafe {
            libc::sigprocmask(libc::SIG_UNBLOCK, &signal_set(), std::ptr::null_mut());
        }
    }
}

/// RAII guard that disables preemption for the duration of a scheduler
/// critical section (spec §4.6) and re-enables it on drop, even on an early
/// return or panic unwind. The idiomatic expression, in a safe language, of
/// "raise the mask, mutate, lower the mask" (spec §9 Design Notes).
pub struct Guard;

impl Guard {
    pub fn new() -> Self {
        disable();
        Guard
    }
}

impl Drop for Guard {
    fn drop(&mut self) {
        enable();
    }
}
