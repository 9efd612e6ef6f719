//! Shared integration-test helpers.
//!
//! `uthread::run` bootstraps a single process-wide scheduler singleton
//! (`sched.rs`'s module docs) and, when preemption is on, arms a real
//! `SIGVTALRM`/`ITIMER_VIRTUAL` for the whole process. `cargo test`'s
//! default harness runs every `#[test]` in a file concurrently on separate
//! OS threads, which would otherwise let two tests stomp on that one
//! singleton (and on each other's timer) at once. Every test in this crate
//! takes `test_lock()` first to force them to run one at a time instead.

use std::sync::Mutex;

static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Acquire the crate-wide test serialization lock. Hold the returned guard
/// for the whole body of a `#[test]` fn that calls `uthread::run`.
pub fn test_lock() -> std::sync::MutexGuard<'static, ()> {
    // A prior test panicking while holding the lock poisons it; that
    // failure is already reported independently, so recover the guard
    // rather than cascading the poison into every later test.
    TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Route `log`'s output through `env_logger` for tests run with
/// `RUST_LOG` set (e.g. `RUST_LOG=uthread=trace cargo test -- --nocapture`).
/// Safe to call from every test; only the first call installs the logger.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
