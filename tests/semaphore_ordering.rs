//! End-to-end scenario 3 from spec.md §8: three threads call `sem_down` in
//! order while the semaphore's count is zero, so all three block; the main
//! thread then calls `sem_up` three times and the waiters wake in the order
//! they blocked (FIFO), not the order `up` happened to run.

mod common;

use std::sync::{Arc, Mutex};

use uthread::Semaphore;

#[test]
fn waiters_wake_in_fifo_order() {
    let _lock = common::test_lock();
    common::init_logging();

    let sem = Arc::new(Semaphore::new(0));
    let order = Arc::new(Mutex::new(Vec::new()));

    let sem_main = sem.clone();
    let order_main = order.clone();
    uthread::run(false, move || {
        for id in [1, 2, 3] {
            let sem = sem_main.clone();
            let order = order_main.clone();
            uthread::create(move || {
                sem.down();
                order.lock().unwrap().push(id);
            })
            .unwrap();
        }
        // Let all three threads reach `sem.down()` and block before any
        // `up` call, so the waiter queue fills in 1, 2, 3 order.
        uthread::yield_now();
        uthread::yield_now();
        uthread::yield_now();

        sem_main.up();
        sem_main.up();
        sem_main.up();
    })
    .unwrap();

    assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
}

#[test]
fn counting_semaphore_permits_k_concurrent_holders() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let _lock = common::test_lock();
    common::init_logging();

    let sem = Arc::new(Semaphore::new(2));
    let concurrent = Arc::new(AtomicUsize::new(0));
    let max_concurrent = Arc::new(AtomicUsize::new(0));

    let sem_main = sem.clone();
    let concurrent_main = concurrent.clone();
    let max_main = max_concurrent.clone();
    uthread::run(false, move || {
        for _ in 0..5 {
            let sem = sem_main.clone();
            let concurrent = concurrent_main.clone();
            let max_concurrent = max_main.clone();
            uthread::create(move || {
                sem.down();
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                uthread::yield_now();
                concurrent.fetch_sub(1, Ordering::SeqCst);
                sem.up();
            })
            .unwrap();
        }
    })
    .unwrap();

    assert!(max_concurrent.load(Ordering::SeqCst) <= 2);
    assert_eq!(concurrent.load(Ordering::SeqCst), 0);
}
