// tests/watch_lock.rs

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::{TestResult, init_tracing, with_timeout};
use watcher::watch::WatchLockService;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn lock_serializes_holders_of_the_same_watch() -> TestResult {
    init_tracing();
    let locks = WatchLockService::new();
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let locks = locks.clone();
        let inside = Arc::clone(&inside);
        let max_inside = Arc::clone(&max_inside);
        handles.push(tokio::spawn(async move {
            let _lock = locks.acquire("w").await;
            let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
            max_inside.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            inside.fetch_sub(1, Ordering::SeqCst);
        }));
    }
    with_timeout(async {
        for handle in handles {
            handle.await.unwrap();
        }
    })
    .await;

    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert_eq!(locks.held(), 0, "lock table should be empty once everyone released");
    Ok(())
}

#[tokio::test]
async fn different_watches_do_not_contend() -> TestResult {
    init_tracing();
    let locks = WatchLockService::new();

    let a = locks.acquire("a").await;
    let b = with_timeout(locks.acquire("b")).await;

    assert!(locks.is_locked("a"));
    assert!(locks.is_locked("b"));
    assert_eq!(locks.held(), 2);
    drop(a);
    drop(b);
    assert!(!locks.is_locked("a"));
    assert_eq!(locks.held(), 0);
    Ok(())
}

#[tokio::test]
async fn release_is_idempotent_and_drop_releases() -> TestResult {
    init_tracing();
    let locks = WatchLockService::new();

    let mut lock = locks.acquire("w").await;
    assert!(lock.is_held());
    assert_eq!(lock.watch_id(), "w");
    lock.release();
    lock.release();
    assert!(!lock.is_held());
    assert!(!locks.is_locked("w"));

    // The released lock can be taken again right away.
    let again = with_timeout(locks.acquire("w")).await;
    drop(again);
    drop(lock);
    assert_eq!(locks.held(), 0);
    Ok(())
}

#[tokio::test]
async fn waiter_gets_the_lock_after_release() -> TestResult {
    init_tracing();
    let locks = WatchLockService::new();
    let first = locks.acquire("w").await;

    let waiter = {
        let locks = locks.clone();
        tokio::spawn(async move {
            let lock = locks.acquire("w").await;
            lock.is_held()
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    drop(first);
    assert!(with_timeout(waiter).await?);
    Ok(())
}

#[tokio::test]
async fn lock_is_released_when_the_holder_panics() -> TestResult {
    init_tracing();
    let locks = WatchLockService::new();

    let holder = {
        let locks = locks.clone();
        tokio::spawn(async move {
            let _lock = locks.acquire("w").await;
            panic!("stage blew up");
        })
    };
    assert!(holder.await.is_err());

    let lock = with_timeout(locks.acquire("w")).await;
    assert!(lock.is_held());
    Ok(())
}
