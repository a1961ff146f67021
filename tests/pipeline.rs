use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering::SeqCst;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use atomy::{AtomyError, Channel, PoolConfig, Stack, ThreadPool, WaitStrategy};

/// Submit a large batch, retrying on backpressure, and let drop wait for completion.
fn count_tasks(config: PoolConfig, tasks: usize) {
    let count = Arc::new(AtomicUsize::new(0));
    let pool = ThreadPool::with_config(config).unwrap();

    for _ in 0..tasks {
        loop {
            let count = Arc::clone(&count);
            match pool.execute(move || {
                count.fetch_add(1, SeqCst);
            }) {
                Ok(()) => break,
                Err(AtomyError::QueueFull) => thread::yield_now(),
                Err(e) => panic!("unexpected execute error: {e:?}"),
            }
        }
    }
    drop(pool);

    assert_eq!(count.load(SeqCst), tasks);
}

#[test]
fn batch_completes_on_drop_blocking() {
    count_tasks(PoolConfig::new(10).threads(4), 100_000);
}

#[test]
fn batch_completes_on_drop_backoff() {
    count_tasks(
        PoolConfig::new(6).threads(3).wait(WaitStrategy::backoff()),
        20_000,
    );
}

#[test]
fn channel_feeds_pool_results_into_stack() {
    // producer -> channel -> pool workers -> stack
    const ITEMS: usize = 1_000;

    let input = Arc::new(Channel::new(5).unwrap());
    let output = Arc::new(Stack::new());
    let pool = ThreadPool::new(5, 4).unwrap();

    let producer = {
        let input = Arc::clone(&input);
        thread::spawn(move || {
            for i in 0..ITEMS {
                let mut value = i;
                while let Err(back) = input.push(value) {
                    value = back;
                    thread::yield_now();
                }
            }
        })
    };

    let mut returned = Vec::with_capacity(ITEMS);
    for _ in 0..ITEMS {
        let value = input.pop();
        loop {
            let output = Arc::clone(&output);
            let handle = pool.submit(move || {
                output.push(value * 2);
                value
            });
            match handle.wait_timeout(Duration::from_secs(5)) {
                Err(AtomyError::QueueFull) => thread::yield_now(),
                other => {
                    returned.push(other.unwrap());
                    break;
                }
            }
        }
    }
    producer.join().unwrap();
    pool.join();

    returned.sort_unstable();
    assert_eq!(returned, (0..ITEMS).collect::<Vec<_>>());
    let mut doubled = Vec::with_capacity(ITEMS);
    while let Some(v) = output.pop() {
        doubled.push(v);
    }
    doubled.sort_unstable();
    assert_eq!(doubled, (0..ITEMS).map(|i| i * 2).collect::<Vec<_>>());
    assert!(input.try_pop().is_none());
}
