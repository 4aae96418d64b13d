//! Concurrency tests for the buffer pool.
//!
//! Threads hammer a pool smaller than the working set so pages cycle
//! through eviction while readers and writers race. Every page keeps
//! the invariant `data[0] == data[1] + data[2]`, which a torn or stale
//! read would break.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use strata_common::types::PageId;
use strata_storage::buffer::{BufferPool, BufferPoolConfig, BufferPoolManager, ParallelBufferPool};
use strata_storage::disk::MemDiskManager;

fn seed_pages(pool: &dyn BufferPoolManager, count: usize) -> Vec<PageId> {
    let mut pids = Vec::with_capacity(count);
    for _ in 0..count {
        let mut handle = pool.new_page().expect("pool must have room while seeding");
        {
            let mut data = handle.data_mut();
            data[0] = 0;
            data[1] = 0;
            data[2] = 0;
        }
        pids.push(handle.page_id());
    }
    pids
}

fn run_workload(pool: Arc<dyn BufferPoolManager>, pids: Arc<Vec<PageId>>) {
    let stop = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();

    for t in 0..2 {
        let pool = Arc::clone(&pool);
        let pids = Arc::clone(&pids);
        let stop = Arc::clone(&stop);
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(0xC0FFEE + t);
            while !stop.load(Ordering::Acquire) {
                let pid = pids[rng.gen_range(0..pids.len())];
                let mut page = pool.fetch_page(pid).expect("fetch for write");
                let mut data = page.data_mut();
                let d1: u8 = rng.gen_range(0..100);
                let d2: u8 = rng.gen_range(0..100);
                data[1] = d1;
                data[2] = d2;
                data[0] = d1 + d2;
            }
        }));
    }

    for t in 0..2 {
        let pool = Arc::clone(&pool);
        let pids = Arc::clone(&pids);
        let stop = Arc::clone(&stop);
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(0xBEEF + t);
            while !stop.load(Ordering::Acquire) {
                let pid = pids[rng.gen_range(0..pids.len())];
                let page = pool.fetch_page(pid).expect("fetch for read");
                let data = page.data();
                assert_eq!(data[0], data[1] + data[2], "page {pid} read torn bytes");
            }
        }));
    }

    thread::sleep(std::time::Duration::from_millis(500));
    stop.store(true, Ordering::Release);
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn concurrent_read_write_single_instance() {
    let disk = Arc::new(MemDiskManager::new());
    let pool = Arc::new(BufferPool::new(BufferPoolConfig::new(8), disk).unwrap());

    // Working set twice the pool size: fetches keep evicting.
    let pids = {
        let pool: &dyn BufferPoolManager = pool.as_ref();
        Arc::new(seed_pages(pool, 16))
    };
    run_workload(pool, pids);
}

#[test]
fn concurrent_read_write_parallel_pool() {
    let disk = Arc::new(MemDiskManager::new());
    let pool = Arc::new(ParallelBufferPool::new(4, 4, disk).unwrap());

    let pids = {
        let pool: &dyn BufferPoolManager = pool.as_ref();
        Arc::new(seed_pages(pool, 32))
    };
    run_workload(pool, pids);
}

#[test]
fn eviction_round_trip_under_pressure() {
    let disk = Arc::new(MemDiskManager::new());
    let pool = BufferPool::new(BufferPoolConfig::new(4), disk).unwrap();

    // Write a distinct pattern to many more pages than the pool holds.
    let mut pids = Vec::new();
    for i in 0..32u8 {
        let mut handle = pool.new_page().unwrap();
        handle.data_mut().fill(i);
        pids.push(handle.page_id());
    }

    // Every page must read back its own pattern after cycling through
    // disk.
    for (i, &pid) in pids.iter().enumerate() {
        let handle = pool.fetch_page(pid).unwrap();
        assert!(handle.data().iter().all(|&b| b == i as u8));
    }
}

#[test]
fn striping_holds_across_instances() {
    let disk = Arc::new(MemDiskManager::new());
    let pool = ParallelBufferPool::new(2, 4, disk).unwrap();

    for _ in 0..32 {
        let handle = pool.new_page().unwrap();
        let pid = handle.page_id();
        drop(handle);
        // Routing back through the id must land on the owning
        // instance; a stripe violation would assert inside the pool.
        assert!(pool.contains(pid) || pool.fetch_page(pid).is_some());
    }
}
