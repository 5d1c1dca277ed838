//! Batched and asynchronous block requests.

use riptide_buffer::{BlockRequest, BufferError, PoolConfig};
use riptide_test::{counting_bytes, page_of, TestPool};

const PAGE: usize = 4096;

#[test]
fn batch_with_mixed_hits_and_misses_loads_only_misses() {
    let pool = TestPool::new(
        PoolConfig::new(16)
            .with_partitions(1)
            .with_page_size(PAGE),
    );
    let fd = pool.open("mixed.db");
    for fpage in 0..5u64 {
        pool.manager()
            .set_block(fd, fpage * PAGE as u64, &page_of(fpage as u8, PAGE), false)
            .unwrap();
    }
    pool.manager().flush_file(fd).unwrap();

    // Start cold, then pre-warm pages 0, 2, 4.
    let pool = pool.reopen_with(
        PoolConfig::new(16)
            .with_partitions(1)
            .with_page_size(PAGE),
    );
    let fd = pool.open("mixed.db");
    for fpage in [0u64, 2, 4] {
        let _ = pool
            .manager()
            .get_block(fd, fpage * PAGE as u64, PAGE)
            .unwrap();
    }

    let reads_before = pool.manager().io_read_count();
    let requests: Vec<BlockRequest> = (0..5u64)
        .map(|fpage| BlockRequest::new(fd, fpage * PAGE as u64, PAGE))
        .collect();
    let results = pool.manager().get_block_batch(&requests);

    assert_eq!(results.len(), 5);
    for (fpage, result) in results.into_iter().enumerate() {
        let block = result.unwrap();
        assert!(block.eq_bytes(&page_of(fpage as u8, PAGE)));
    }
    // Exactly the two cold pages (1 and 3) reached the I/O server.
    assert_eq!(pool.manager().io_read_count() - reads_before, 2);
    pool.manager().assert_unpinned();
}

#[test]
fn batch_results_are_in_input_order() {
    let pool = TestPool::small(16, 2);
    let fd = pool.open("order.db");
    let data = counting_bytes(6 * PAGE);
    pool.manager().set_block(fd, 0, &data, false).unwrap();

    // Deliberately out-of-order and overlapping requests.
    let requests = vec![
        BlockRequest::new(fd, 5 * PAGE as u64, 100),
        BlockRequest::new(fd, 0, 100),
        BlockRequest::new(fd, 3 * PAGE as u64 - 50, 100),
        BlockRequest::new(fd, 0, 100),
    ];
    let results = pool.manager().get_block_batch(&requests);

    for (request, result) in requests.iter().zip(&results) {
        let block = result.as_ref().unwrap();
        let at = request.offset as usize;
        assert!(block.eq_bytes(&data[at..at + request.len]));
    }
}

#[test]
fn batch_collects_per_request_errors() {
    let pool = TestPool::small(8, 2);
    let fd = pool.open("errors.db");
    pool.manager().set_block(fd, 0, b"valid", false).unwrap();

    let requests = vec![
        BlockRequest::new(fd, 0, 5),
        BlockRequest::new(fd, 1 << 20, 5),
        BlockRequest::new(fd, 2, 3),
    ];
    let results = pool.manager().get_block_batch(&requests);

    assert!(results[0].as_ref().unwrap().eq_bytes(b"valid"));
    assert!(matches!(
        results[1],
        Err(BufferError::InvalidHandle { .. })
    ));
    assert!(results[2].as_ref().unwrap().eq_bytes(b"lid"));
}

#[test]
fn async_future_can_be_awaited() {
    let pool = TestPool::small(8, 2);
    let fd = pool.open("await.db");
    pool.manager().set_block(fd, 0, b"future bytes", false).unwrap();

    // Poll the future on a plain thread-parking executor.
    let future = pool.manager().get_block_async(fd, 0, 12);
    let block = block_on(future).unwrap();
    assert!(block.eq_bytes(b"future bytes"));
}

#[test]
fn many_batches_over_small_window() {
    // Window smaller than the batch exercises the worker's slot reuse.
    let pool = TestPool::new(
        PoolConfig::new(32)
            .with_partitions(2)
            .with_page_size(PAGE)
            .with_batch_window(2),
    );
    let fd = pool.open("window.db");
    for fpage in 0..16u64 {
        pool.manager()
            .set_block(fd, fpage * PAGE as u64, &page_of(fpage as u8, PAGE), false)
            .unwrap();
    }

    let requests: Vec<BlockRequest> = (0..16u64)
        .map(|fpage| BlockRequest::new(fd, fpage * PAGE as u64, PAGE))
        .collect();
    let results = pool.manager().get_block_batch(&requests);
    for (fpage, result) in results.into_iter().enumerate() {
        assert!(result.unwrap().eq_bytes(&page_of(fpage as u8, PAGE)));
    }
    pool.manager().assert_unpinned();
}

/// Minimal block_on: polls with a waker that unparks this thread.
fn block_on<F: std::future::Future>(future: F) -> F::Output {
    use std::pin::pin;
    use std::sync::Arc;
    use std::task::{Context, Poll, Wake, Waker};

    struct ThreadWaker(std::thread::Thread);
    impl Wake for ThreadWaker {
        fn wake(self: Arc<Self>) {
            self.0.unpark();
        }
    }

    let waker = Waker::from(Arc::new(ThreadWaker(std::thread::current())));
    let mut cx = Context::from_waker(&waker);
    let mut future = pin!(future);
    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(output) => return output,
            Poll::Pending => std::thread::park(),
        }
    }
}
