//! End-to-end read/write behaviour through the public block API.

use riptide_buffer::{BufferError, PoolConfig};
use riptide_test::{counting_bytes, TestPool};

const PAGE: usize = 4096;

#[test]
fn single_page_read_after_write() {
    let pool = TestPool::small(8, 2);
    let fd = pool.open("t.db");

    pool.manager().set_block(fd, 0, b"abcdef", true).unwrap();
    let block = pool.manager().get_block(fd, 0, 6).unwrap();
    assert!(block.eq_bytes(b"abcdef"));
    // One page, one pin, direct view.
    assert_eq!(block.pin_count(), 1);
    assert_eq!(block.as_contiguous(), Some(&b"abcdef"[..]));
}

#[test]
fn cross_page_read_returns_exact_bytes() {
    let pool = TestPool::small(8, 2);
    let fd = pool.open("cross.db");

    pool.manager()
        .set_block(fd, 0, &counting_bytes(2 * PAGE), false)
        .unwrap();

    let block = pool.manager().get_block(fd, 4090, 12).unwrap();
    assert_eq!(
        block.to_vec(),
        vec![250, 251, 252, 253, 254, 255, 0, 1, 2, 3, 4, 5]
    );
    assert_eq!(block.pin_count(), 2);
    assert!(block.as_contiguous().is_none());
}

#[test]
fn write_is_visible_to_own_reads_without_flush() {
    let pool = TestPool::small(8, 2);
    let fd = pool.open("visible.db");

    pool.manager().set_block(fd, 123, b"in memory", false).unwrap();
    let block = pool.manager().get_block(fd, 123, 9).unwrap();
    assert!(block.eq_bytes(b"in memory"));
}

#[test]
fn durable_roundtrip_across_reopen() {
    let pool = TestPool::small(8, 2);
    let fd = pool.open("durable.db");
    let payload = counting_bytes(3 * PAGE + 17);
    pool.manager().set_block(fd, 5, &payload, false).unwrap();
    pool.manager().flush_file(fd).unwrap();

    let pool = pool.reopen_with(PoolConfig::new(8).with_partitions(2).with_page_size(PAGE));
    let fd = pool.open("durable.db");
    let block = pool.manager().get_block(fd, 5, payload.len()).unwrap();
    assert!(block.eq_bytes(&payload));
}

#[test]
fn zero_length_request_returns_empty_block() {
    let pool = TestPool::small(8, 2);
    let fd = pool.open("empty.db");
    pool.manager().set_block(fd, 0, b"x", false).unwrap();

    let block = pool.manager().get_block(fd, 0, 0).unwrap();
    assert!(block.is_empty());
    assert_eq!(block.pin_count(), 0);

    // Zero-length writes are also fine.
    pool.manager().set_block(fd, 0, b"", false).unwrap();
}

#[test]
fn read_crossing_eof_zero_fills() {
    let pool = TestPool::small(8, 2);
    let fd = pool.open("eof.db");
    pool.manager().set_block(fd, 0, b"end", true).unwrap();

    // The file occupies 3 bytes of page 0; the rest of the page reads as
    // zeroes.
    let block = pool.manager().get_block(fd, 0, 16).unwrap();
    let mut expected = vec![0u8; 16];
    expected[..3].copy_from_slice(b"end");
    assert!(block.eq_bytes(&expected));
}

#[test]
fn write_past_eof_resizes_and_zero_fills_gap() {
    let pool = TestPool::small(8, 2);
    let fd = pool.open("gap.db");

    pool.manager()
        .set_block(fd, PAGE as u64 + 100, b"far", false)
        .unwrap();

    let block = pool.manager().get_block(fd, 0, PAGE + 103).unwrap();
    let bytes = block.to_vec();
    assert!(bytes[..PAGE + 100].iter().all(|&b| b == 0));
    assert_eq!(&bytes[PAGE + 100..], b"far");
}

#[test]
fn read_starting_past_eof_is_rejected() {
    let pool = TestPool::small(8, 2);
    let fd = pool.open("short.db");
    pool.manager().set_block(fd, 0, b"tiny", false).unwrap();

    assert!(matches!(
        pool.manager().get_block(fd, 50_000, 1),
        Err(BufferError::InvalidHandle { .. })
    ));
}

#[test]
fn flush_file_twice_is_idempotent() {
    let pool = TestPool::small(8, 2);
    let fd = pool.open("idem.db");
    pool.manager()
        .set_block(fd, 0, &counting_bytes(PAGE + 7), false)
        .unwrap();

    pool.manager().flush_file(fd).unwrap();
    let first = std::fs::read(pool.path("idem.db")).unwrap();
    pool.manager().flush_file(fd).unwrap();
    let second = std::fs::read(pool.path("idem.db")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn flush_all_covers_every_file() {
    let pool = TestPool::small(8, 2);
    let a = pool.open("a.db");
    let b = pool.open("b.db");
    pool.manager().set_block(a, 0, b"first", false).unwrap();
    pool.manager().set_block(b, 0, b"second", false).unwrap();

    pool.manager().flush_all().unwrap();
    assert_eq!(&std::fs::read(pool.path("a.db")).unwrap()[..5], b"first");
    assert_eq!(&std::fs::read(pool.path("b.db")).unwrap()[..6], b"second");
}

#[test]
fn close_file_invalidates_handle_without_reuse() {
    let pool = TestPool::small(8, 2);
    let a = pool.open("one.db");
    pool.manager().set_block(a, 0, b"bye", false).unwrap();
    pool.manager().close_file(a).unwrap();

    assert!(matches!(
        pool.manager().get_block(a, 0, 3),
        Err(BufferError::InvalidHandle { .. })
    ));

    // A later open gets a fresh handle, never the old slot.
    let b = pool.open("two.db");
    assert_ne!(a, b);
}

#[test]
fn resize_shrinks_and_extends() {
    let pool = TestPool::small(8, 2);
    let fd = pool.open("resize.db");
    pool.manager()
        .set_block(fd, 0, &counting_bytes(2 * PAGE), true)
        .unwrap();

    pool.manager().resize(fd, PAGE as u64).unwrap();
    assert!(matches!(
        pool.manager().get_block(fd, PAGE as u64, 1),
        Err(BufferError::InvalidHandle { .. })
    ));

    pool.manager().resize(fd, 2 * PAGE as u64).unwrap();
    let block = pool.manager().get_block(fd, PAGE as u64, PAGE).unwrap();
    // Extension reads back as zeroes.
    assert!(block.to_vec().iter().all(|&b| b == 0));
}
