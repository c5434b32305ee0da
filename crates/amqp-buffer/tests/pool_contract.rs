//! `pool_contract` 集成测试：验证段池在公开 API 下的取还与统计契约。
//!
//! # 测试目标（Why）
//! - 段池是内核中唯一全局共享的可变资源，取还配平一旦失效，空闲路径的
//!   读取将退化为每次分配，或在中止路径上双重归还破坏链表；
//! - 通过外部 crate 视角调用，避免依赖内部实现细节。

use amqp_buffer::SegmentPool;

/// 取出的段在 Drop 后回到自由链表，第二次取出复用同一内存。
#[test]
fn segment_returns_to_pool_on_drop() {
    let pool = SegmentPool::new(128, 8);
    {
        let mut segment = pool.take();
        segment.data_mut().extend_from_slice(&[1, 2, 3, 4]);
        assert_eq!(segment.remaining(), 4);
    }
    let stats = pool.stats();
    assert_eq!(stats.active, 0, "Drop 后不应有在外流通的段");
    assert_eq!(stats.cached, 1, "归还的段应进入自由链表");
    assert_eq!(stats.total_recycled, 1);

    let second = pool.take();
    assert_eq!(second.remaining(), 0, "复用段必须以空内容交付");
    let stats = pool.stats();
    assert_eq!(stats.pool_misses, 1, "第二次取出应命中自由链表");
}

/// 首次取出必然未命中并触发分配。
#[test]
fn first_take_misses_free_list() {
    let pool = SegmentPool::new(64, 4);
    let _segment = pool.take();
    let stats = pool.stats();
    assert_eq!(stats.total_takes, 1);
    assert_eq!(stats.pool_misses, 1);
    assert_eq!(stats.active, 1);
}

/// 超出容量上限的归还被丢弃，内存占用保持有界。
#[test]
fn overflow_returns_are_discarded() {
    let pool = SegmentPool::new(32, 1);
    let first = pool.take();
    let second = pool.take();
    drop(first);
    drop(second);
    let stats = pool.stats();
    assert_eq!(stats.cached, 1, "链表只缓存容量上限内的段");
    assert_eq!(stats.discarded, 1, "超限归还应计入丢弃");
    assert_eq!(stats.total_recycled, 2);
}

/// 并发取还不破坏统计配平，且没有段被归还两次。
#[test]
fn concurrent_take_and_return_stays_balanced() {
    use std::sync::Arc;

    let pool = Arc::new(SegmentPool::new(64, 16));
    let mut workers = Vec::new();
    for _ in 0..8 {
        let pool = Arc::clone(&pool);
        workers.push(std::thread::spawn(move || {
            for _ in 0..200 {
                let mut segment = pool.take();
                segment.data_mut().extend_from_slice(&[0u8; 16]);
            }
        }));
    }
    for worker in workers {
        worker.join().expect("工作线程崩溃");
    }
    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.total_takes, 8 * 200);
    assert_eq!(
        stats.total_recycled, 8 * 200,
        "每次取出必须恰好对应一次归还"
    );
}
