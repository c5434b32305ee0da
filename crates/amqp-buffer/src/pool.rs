use crate::segment::PooledSegment;
use bytes::BytesMut;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 默认段尺寸：覆盖空闲/心跳流量的典型读取（如 4 字节帧长前缀）。
pub const DEFAULT_SEGMENT_SIZE: usize = 512;

/// 默认缓存上限：自由链表最多保留的段数。
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// `SegmentPool` 提供固定尺寸小段的有界复用池。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 空闲连接的读取多为数字节的帧长前缀；若每次读取都分配新缓冲，
///   心跳流量会制造持续的分配压力。段池让档位为 Idle 的读路径复用
///   同一批小段；
/// - 池是传输内核中唯一全局共享的可变资源，因而设计为显式注入的
///   有界对象，而非进程级静态变量。
///
/// ## 逻辑（How）
/// - 自由链表为 `Mutex<Vec<BytesMut>>`，`take` 弹出或新分配，归还时
///   推回；锁的临界区只含指针操作，绝不跨越 I/O；
/// - [`PooledSegment`] 在 Drop 中归还，内部以 `Option` 取走数据保证
///   恰好一次；超出容量上限的归还直接丢弃段内存。
///
/// ## 契约（What）
/// - **后置条件**：`take` 返回的段容量不小于 `segment_size`，内容为空；
///   每个取出的段恰好归还一次，包括中止/释放路径；
/// - **线程安全**：`Clone` 共享同一内部状态，可跨任务自由传递。
#[derive(Clone, Debug)]
pub struct SegmentPool {
    inner: Arc<PoolInner>,
}

#[derive(Debug)]
pub(crate) struct PoolInner {
    segment_size: usize,
    capacity: usize,
    free: Mutex<Vec<BytesMut>>,
    metrics: PoolMetrics,
}

#[derive(Debug, Default)]
struct PoolMetrics {
    active: AtomicUsize,
    total_takes: AtomicUsize,
    pool_misses: AtomicUsize,
    total_recycled: AtomicUsize,
    discarded: AtomicUsize,
}

/// 池统计快照，供观测与测试断言。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    /// 段尺寸。
    pub segment_size: usize,
    /// 自由链表当前缓存的段数。
    pub cached: usize,
    /// 在外流通的段数。
    pub active: usize,
    /// 累计取出次数。
    pub total_takes: usize,
    /// 自由链表未命中（触发新分配）的次数。
    pub pool_misses: usize,
    /// 累计归还次数。
    pub total_recycled: usize,
    /// 因超出容量上限被丢弃的段数。
    pub discarded: usize,
}

impl SegmentPool {
    /// 以指定段尺寸与缓存上限创建池。
    pub fn new(segment_size: usize, capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                segment_size,
                capacity,
                free: Mutex::new(Vec::new()),
                metrics: PoolMetrics::default(),
            }),
        }
    }

    /// 段尺寸。
    pub fn segment_size(&self) -> usize {
        self.inner.segment_size
    }

    /// 取出一个空段；链表命中则复用，否则新分配。
    pub fn take(&self) -> PooledSegment {
        self.inner.metrics.total_takes.fetch_add(1, Ordering::Relaxed);
        let data = {
            let mut free = self.inner.free.lock();
            free.pop()
        };
        let data = match data {
            Some(segment) => segment,
            None => {
                self.inner.metrics.pool_misses.fetch_add(1, Ordering::Relaxed);
                BytesMut::with_capacity(self.inner.segment_size)
            }
        };
        self.inner.metrics.active.fetch_add(1, Ordering::Relaxed);
        PooledSegment::new(data, Arc::clone(&self.inner))
    }

    /// 读取统计快照。
    pub fn stats(&self) -> PoolStats {
        let cached = self.inner.free.lock().len();
        PoolStats {
            segment_size: self.inner.segment_size,
            cached,
            active: self.inner.metrics.active.load(Ordering::Relaxed),
            total_takes: self.inner.metrics.total_takes.load(Ordering::Relaxed),
            pool_misses: self.inner.metrics.pool_misses.load(Ordering::Relaxed),
            total_recycled: self.inner.metrics.total_recycled.load(Ordering::Relaxed),
            discarded: self.inner.metrics.discarded.load(Ordering::Relaxed),
        }
    }
}

impl Default for SegmentPool {
    fn default() -> Self {
        Self::new(DEFAULT_SEGMENT_SIZE, DEFAULT_POOL_CAPACITY)
    }
}

impl PoolInner {
    pub(crate) fn segment_size(&self) -> usize {
        self.segment_size
    }

    /// 段的归还入口，仅由 [`PooledSegment`] 的 Drop 调用。
    pub(crate) fn restore(&self, mut data: BytesMut) {
        self.metrics.active.fetch_sub(1, Ordering::Relaxed);
        self.metrics.total_recycled.fetch_add(1, Ordering::Relaxed);
        data.clear();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(data);
        } else {
            drop(free);
            self.metrics.discarded.fetch_add(1, Ordering::Relaxed);
        }
    }
}
