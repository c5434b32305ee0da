use crate::pool::PoolInner;
use bytes::BytesMut;
use std::sync::Arc;

/// 池化小段：从 [`SegmentPool`](crate::SegmentPool) 取出的可复用缓冲。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 读路径在 Idle 档位以同一个段承接套接字读取，并从未消费的余量中
///   继续服务后续逻辑读取；段的生命周期因此跨越多次操作，必须保证
///   无论正常耗尽、中止还是通道释放，都恰好归还一次。
///
/// ## 逻辑（How）
/// - 内部以 `Option<BytesMut>` 持有数据，Drop 时 `take` 出并交还池；
///   `Option` 的一次性取出从类型上排除了双重归还；
/// - `recycle` 在段被完全消费后复位写入位置：`BytesMut::reserve` 在
///   长度为零且引用唯一时会回收头部空间，使段可原地重用。
///
/// ## 契约（What）
/// - **前置条件**：段仅在单一方向状态内使用，不跨线程共享可变引用；
/// - **后置条件**：Drop 后段内存回到池（或因池满被丢弃），绝不泄漏。
#[derive(Debug)]
pub struct PooledSegment {
    data: Option<BytesMut>,
    pool: Arc<PoolInner>,
}

impl PooledSegment {
    pub(crate) fn new(data: BytesMut, pool: Arc<PoolInner>) -> Self {
        Self {
            data: Some(data),
            pool,
        }
    }

    /// 只读访问段内未消费的数据。
    pub fn data(&self) -> &BytesMut {
        self.data.as_ref().expect("segment already returned")
    }

    /// 可变访问，供套接字读取追加字节或消费方推进游标。
    pub fn data_mut(&mut self) -> &mut BytesMut {
        self.data.as_mut().expect("segment already returned")
    }

    /// 未消费的字节数。
    pub fn remaining(&self) -> usize {
        self.data().len()
    }

    /// 段完全消费后复位写入位置，准备承接下一次套接字读取。
    pub fn recycle(&mut self) {
        let size = self.pool.segment_size();
        let data = self.data_mut();
        debug_assert!(data.is_empty(), "recycle requires a fully consumed segment");
        data.clear();
        data.reserve(size);
    }
}

impl Drop for PooledSegment {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            self.pool.restore(data);
        }
    }
}

