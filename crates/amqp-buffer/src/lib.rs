#![deny(unsafe_code)]
#![allow(clippy::result_large_err)]
#![doc = r#"
# amqp-buffer

## 设计动机（Why）
- **定位**：为 TCP 传输层提供两件缓冲治理积木——空闲流量复用的小段
  缓冲池，与按流量自适应调整缓冲档位的跟踪器；
- **架构角色**：位于传输实现之下、核心契约之上；不触碰套接字，只管理
  内存与档位决策，因而可以在无 I/O 的单元测试中完整验证。

## 核心契约（What）
- [`SegmentPool`]：有界的固定尺寸段池，原子取还，取出的段经由 RAII
  恰好归还一次（包括中止与释放路径）；
- [`BufferSizeTracker`]：固定时长滚动窗口，按 `max(本次字节数, 单位尺寸)`
  累计，窗口边界以迟滞（连续两个同向窗口）推进档位，每次恰好一档。

## 实现策略（How）
- 自由链表以 `parking_lot::Mutex<Vec<BytesMut>>` 承载，锁内只做指针
  进出，不跨越任何 I/O；
- 统计以原子计数累积，快照读取无需停表；
- 跟踪器不自带时钟，时间点由调用方注入，保证档位逻辑可确定性复验。

## 风险与考量（Trade-offs）
- 池上限之外的归还直接丢弃段内存，以牺牲复用率换取内存上界；
- 跟踪器一次 `record` 至多结算一个窗口边界；长时间无操作的静默期
  不会自发降档，由下一次操作触发结算。
"#]

mod pool;
mod segment;
mod tracker;

pub use pool::{DEFAULT_POOL_CAPACITY, DEFAULT_SEGMENT_SIZE, PoolStats, SegmentPool};
pub use segment::PooledSegment;
pub use tracker::{
    ACTIVE_THRESHOLD, BUSY_THRESHOLD, BufferLevel, BufferSizeTracker, DEFAULT_UNIT_SIZE,
    DEFAULT_WINDOW,
};
