use amqp_buffer::SegmentPool;
use std::time::Duration;

/// 活跃档位对应的缓冲尺寸（8 KiB）。
pub const ACTIVE_BUFFER_SIZE: usize = 8 * 1024;

/// 繁忙档位对应的缓冲尺寸（64 KiB）。
pub const BUSY_BUFFER_SIZE: usize = 64 * 1024;

/// TCP 通道配置：缓冲档位尺寸、套接字选项与注入的段池。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 将"档位 → 缓冲尺寸"的映射、套接字选项与段池注入集中到一个
///   只读对象，通道与监听器按值克隆后不再回头读取外部状态；
/// - 段池作为显式注入的共享资源在此传递，多个通道（以及监听器接受的
///   全部连接）共享同一个有界池。
///
/// ## 契约（What）
/// - 构造后只读；`with_*` 方法以消费式链式调用覆盖默认值；
/// - `buffer_size_for`：档位到缓冲尺寸的映射，空闲档位即段池的段尺寸。
/// 监听积压队列的默认长度。
pub const DEFAULT_BACKLOG: u32 = 128;

#[derive(Clone, Debug)]
pub struct TcpSettings {
    nodelay: bool,
    backlog: u32,
    active_buffer_size: usize,
    busy_buffer_size: usize,
    tracker_window: Duration,
    segment_pool: SegmentPool,
}

impl TcpSettings {
    /// 使用默认值构造配置。
    pub fn new() -> Self {
        Self::default()
    }

    /// 覆盖 `TCP_NODELAY`（默认开启：协商与帧流量对延迟敏感）。
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// 覆盖监听积压队列长度，仅对监听器生效。
    pub fn with_backlog(mut self, backlog: u32) -> Self {
        self.backlog = backlog;
        self
    }

    /// 覆盖活跃档位缓冲尺寸。
    pub fn with_active_buffer_size(mut self, size: usize) -> Self {
        self.active_buffer_size = size;
        self
    }

    /// 覆盖繁忙档位缓冲尺寸。
    pub fn with_busy_buffer_size(mut self, size: usize) -> Self {
        self.busy_buffer_size = size;
        self
    }

    /// 覆盖流量窗口时长。
    pub fn with_tracker_window(mut self, window: Duration) -> Self {
        self.tracker_window = window;
        self
    }

    /// 注入共享段池。
    pub fn with_segment_pool(mut self, pool: SegmentPool) -> Self {
        self.segment_pool = pool;
        self
    }

    /// 是否开启 `TCP_NODELAY`。
    pub fn nodelay(&self) -> bool {
        self.nodelay
    }

    /// 监听积压队列长度。
    pub fn backlog(&self) -> u32 {
        self.backlog
    }

    /// 流量窗口时长。
    pub fn tracker_window(&self) -> Duration {
        self.tracker_window
    }

    /// 共享段池。
    pub fn segment_pool(&self) -> &SegmentPool {
        &self.segment_pool
    }

    /// 档位到缓冲尺寸的映射。
    pub fn buffer_size_for(&self, level: amqp_buffer::BufferLevel) -> usize {
        match level {
            amqp_buffer::BufferLevel::Idle => self.segment_pool.segment_size(),
            amqp_buffer::BufferLevel::Active => self.active_buffer_size,
            amqp_buffer::BufferLevel::Busy => self.busy_buffer_size,
        }
    }
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            nodelay: true,
            backlog: DEFAULT_BACKLOG,
            active_buffer_size: ACTIVE_BUFFER_SIZE,
            busy_buffer_size: BUSY_BUFFER_SIZE,
            tracker_window: amqp_buffer::DEFAULT_WINDOW,
            segment_pool: SegmentPool::default(),
        }
    }
}
