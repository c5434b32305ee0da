use amqp_core::time::MonotonicTimePoint;
use core::time::Duration;

/// 自适应缓冲档位。
///
/// 档位只描述流量强度；档位到缓冲尺寸（池化小段 / 8 KiB / 64 KiB）的
/// 映射由各传输实现的配置决定。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BufferLevel {
    /// 空闲：窗口累计接近于零，仅有心跳级流量。
    Idle,
    /// 活跃：窗口累计达到活跃阈值。
    Active,
    /// 繁忙：窗口累计达到繁忙阈值。
    Busy,
}

impl BufferLevel {
    /// 朝目标档位移动一步。
    fn step_toward(self, target: BufferLevel) -> BufferLevel {
        use BufferLevel::*;
        match (self, target) {
            (Idle, Active) | (Idle, Busy) => Active,
            (Active, Busy) => Busy,
            (Busy, Active) | (Busy, Idle) => Active,
            (Active, Idle) => Idle,
            _ => self,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Trend {
    Up,
    Down,
}

/// 窗口累计达到该值即视为活跃（约 8 KiB）。
pub const ACTIVE_THRESHOLD: u64 = 8 * 1024;

/// 窗口累计达到该值即视为繁忙（约 4 MiB）。
pub const BUSY_THRESHOLD: u64 = 4 * 1024 * 1024;

/// 默认单位尺寸：与段池的默认段尺寸一致。
pub const DEFAULT_UNIT_SIZE: u64 = 512;

/// 默认窗口时长。
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(2);

/// `BufferSizeTracker` 按固定时长窗口度量单方向流量并给出档位决策。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 调整内核套接字缓冲（`SO_RCVBUF`/`SO_SNDBUF`）代价不低，不能随单个
///   窗口的毛刺抖动；跟踪器以迟滞（连续两个同向窗口才推进一档）换取
///   档位的稳定性；
/// - 每次操作以 `max(本次字节数, 单位尺寸)` 计入累计：高频小操作不会
///   因字节数小而被误判为空闲。
///
/// ## 逻辑（How）
/// - `record(now, bytes)` 累计当前窗口；跨过窗口边界时将累计值按
///   [`ACTIVE_THRESHOLD`]/[`BUSY_THRESHOLD`] 归类为目标档位，与当前档位
///   比较得出趋势方向；
/// - 趋势与上一窗口方向一致时，档位朝目标移动恰好一步并清空趋势记录；
///   方向首次出现或与上一窗口相反时仅记录，不动档位；
/// - 每次 `record` 至多结算一个窗口边界。
///
/// ## 契约（What）
/// - **前置条件**：每方向独占一个实例，时间点单调且同源；
/// - **后置条件**：返回 `Some(level)` 当且仅当档位在本次调用中变化，
///   且变化幅度恰好一档。
#[derive(Debug)]
pub struct BufferSizeTracker {
    unit_size: u64,
    window: Duration,
    window_start: Option<MonotonicTimePoint>,
    accumulated: u64,
    level: BufferLevel,
    pending_trend: Option<Trend>,
}

impl BufferSizeTracker {
    /// 以指定单位尺寸与窗口时长创建跟踪器，初始档位为 [`BufferLevel::Idle`]。
    pub fn new(unit_size: u64, window: Duration) -> Self {
        Self {
            unit_size,
            window,
            window_start: None,
            accumulated: 0,
            level: BufferLevel::Idle,
            pending_trend: None,
        }
    }

    /// 当前档位。
    pub fn level(&self) -> BufferLevel {
        self.level
    }

    /// 记录一次操作；若档位在本次调用中变化则返回新档位。
    pub fn record(&mut self, now: MonotonicTimePoint, bytes: u64) -> Option<BufferLevel> {
        let start = *self.window_start.get_or_insert(now);
        self.accumulated = self.accumulated.saturating_add(bytes.max(self.unit_size));

        if now.saturating_duration_since(start) < self.window {
            return None;
        }

        let target = classify(self.accumulated);
        self.window_start = Some(now);
        self.accumulated = 0;

        let trend = match target.cmp(&self.level) {
            core::cmp::Ordering::Greater => Trend::Up,
            core::cmp::Ordering::Less => Trend::Down,
            core::cmp::Ordering::Equal => {
                self.pending_trend = None;
                return None;
            }
        };

        if self.pending_trend == Some(trend) {
            self.pending_trend = None;
            self.level = self.level.step_toward(target);
            Some(self.level)
        } else {
            self.pending_trend = Some(trend);
            None
        }
    }
}

impl Default for BufferSizeTracker {
    fn default() -> Self {
        Self::new(DEFAULT_UNIT_SIZE, DEFAULT_WINDOW)
    }
}

fn classify(accumulated: u64) -> BufferLevel {
    if accumulated >= BUSY_THRESHOLD {
        BufferLevel::Busy
    } else if accumulated >= ACTIVE_THRESHOLD {
        BufferLevel::Active
    } else {
        BufferLevel::Idle
    }
}
