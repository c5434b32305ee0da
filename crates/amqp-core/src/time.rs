use core::time::Duration;

/// `MonotonicTimePoint` 以相对刻度表达单调时钟读数。
///
/// # 设计背景（Why）
/// - `std::time::Instant` 在 `no_std` 场景不可用；以"自进程基准以来的偏移量"
///   表示时间点，可让截止时间运算在任意环境下保持一致语义。
///
/// # 契约说明（What）
/// - **前置条件**：参与比较的时间点必须来自同一计时来源；
/// - **后置条件**：所有运算饱和处理，不会回绕或 panic。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicTimePoint(Duration);

impl MonotonicTimePoint {
    /// 根据基准以来的偏移量构造时间点。
    pub const fn from_offset(offset: Duration) -> Self {
        MonotonicTimePoint(offset)
    }

    /// 返回自基准以来的偏移量。
    pub const fn as_duration(&self) -> Duration {
        self.0
    }

    /// 计算两个时间点的饱和差值。
    pub fn saturating_duration_since(&self, earlier: MonotonicTimePoint) -> Duration {
        self.0.checked_sub(earlier.0).unwrap_or(Duration::ZERO)
    }

    /// 在当前时间点上叠加偏移。
    pub fn saturating_add(&self, delta: Duration) -> MonotonicTimePoint {
        MonotonicTimePoint(self.0.saturating_add(delta))
    }
}

#[cfg(feature = "std")]
mod clock {
    use super::MonotonicTimePoint;
    use crate::contract::Deadline;
    use core::time::Duration;
    use std::sync::OnceLock;
    use std::time::Instant;

    /// 进程级单调时钟基准。首次取样即固定，保证全部时间点同源。
    pub(crate) fn monotonic_base() -> Instant {
        static BASE: OnceLock<Instant> = OnceLock::new();
        *BASE.get_or_init(Instant::now)
    }

    /// 取当前单调时间点，供 [`Deadline`] 比较使用。
    pub fn monotonic_now() -> MonotonicTimePoint {
        MonotonicTimePoint::from_offset(Instant::now().duration_since(monotonic_base()))
    }

    /// 判断截止时间是否已经过期。
    pub fn deadline_expired(deadline: Deadline) -> bool {
        match deadline.instant() {
            Some(target) => target <= monotonic_now(),
            None => false,
        }
    }

    /// 计算距离截止时间的剩余时长；未设置截止时返回 `None`。
    pub fn deadline_remaining(deadline: Deadline) -> Option<Duration> {
        deadline
            .instant()
            .map(|instant| instant.saturating_duration_since(monotonic_now()))
    }

    /// 将截止时间换算为 `std::time::Instant`，供 Tokio 定时器消费。
    pub fn deadline_as_instant(deadline: Deadline) -> Option<Instant> {
        deadline
            .instant()
            .map(|instant| monotonic_base() + instant.as_duration())
    }
}

#[cfg(feature = "std")]
pub use clock::{deadline_as_instant, deadline_expired, deadline_remaining, monotonic_now};

#[cfg(test)]
mod tests {
    use super::*;

    /// 差值运算在时序颠倒时必须饱和为零，而非回绕。
    #[test]
    fn duration_since_saturates() {
        let earlier = MonotonicTimePoint::from_offset(Duration::from_secs(1));
        let later = MonotonicTimePoint::from_offset(Duration::from_secs(3));
        assert_eq!(
            later.saturating_duration_since(earlier),
            Duration::from_secs(2)
        );
        assert_eq!(earlier.saturating_duration_since(later), Duration::ZERO);
    }

    #[cfg(feature = "std")]
    #[test]
    fn clock_is_monotonic() {
        let first = monotonic_now();
        let second = monotonic_now();
        assert!(second >= first);
    }
}
