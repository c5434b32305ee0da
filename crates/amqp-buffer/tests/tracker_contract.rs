//! `tracker_contract` 集成测试：验证档位跟踪器的窗口归类与迟滞契约。
//!
//! # 测试目标（Why）
//! - 档位驱动代价不低的内核缓冲调整；单窗口毛刺若能改档，忙闲交替的
//!   流量会引起持续的缓冲震荡；
//! - 跟踪器的时间点由测试注入，全部断言可确定性复验。

use amqp_buffer::{BufferLevel, BufferSizeTracker};
use amqp_core::time::MonotonicTimePoint;
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(1);

fn at(secs: u64) -> MonotonicTimePoint {
    MonotonicTimePoint::from_offset(Duration::from_secs(secs))
}

/// 单个窗口跨过活跃阈值不改变档位。
#[test]
fn single_window_crossing_does_not_change_level() {
    let mut tracker = BufferSizeTracker::new(512, WINDOW);
    assert_eq!(tracker.record(at(0), 64 * 1024), None);
    // 第一个窗口边界：趋势向上，但仅记录方向。
    assert_eq!(tracker.record(at(1), 64 * 1024), None);
    assert_eq!(tracker.level(), BufferLevel::Idle);
}

/// 连续两个同向窗口使档位恰好推进一档。
#[test]
fn two_consecutive_windows_step_exactly_one_level() {
    let mut tracker = BufferSizeTracker::new(512, WINDOW);
    tracker.record(at(0), 64 * 1024);
    tracker.record(at(1), 64 * 1024);
    tracker.record(at(1), 64 * 1024);
    let changed = tracker.record(at(2), 64 * 1024);
    assert_eq!(changed, Some(BufferLevel::Active));
    assert_eq!(tracker.level(), BufferLevel::Active);
}

/// 即便窗口累计达到繁忙阈值，从空闲出发也一次只推进一档。
#[test]
fn busy_traffic_from_idle_steps_through_active() {
    let mut tracker = BufferSizeTracker::new(512, WINDOW);
    let busy = 8 * 1024 * 1024u64;
    tracker.record(at(0), busy);
    assert_eq!(tracker.record(at(1), busy), None);
    assert_eq!(tracker.record(at(2), busy), Some(BufferLevel::Active));
    assert_eq!(tracker.record(at(3), busy), None);
    assert_eq!(tracker.record(at(4), busy), Some(BufferLevel::Busy));
}

/// 方向翻转会清空迟滞记录：升-降交替的流量不改档。
#[test]
fn alternating_trend_never_changes_level() {
    let mut tracker = BufferSizeTracker::new(512, WINDOW);
    // 窗口 1：活跃流量（趋势向上）。
    tracker.record(at(0), 64 * 1024);
    assert_eq!(tracker.record(at(1), 64 * 1024), None);
    // 先推进到 Active，以便之后观察降档方向。
    assert_eq!(tracker.record(at(2), 64 * 1024), Some(BufferLevel::Active));
    // 窗口 3：空闲（趋势向下，记录）；窗口 4：活跃（目标与档位一致，清空记录）。
    assert_eq!(tracker.record(at(3), 0), None);
    assert_eq!(tracker.record(at(4), 64 * 1024), None);
    // 窗口 5：再次空闲——方向记录已被清空，仍不改档。
    assert_eq!(tracker.record(at(5), 0), None);
    assert_eq!(tracker.level(), BufferLevel::Active);
}

/// 高频小操作受单位尺寸下限保护，不被误判为空闲。
#[test]
fn unit_size_floor_keeps_chatty_traffic_active() {
    let mut tracker = BufferSizeTracker::new(512, WINDOW);
    // 每次仅 4 字节、但每窗口 32 次：按单位尺寸计入 16 KiB，高于活跃阈值。
    for window in 0..4u64 {
        for _ in 0..32 {
            tracker.record(at(window), 4);
        }
        tracker.record(at(window + 1), 4);
    }
    assert_eq!(tracker.level(), BufferLevel::Active);
}
