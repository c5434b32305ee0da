use crate::time::MonotonicTimePoint;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

/// 取消原语，统一表达跨层的可中断性契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 协商过程可能跨越多个网络往返，监听器缩容、客户端放弃连接时必须能够
///   立即打断仍在等待对端字节的任何一步；
/// - 以共享原子位实现最小可行解，避免对运行时的回调注册能力产生依赖。
///
/// ## 逻辑（How）
/// - 内部为 `Arc<AtomicBool>`；`cancel` 通过 CAS 保证"首次取消"只被一个
///   调用方观察到；`child` 派生共享同一原子位的令牌，向下游传播取消语义。
///
/// ## 契约（What）
/// - **前置条件**：无；构造后处于"未取消"状态；
/// - **后置条件**：`cancel` 成功后 `is_cancelled` 对所有持有者全局可见，
///   正在进行的 I/O 应在下一个检查点尽快退出。
///
/// ## 注意事项（Trade-offs）
/// - 未提供唤醒回调，等待方需要轮询或将取消检查编入 select 循环；
///   响应延迟由轮询间隔决定。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    /// 创建处于"未取消"状态的令牌。
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 标记取消。返回 `true` 表示本次调用首次触发取消。
    pub fn cancel(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 派生共享同一原子位的子令牌。
    pub fn child(&self) -> Self {
        self.clone()
    }
}

/// 截止原语，以单调时钟描述操作的最迟完成时间。
///
/// # 契约说明（What）
/// - 允许为空（未设置），表示调用方未施加硬超时；
/// - `with_timeout` 以当前时间点加时长生成截止点，调用方需保证 `now`
///   与后续比较来自同一计时来源；
/// - 截止到期不会自动触发取消，调用方在检测到超时后需自行收尾。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Deadline {
    instant: Option<MonotonicTimePoint>,
}

impl Deadline {
    /// 创建未设置截止时间的实例。
    pub const fn none() -> Self {
        Self { instant: None }
    }

    /// 根据绝对时间点构造截止时间。
    pub const fn at(instant: MonotonicTimePoint) -> Self {
        Self {
            instant: Some(instant),
        }
    }

    /// 基于当前时间点加持续时间生成截止时间。
    pub fn with_timeout(now: MonotonicTimePoint, timeout: Duration) -> Self {
        Self::at(now.saturating_add(timeout))
    }

    /// 返回内部时间点。
    pub const fn instant(&self) -> Option<MonotonicTimePoint> {
        self.instant
    }

    /// 判断在给定时刻是否已超时。
    pub fn is_expired(&self, now: MonotonicTimePoint) -> bool {
        match self.instant {
            Some(deadline) => now >= deadline,
            None => false,
        }
    }
}

#[derive(Debug)]
struct CallContextInner {
    cancellation: Cancellation,
    deadline: Deadline,
}

/// 调用上下文，在所有公开操作之间传递"取消 + 截止"二元组。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 发起端的整条升级链共享同一个绝对截止时间：每一步协商消耗的时间都
///   自动反映在剩余预算中，无需逐步换算相对超时；
/// - 监听端以同样的结构为每条连接派生固定握手超时，使停滞的对端无法
///   长期占用处理槽位。
///
/// ## 契约（What）
/// - `cancellation()`：取消令牌引用，I/O 循环应定期检查；
/// - `deadline()`：绝对截止时间的值拷贝；
/// - 通过 [`Arc`] 共享，克隆为常数成本，可安全跨任务传递。
///
/// ## 注意事项（Trade-offs）
/// - 上下文本身不驱动取消或超时动作；将二者织入 I/O 的职责在各传输
///   实现的工具层完成。
#[derive(Clone, Debug)]
pub struct CallContext {
    inner: Arc<CallContextInner>,
}

impl CallContext {
    /// 创建上下文构建器。
    pub fn builder() -> CallContextBuilder {
        CallContextBuilder::default()
    }

    /// 获取取消令牌。
    pub fn cancellation(&self) -> &Cancellation {
        &self.inner.cancellation
    }

    /// 查询截止时间。
    pub fn deadline(&self) -> Deadline {
        self.inner.deadline
    }

    /// 以相同取消令牌、替换后的截止时间派生子上下文。
    ///
    /// 监听端为每条入站连接设置固定握手超时时使用：父级取消仍然全局生效，
    /// 截止时间则按连接独立收紧。
    pub fn derive_with_deadline(&self, deadline: Deadline) -> CallContext {
        CallContext {
            inner: Arc::new(CallContextInner {
                cancellation: self.inner.cancellation.child(),
                deadline,
            }),
        }
    }
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.deadline().instant() {
            Some(instant) => write!(
                f,
                "CallContext{{cancelled={}, deadline={:?}}}",
                self.cancellation().is_cancelled(),
                instant.as_duration()
            ),
            None => write!(
                f,
                "CallContext{{cancelled={}, deadline=none}}",
                self.cancellation().is_cancelled()
            ),
        }
    }
}

/// `CallContext` 构建器。
#[derive(Default)]
pub struct CallContextBuilder {
    cancellation: Cancellation,
    deadline: Deadline,
}

impl CallContextBuilder {
    /// 设置取消令牌。
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// 设置截止时间。
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    /// 构建上下文。
    pub fn build(self) -> CallContext {
        CallContext {
            inner: Arc::new(CallContextInner {
                cancellation: self.cancellation,
                deadline: self.deadline,
            }),
        }
    }
}
