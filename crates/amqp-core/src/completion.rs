use crate::error::{AmqpError, ErrorCategory};
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// 一次逻辑操作的完成方式。
///
/// - `Synchronous`：结果在发起调用返回之前就已就绪，由发起方就地交付，
///   完成方不得再次通知；
/// - `Asynchronous`：发起调用已经以 pending 返回，通知责任落在完成方。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompletionMode {
    /// 发起调用返回前完成。
    Synchronous,
    /// 发起调用返回后由完成方通知。
    Asynchronous,
}

/// 发起方声明"即将以 pending 返回"时观察到的状态。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetachOutcome {
    /// 子操作尚未完成，后续通知由完成方负责。
    Pending,
    /// 子操作已在调用栈内完成，结果由发起方就地交付。
    AlreadyCompleted,
}

const ENGAGED: u8 = 0;
const DETACHED: u8 = 1;
const COMPLETED: u8 = 2;
const SETTLED: u8 = 3;

/// 完成闸门：在"发起调用的同步返回路径"与"子操作的异步完成路径"之间
/// 裁定唯一的通知责任方。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 当一次操作派生出子操作时，子操作可能在发起调用仍在栈上时就完成
///   （同步完成），也可能在发起调用返回 pending 之后从任意线程完成；
///   若双方各自通知下一层，回调会被触发两次，若双方互相谦让则一次也
///   不会触发。该闸门用一次原子交换记录"哪个执行上下文仍然活跃"，
///   使恰好一方承担通知责任；
/// - 即便操作已被统一为单个 Future，这一契约仍需显式成立并可测试：
///   监听器的关停路径与握手任务、中止路径与在途读写，仍会从不同线程
///   竞争同一次终态交付。
///
/// ## 逻辑（How）
/// - 状态机四态：`ENGAGED`（双方都活跃）→ `DETACHED`（发起方已返回
///   pending）或 `COMPLETED`（完成方先到达）→ `SETTLED`（双方均已到达，
///   责任已裁定）；
/// - `complete`：CAS `ENGAGED→COMPLETED` 成功即为同步完成（发起方交付）；
///   CAS `DETACHED→SETTLED` 成功即为异步完成（完成方通知）；
/// - `detach`：CAS `ENGAGED→DETACHED` 成功表示操作仍在途；若观察到
///   `COMPLETED` 则转入 `SETTLED` 并告知发起方就地交付。
///
/// ## 契约（What）
/// - **后置条件**：对一个闸门，`complete` 恰好成功一次，且
///   `CompletionMode` 与 `DetachOutcome` 的组合保证恰好一方交付终态；
/// - 重复的 `complete`/`detach` 返回 `Fatal` 分类错误——这是实现缺陷，
///   不允许吞掉。
#[derive(Debug)]
pub struct CompletionGate {
    state: AtomicU8,
}

impl CompletionGate {
    /// 创建处于"双方活跃"状态的闸门。
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ENGAGED),
        }
    }

    /// 完成方到达。返回值指示通知责任归属；重复完成返回 `Fatal` 错误。
    pub fn complete(&self) -> Result<CompletionMode, AmqpError> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let (target, mode) = match current {
                ENGAGED => (COMPLETED, CompletionMode::Synchronous),
                DETACHED => (SETTLED, CompletionMode::Asynchronous),
                _ => return Err(reentry_error("complete")),
            };
            match self.state.compare_exchange_weak(
                current,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(mode),
                Err(observed) => current = observed,
            }
        }
    }

    /// 发起方声明即将返回 pending。重复声明返回 `Fatal` 错误。
    pub fn detach(&self) -> Result<DetachOutcome, AmqpError> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let (target, outcome) = match current {
                ENGAGED => (DETACHED, DetachOutcome::Pending),
                COMPLETED => (SETTLED, DetachOutcome::AlreadyCompleted),
                _ => return Err(reentry_error("detach")),
            };
            match self.state.compare_exchange_weak(
                current,
                target,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(outcome),
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}

fn reentry_error(op: &'static str) -> AmqpError {
    AmqpError::new(
        "amqp.core.completion_reentry",
        alloc::format!("completion gate {op} invoked twice"),
    )
    .with_category(ErrorCategory::Fatal)
}

/// 关闭闸门：把"关闭恰好执行一次、重复关闭为空操作"的契约收敛为一个原子位。
///
/// 传输层的优雅关闭与中止可能从任意线程并发触发；首个调用方获得执行
/// 关闭动作的资格，其余调用方立即返回。
#[derive(Debug, Default)]
pub struct CloseGate {
    closed: AtomicBool,
}

impl CloseGate {
    /// 创建未关闭的闸门。
    pub const fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
        }
    }

    /// 争夺关闭资格。返回 `true` 表示本调用方执行关闭动作。
    pub fn begin_close(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 查询是否已进入关闭状态。
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// 方向闸门被拒绝的原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateRejection {
    /// 同方向已有操作在途。
    AlreadyInFlight,
    /// 所属传输层已被释放。
    Disposed,
}

const IDLE: u8 = 0;
const BUSY: u8 = 1;
const DISPOSED: u8 = 2;

/// 方向闸门：强制"每层每方向至多一个在途操作"的并发契约。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 读与写各自持有可复用的方向状态（读缓存、合并缓冲、池化段）；并发
///   重入会破坏这些状态，必须在入口处以结构化错误拒绝，而不是 panic
///   或在异步边界另一侧抛出；
/// - 释放后的操作（disposed misuse）同样在此拦截。
///
/// ## 逻辑（How）
/// - 三态原子：`IDLE→BUSY`（获准）；`BUSY` 期间的再次进入被拒；
///   `dispose` 将状态置为 `DISPOSED`，此后所有进入请求被拒；
/// - [`DirectionPermit`] 以 RAII 在 Drop 时将 `BUSY` 恢复为 `IDLE`，
///   若期间已被释放则保持 `DISPOSED` 不变。
#[derive(Debug)]
pub struct DirectionGate {
    state: AtomicU8,
}

impl DirectionGate {
    /// 创建空闲闸门。
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
        }
    }

    /// 尝试获得本方向的操作许可。
    pub fn begin(&self) -> Result<DirectionPermit<'_>, GateRejection> {
        match self
            .state
            .compare_exchange(IDLE, BUSY, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(DirectionPermit { gate: self }),
            Err(BUSY) => Err(GateRejection::AlreadyInFlight),
            Err(_) => Err(GateRejection::Disposed),
        }
    }

    /// 永久关闭本方向。返回关闭时是否有操作在途。
    pub fn dispose(&self) -> bool {
        self.state.swap(DISPOSED, Ordering::AcqRel) == BUSY
    }

    /// 查询是否已释放。
    pub fn is_disposed(&self) -> bool {
        self.state.load(Ordering::Acquire) == DISPOSED
    }
}

impl Default for DirectionGate {
    fn default() -> Self {
        Self::new()
    }
}

/// 方向操作许可，Drop 时释放在途标记。
#[derive(Debug)]
pub struct DirectionPermit<'a> {
    gate: &'a DirectionGate,
}

impl Drop for DirectionPermit<'_> {
    fn drop(&mut self) {
        // 释放路径可能与 dispose 竞争；此处仅在仍为 BUSY 时恢复 IDLE。
        let _ = self
            .gate
            .state
            .compare_exchange(BUSY, IDLE, Ordering::AcqRel, Ordering::Acquire);
    }
}
