use alloc::borrow::Cow;
use alloc::format;
use alloc::sync::Arc;
use core::error::Error;
use core::fmt;
use core::time::Duration;

/// 跨模块传递的错误根因，要求线程安全以便在异步任务间转移。
pub type ErrorCause = Arc<dyn Error + Send + Sync + 'static>;

/// 重试建议，伴随 [`ErrorCategory::Retryable`] 指示调用方的退避节奏。
///
/// # 契约说明（What）
/// - `wait`：建议的最小等待时长，调用方可在此基础上叠加抖动；
/// - `reason`：可选的静态文案，用于日志与指标聚合。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryAdvice {
    wait: Duration,
    reason: Option<&'static str>,
}

impl RetryAdvice {
    /// 以等待时长构造建议。
    pub const fn after(wait: Duration) -> Self {
        Self { wait, reason: None }
    }

    /// 附加静态原因文案。
    pub const fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = Some(reason);
        self
    }

    /// 建议的等待时长。
    pub const fn wait(&self) -> Duration {
        self.wait
    }

    /// 可选的原因文案。
    pub const fn reason(&self) -> Option<&'static str> {
        self.reason
    }
}

/// 错误分类，驱动上层的自动化决策（重试、熔断、重连、放弃）。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 传输内核的失败形态有限而稳定：瞬时 IO 抖动、协商被拒、超时、取消、
///   调用契约被破坏、不变量失效。把它们压缩为一个闭合枚举，调用方无需
///   解析错误码字符串即可路由处理策略；
/// - 协商类失败（版本不匹配、协议不被支持、准入不达标）必须与可重试的
///   IO 故障显式区分：前者永远是终态，自动重试只会重复失败。
///
/// ## 契约（What）
/// - `Retryable`：瞬时故障，按 [`RetryAdvice`] 退避后重试；
/// - `NonRetryable`：永久性故障，重试无意义；
/// - `Timeout`：截止时间耗尽，调用方可自行决定重连策略；
/// - `Cancelled`：调用方主动取消；
/// - `Decode`：协议头或配置字节序列无法解析；
/// - `Negotiation`：协议/版本协商被拒绝，终态，不自动重试；
/// - `Security`：安全通道建立失败或准入策略不满足；
/// - `Misuse`：违反调用契约（并发重入、已释放后操作），指示调用方缺陷；
/// - `Fatal`：不变量被破坏，立即上抛，禁止包装或吞掉。
///
/// ## 注意事项（Trade-offs）
/// - `#[non_exhaustive]` 预留扩展空间，调用方匹配时必须保留兜底分支。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// 瞬时故障，建议按提示退避后重试。
    Retryable(RetryAdvice),
    /// 永久性故障。
    NonRetryable,
    /// 截止时间耗尽。
    Timeout,
    /// 调用方主动取消。
    Cancelled,
    /// 字节序列解码失败。
    Decode,
    /// 协议或版本协商被对端拒绝。
    Negotiation,
    /// 安全通道或准入校验失败。
    Security,
    /// 违反调用契约。
    Misuse,
    /// 不变量被破坏。
    Fatal,
}

/// 传输内核的统一错误类型：稳定错误码 + 分类 + 可选根因。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 为所有公开操作提供单一错误出口，避免每个 crate 自造错误枚举导致
///   调用方的匹配逻辑碎片化；
/// - 错误码采用 `amqp.<层>.<操作>_failed` 形式的稳定字符串，使运维脚本
///   与测试能够精确断言失败位置，而无需依赖文案。
///
/// ## 逻辑（How）
/// - `code` 为 `'static` 字符串常量，由各实现 crate 的 `error` 模块集中定义；
/// - `message` 允许携带运行期上下文（对端地址、字节数等）；
/// - `cause` 保留底层错误链（`io::Error`、`rustls::Error`），供诊断下钻。
///
/// ## 契约（What）
/// - **前置条件**：`code` 必须来自集中定义的常量表，禁止临时拼接；
/// - **后置条件**：`category()` 总能返回有效分类，未显式设置时为
///   [`ErrorCategory::NonRetryable`]。
#[derive(Clone, Debug)]
pub struct AmqpError {
    code: &'static str,
    message: Cow<'static, str>,
    category: ErrorCategory,
    cause: Option<ErrorCause>,
}

impl AmqpError {
    /// 以错误码与文案构造错误，默认分类为不可重试。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            category: ErrorCategory::NonRetryable,
            cause: None,
        }
    }

    /// 链式设置分类。
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = category;
        self
    }

    /// 链式附加根因。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Arc::new(cause));
        self
    }

    /// 附加已共享的根因，避免重复装箱。
    pub fn with_shared_cause(mut self, cause: ErrorCause) -> Self {
        self.cause = Some(cause);
        self
    }

    /// 稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 人类可读文案。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 错误分类。
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// 底层根因（若有）。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 判断是否为终态的协商拒绝。
    pub fn is_negotiation_rejection(&self) -> bool {
        matches!(self.category, ErrorCategory::Negotiation)
    }
}

impl fmt::Display for AmqpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (cause: {cause})")?;
        }
        Ok(())
    }
}

impl Error for AmqpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

/// 构造 `Fatal` 分类错误的快捷方式，用于不变量破坏场景。
pub fn fatal(code: &'static str, detail: impl fmt::Display) -> AmqpError {
    AmqpError::new(code, Cow::Owned(format!("invariant violated: {detail}")))
        .with_category(ErrorCategory::Fatal)
}

/// 统一的结果别名，默认错误为 [`AmqpError`]。
pub type Result<T, E = AmqpError> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    /// 验证默认分类与链式设置的覆盖行为。
    #[test]
    fn category_defaults_to_non_retryable() {
        let err = AmqpError::new("amqp.core.test", "plain");
        assert_eq!(err.category(), ErrorCategory::NonRetryable);
        let err = err.with_category(ErrorCategory::Timeout);
        assert_eq!(err.category(), ErrorCategory::Timeout);
    }

    /// 验证根因能通过 `source` 链访问。
    #[test]
    fn cause_is_exposed_through_source() {
        let inner = AmqpError::new("amqp.core.inner", "inner failure");
        let outer = AmqpError::new("amqp.core.outer", "outer failure").with_cause(inner);
        let source = Error::source(&outer).expect("应存在根因");
        assert!(source.to_string().contains("inner failure"));
    }
}
