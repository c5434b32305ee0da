use crate::error::{OperationKind, cancelled_error, timeout_error};
use amqp_core::contract::{CallContext, Cancellation};
use amqp_core::error::AmqpError;
use amqp_core::time::{deadline_as_instant, deadline_expired};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::time::Instant as TokioInstant;

const CANCELLATION_POLL_INTERVAL: Duration = Duration::from_millis(5);

async fn wait_for_cancellation(cancellation: &Cancellation) {
    while !cancellation.is_cancelled() {
        tokio::time::sleep(CANCELLATION_POLL_INTERVAL).await;
    }
}

/// 在保留取消/截止语义的前提下执行一次 TLS IO Future。
///
/// 与 TCP 层的同名工具结构一致；错误映射以参数注入，握手与读写阶段
/// 使用不同的归类策略。
pub(crate) async fn run_with_context<F, T, M>(
    ctx: &CallContext,
    kind: OperationKind,
    future: F,
    mapper: M,
) -> Result<T, AmqpError>
where
    F: Future<Output = io::Result<T>> + Send,
    T: Send,
    M: Fn(OperationKind, io::Error) -> AmqpError,
{
    if deadline_expired(ctx.deadline()) {
        return Err(timeout_error(kind));
    }
    if ctx.cancellation().is_cancelled() {
        return Err(cancelled_error(kind));
    }

    let cancel = wait_for_cancellation(ctx.cancellation());
    tokio::pin!(cancel);
    tokio::pin!(future);

    if let Some(deadline) = deadline_as_instant(ctx.deadline()) {
        let sleep = tokio::time::sleep_until(TokioInstant::from_std(deadline));
        tokio::pin!(sleep);
        tokio::select! {
            biased;
            _ = &mut cancel => Err(cancelled_error(kind)),
            _ = &mut sleep => Err(timeout_error(kind)),
            result = &mut future => result.map_err(|err| mapper(kind, err)),
        }
    } else {
        tokio::select! {
            biased;
            _ = &mut cancel => Err(cancelled_error(kind)),
            result = &mut future => result.map_err(|err| mapper(kind, err)),
        }
    }
}
