use crate::error::{OperationKind, cancelled_error, map_io_error, timeout_error};
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

/// 在保留取消/截止语义的前提下执行一次 IO Future。
///
/// # 契约说明（What）
/// - 进入时先快速检查：截止已过返回超时错误，已取消返回取消错误；
/// - 之后以 `biased` select 组合取消轮询、截止定时器与 IO Future，
///   任一信号先到即决出唯一结果；
/// - IO 失败统一经 [`map_io_error`] 映射为结构化错误。
pub(crate) async fn run_with_context<F, T>(
    ctx: &CallContext,
    kind: OperationKind,
    future: F,
) -> Result<T, AmqpError>
where
    F: Future<Output = io::Result<T>> + Send,
    T: Send,
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
            result = &mut future => result.map_err(|err| map_io_error(kind, err)),
        }
    } else {
        tokio::select! {
            biased;
            _ = &mut cancel => Err(cancelled_error(kind)),
            result = &mut future => result.map_err(|err| map_io_error(kind, err)),
        }
    }
}
