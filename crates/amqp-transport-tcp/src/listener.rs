use crate::{
    TcpChannel,
    error::{self, map_io_error},
    settings::TcpSettings,
    util::run_with_context,
};
use amqp_core::contract::CallContext;
use amqp_core::error::AmqpError;
use amqp_transport::TransportSocketAddr;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener as TokioTcpListener;

/// 对 Tokio `TcpListener` 的语义封装。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 在不暴露 Tokio 具体类型的前提下提供"监听 → 接受连接"的最小能力，
///   让协商引擎以统一契约管理生命周期与错误分类；
/// - `accept` 继承 [`CallContext`] 的取消与截止语义，监听循环可随
///   宿主缩容迅速退出。
///
/// ## 逻辑 (How)
/// - `bind`：转换结构化地址后调用 Tokio 绑定，同时缓存将应用到每条
///   新连接的 [`TcpSettings`]；
/// - `accept`：经内部工具函数注入取消/超时，成功后把底层连接包装为
///   [`TcpChannel`]，套接字选项与缓冲初始化在包装时一次完成。
///
/// ## 契约 (What)
/// - **前置条件**：必须在 Tokio 运行时中使用；
/// - **后置条件**：`accept` 返回的通道已带本地/对端地址并可立即读写；
/// - **错误语义**：绑定/接受失败返回带稳定错误码的 [`AmqpError`]，
///   监听器自身保持可用。
#[derive(Debug)]
pub struct TcpListener {
    inner: TokioTcpListener,
    local_addr: TransportSocketAddr,
    settings: TcpSettings,
}

impl TcpListener {
    /// 绑定到指定地址，新连接应用默认配置。
    pub async fn bind(addr: TransportSocketAddr) -> Result<Self, AmqpError> {
        Self::bind_with_settings(addr, TcpSettings::default()).await
    }

    /// 绑定到指定地址并指定新连接的默认配置。
    ///
    /// 监听套接字经 `socket2` 装配，以落实配置中的积压队列长度。
    pub async fn bind_with_settings(
        addr: TransportSocketAddr,
        settings: TcpSettings,
    ) -> Result<Self, AmqpError> {
        let std_addr = addr.to_std();
        let socket = Socket::new(Domain::for_address(std_addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|err| map_io_error(error::BIND, err))?;
        socket
            .set_nonblocking(true)
            .map_err(|err| map_io_error(error::BIND, err))?;
        socket
            .bind(&std_addr.into())
            .map_err(|err| map_io_error(error::BIND, err))?;
        socket
            .listen(settings.backlog() as i32)
            .map_err(|err| map_io_error(error::BIND, err))?;
        let listener = TokioTcpListener::from_std(socket.into())
            .map_err(|err| map_io_error(error::BIND, err))?;
        let local = listener
            .local_addr()
            .map_err(|err| map_io_error(error::BIND, err))?;
        Ok(Self {
            inner: listener,
            local_addr: TransportSocketAddr::from(local),
            settings,
        })
    }

    /// 监听器实际绑定的地址。
    pub fn local_addr(&self) -> TransportSocketAddr {
        self.local_addr
    }

    /// 新连接继承的默认配置。
    pub fn settings(&self) -> &TcpSettings {
        &self.settings
    }

    /// 接受一个入站连接，遵循上下文的取消/截止语义。
    pub async fn accept(
        &self,
        ctx: &CallContext,
    ) -> Result<(TcpChannel, TransportSocketAddr), AmqpError> {
        let (stream, remote) = run_with_context(ctx, error::ACCEPT, self.inner.accept()).await?;
        let peer_addr = TransportSocketAddr::from(remote);
        let channel = TcpChannel::from_parts(stream, self.settings.clone())?;
        Ok((channel, peer_addr))
    }
}
