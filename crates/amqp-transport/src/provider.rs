use crate::connection::BoxTransport;
use amqp_core::contract::CallContext;
use amqp_core::error::{AmqpError, ErrorCategory};
use amqp_core::header::{ProtocolHeader, ProtocolId, ProtocolVersion};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// 本端在协商中的角色，Provider 构造新层时据此选择握手方向。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NegotiationRole {
    /// 发起端（客户端）。
    Initiator,
    /// 监听端（服务端）。
    Listener,
}

/// Provider 工厂的显式结果，取代"返回值与入参同一即为终端"的引用判同。
///
/// # 契约说明（What）
/// - `Terminal`：协议为终端，传输层原样返回，协商完成；
/// - `Upgraded`：发生包装，新层独占旧层的字节流，协商继续；
/// - `Rejected`：Provider 主动拒绝，交还传输层由调用方关闭，`reason`
///   为终态的协商错误。
#[derive(Debug)]
pub enum UpgradeOutcome {
    /// 终端协议：协商完成。
    Terminal(BoxTransport),
    /// 升级成功：以新层继续协商。
    Upgraded(BoxTransport),
    /// Provider 拒绝升级。
    Rejected {
        /// 交还调用方关闭的传输层。
        transport: BoxTransport,
        /// 拒绝原因，终态。
        reason: AmqpError,
    },
}

/// 协议 Provider：将协议号与版本映射为（可能包装的）传输层工厂。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 把"协议号 → 升级动作"的绑定从协商引擎中拆出：引擎只驱动字节
///   交换与状态推进，每种安全分层（TLS、外部的 SASL 等）以 Provider
///   插入，互不感知；
/// - 纯工厂定位：Provider 绝不持有连接状态，同一实例可被任意多条
///   并发连接共享。
///
/// ## 契约（What）
/// - `protocol_id`/`supported_versions`/`default_version`：静态能力声明，
///   构建后不变；
/// - `is_terminal`：终端 Provider（AMQP 本体）返回 `true`，发起端据此
///   跳过头部交换，监听端据此结束升级循环；
/// - `upgrade`：执行实际的层构造；失败时入参传输层的关闭责任在调用方
///   （引擎保证"失败必关闭"），Provider 自身不得遗留半开资源。
#[async_trait]
pub trait ProtocolProvider: Send + Sync + fmt::Debug {
    /// 协议号。
    fn protocol_id(&self) -> ProtocolId;

    /// 支持的版本列表，按偏好降序。
    fn supported_versions(&self) -> &[ProtocolVersion];

    /// 默认（最优）版本。
    fn default_version(&self) -> ProtocolVersion;

    /// 是否为终端协议。
    fn is_terminal(&self) -> bool {
        false
    }

    /// 以给定角色构造新的传输层。
    async fn upgrade(
        &self,
        ctx: &CallContext,
        transport: BoxTransport,
        role: NegotiationRole,
    ) -> Result<UpgradeOutcome, AmqpError>;
}

/// `dyn ProtocolProvider` 的便捷扩展。
impl dyn ProtocolProvider {
    /// 是否支持指定版本。
    pub fn supports(&self, version: ProtocolVersion) -> bool {
        self.supported_versions().contains(&version)
    }

    /// 由协议号与默认版本构成的协议头，用于发起协商或回写拒绝。
    pub fn default_header(&self) -> ProtocolHeader {
        ProtocolHeader::new(self.protocol_id(), self.default_version())
    }
}

/// Provider 链：有序、不可变、构建后只读共享的升级序列。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 发起端按链序驱动升级，监听端以链为"可接受协议全集"做查找；
///   链构建一次、`Arc` 共享给任意多的并发发起端与处理器；
/// - 协议号到 Provider 的解析在链构建期完成校验（非空、无重复、
///   含终端），运行期查找绝不失败于配置性错误。
///
/// ## 契约（What）
/// - `providers()`：链序遍历；
/// - `lookup(id)`：按协议号查找，未配置返回 `None`；
/// - `terminal()`：链中的终端 Provider，监听端对未知协议回写其默认头部。
#[derive(Debug)]
pub struct ProviderChain {
    entries: Vec<Arc<dyn ProtocolProvider>>,
}

impl ProviderChain {
    /// 创建链构建器。
    pub fn builder() -> ProviderChainBuilder {
        ProviderChainBuilder {
            entries: Vec::new(),
        }
    }

    /// 链序的 Provider 列表。
    pub fn providers(&self) -> &[Arc<dyn ProtocolProvider>] {
        &self.entries
    }

    /// 链长。
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 链是否为空。构建器保证非空，此方法主要服务泛型代码。
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按链序索引。
    pub fn get(&self, index: usize) -> Option<&Arc<dyn ProtocolProvider>> {
        self.entries.get(index)
    }

    /// 按协议号查找 Provider。
    pub fn lookup(&self, id: ProtocolId) -> Option<&Arc<dyn ProtocolProvider>> {
        self.entries
            .iter()
            .find(|provider| provider.protocol_id() == id)
    }

    /// 链中的终端 Provider。
    pub fn terminal(&self) -> &Arc<dyn ProtocolProvider> {
        self.entries
            .iter()
            .find(|provider| provider.is_terminal())
            .expect("chain construction guarantees a terminal provider")
    }
}

/// `ProviderChain` 的构建器，在构建期完成全部配置校验。
pub struct ProviderChainBuilder {
    entries: Vec<Arc<dyn ProtocolProvider>>,
}

impl ProviderChainBuilder {
    /// 追加一个 Provider，链序即协商顺序。
    pub fn push(mut self, provider: Arc<dyn ProtocolProvider>) -> Self {
        self.entries.push(provider);
        self
    }

    /// 校验并构建链。
    ///
    /// # 错误语义
    /// - 空链、重复协议号、缺少终端 Provider 均为配置错误，以
    ///   [`ErrorCategory::NonRetryable`] 拒绝。
    pub fn build(self) -> Result<Arc<ProviderChain>, AmqpError> {
        if self.entries.is_empty() {
            return Err(AmqpError::new(
                "amqp.negotiation.empty_chain",
                "provider chain requires at least one provider",
            ));
        }
        for (index, provider) in self.entries.iter().enumerate() {
            if self.entries[..index]
                .iter()
                .any(|prior| prior.protocol_id() == provider.protocol_id())
            {
                return Err(AmqpError::new(
                    "amqp.negotiation.duplicate_provider",
                    format!(
                        "protocol {} registered more than once",
                        provider.protocol_id()
                    ),
                ));
            }
        }
        if !self.entries.iter().any(|provider| provider.is_terminal()) {
            return Err(AmqpError::new(
                "amqp.negotiation.missing_terminal",
                "provider chain requires a terminal provider",
            )
            .with_category(ErrorCategory::NonRetryable));
        }
        Ok(Arc::new(ProviderChain {
            entries: self.entries,
        }))
    }
}
