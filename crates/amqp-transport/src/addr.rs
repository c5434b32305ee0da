use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

/// `TransportSocketAddr` 提供与具体套接字库解耦的地址表达。
///
/// # 设计初衷（Why）
/// - 能力契约与 Provider 链不应绑定到 `std::net::SocketAddr` 的具体形态，
///   日志、指标与准入策略只需要稳定的结构化表示；
/// - 保留枚举形态，为将来新增地址族（如 Unix Domain Socket）留出空间。
///
/// # 契约定义（What）
/// - `V4`/`V6` 分别存储原始字节与主机序端口号；
/// - `Display` 输出可直接用于日志聚合与指标标签。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[non_exhaustive]
pub enum TransportSocketAddr {
    /// IPv4 地址。
    V4 { addr: [u8; 4], port: u16 },
    /// IPv6 地址。
    V6 { addr: [u16; 8], port: u16 },
}

impl TransportSocketAddr {
    /// 端口号。
    pub fn port(&self) -> u16 {
        match self {
            TransportSocketAddr::V4 { port, .. } | TransportSocketAddr::V6 { port, .. } => *port,
        }
    }

    /// 转换为标准库地址，供套接字层消费。
    pub fn to_std(&self) -> SocketAddr {
        match self {
            TransportSocketAddr::V4 { addr, port } => {
                SocketAddr::new(IpAddr::from(*addr), *port)
            }
            TransportSocketAddr::V6 { addr, port } => {
                SocketAddr::new(IpAddr::from(Ipv6Addr::from(*addr)), *port)
            }
        }
    }
}

impl fmt::Display for TransportSocketAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_std(), f)
    }
}

impl From<SocketAddr> for TransportSocketAddr {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Self::V4 {
                addr: v4.ip().octets(),
                port: v4.port(),
            },
            SocketAddr::V6(v6) => Self::V6 {
                addr: v6.ip().segments(),
                port: v6.port(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 与标准库地址的互转保持往返一致。
    #[test]
    fn std_round_trip() {
        let std_addr: SocketAddr = "127.0.0.1:5672".parse().expect("解析地址");
        let addr = TransportSocketAddr::from(std_addr);
        assert_eq!(addr.to_std(), std_addr);
        assert_eq!(addr.port(), 5672);
        assert_eq!(addr.to_string(), "127.0.0.1:5672");
    }
}
