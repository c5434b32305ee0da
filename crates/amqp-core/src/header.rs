use crate::error::{AmqpError, ErrorCategory};
use alloc::format;
use core::fmt;

/// 协议头前 4 字节的固定魔数。
pub const PROTOCOL_MAGIC: [u8; 4] = *b"AMQP";

/// 协议头的线上尺寸：4 字节魔数 + 协议号 + 3 字节版本。
pub const PROTOCOL_HEADER_SIZE: usize = 8;

/// 协商协议号。
///
/// # 契约说明（What）
/// - 取值空间为单字节；`Amqp`（0x00）为终端协议，`Tls`（0x02）与
///   `Sasl`（0x03）为安全分层协议；
/// - 未登记的取值解码为 `Unknown`，交由监听端在 Provider 查找阶段拒绝，
///   而不是在解码阶段失败——对端发送未知协议号是协商语义问题，不是
///   字节格式问题。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ProtocolId {
    /// AMQP 1.0 本体，终端协议。
    Amqp,
    /// TLS 安全分层。
    Tls,
    /// SASL 认证分层。
    Sasl,
    /// 未登记的协议号。
    Unknown(u8),
}

impl ProtocolId {
    /// 返回线上字节值。
    pub const fn as_u8(&self) -> u8 {
        match self {
            ProtocolId::Amqp => 0x00,
            ProtocolId::Tls => 0x02,
            ProtocolId::Sasl => 0x03,
            ProtocolId::Unknown(value) => *value,
        }
    }

    /// 从线上字节值解析，未登记取值归入 `Unknown`。
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => ProtocolId::Amqp,
            0x02 => ProtocolId::Tls,
            0x03 => ProtocolId::Sasl,
            other => ProtocolId::Unknown(other),
        }
    }
}

impl fmt::Display for ProtocolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolId::Amqp => write!(f, "amqp"),
            ProtocolId::Tls => write!(f, "tls"),
            ProtocolId::Sasl => write!(f, "sasl"),
            ProtocolId::Unknown(value) => write!(f, "unknown({value:#04x})"),
        }
    }
}

/// 协议版本三元组。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProtocolVersion {
    /// 主版本。
    pub major: u8,
    /// 次版本。
    pub minor: u8,
    /// 修订号。
    pub revision: u8,
}

impl ProtocolVersion {
    /// AMQP 1.0.0，当前实现支持的唯一版本。
    pub const V1_0_0: ProtocolVersion = ProtocolVersion::new(1, 0, 0);

    /// 构造版本三元组。
    pub const fn new(major: u8, minor: u8, revision: u8) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.revision)
    }
}

/// 8 字节协商协议头，每一步升级协商都由双方各发送一份。
///
/// # 教案级注释
///
/// ## 意图（Why）
/// - 协议头是本内核唯一解释的线上字节；其余字节对内核完全不透明。
///   将编解码收敛到一个不可变值类型，使发起端的"回显必须逐字节相等"
///   判定化为一次结构化比较。
///
/// ## 契约（What）
/// - `encode` 恰好写出 [`PROTOCOL_HEADER_SIZE`] 字节；
/// - `decode` 恰好消费 8 字节：不足 8 字节或魔数不匹配时返回
///   [`ErrorCategory::Decode`] 分类错误；
/// - 结构化相等即线上相等：两个头部 `==` 当且仅当其编码逐字节一致。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProtocolHeader {
    id: ProtocolId,
    version: ProtocolVersion,
}

impl ProtocolHeader {
    /// 构造协议头。
    pub const fn new(id: ProtocolId, version: ProtocolVersion) -> Self {
        Self { id, version }
    }

    /// 协议号。
    pub const fn id(&self) -> ProtocolId {
        self.id
    }

    /// 版本三元组。
    pub const fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// 编码为线上字节。
    pub fn encode(&self) -> [u8; PROTOCOL_HEADER_SIZE] {
        let mut wire = [0u8; PROTOCOL_HEADER_SIZE];
        wire[..4].copy_from_slice(&PROTOCOL_MAGIC);
        wire[4] = self.id.as_u8();
        wire[5] = self.version.major;
        wire[6] = self.version.minor;
        wire[7] = self.version.revision;
        wire
    }

    /// 从线上字节解码，恰好消费 8 字节。
    pub fn decode(bytes: &[u8]) -> Result<Self, AmqpError> {
        if bytes.len() < PROTOCOL_HEADER_SIZE {
            return Err(AmqpError::new(
                "amqp.protocol.header_truncated",
                format!(
                    "protocol header requires {PROTOCOL_HEADER_SIZE} bytes, got {}",
                    bytes.len()
                ),
            )
            .with_category(ErrorCategory::Decode));
        }
        if bytes[..4] != PROTOCOL_MAGIC {
            return Err(AmqpError::new(
                "amqp.protocol.header_bad_magic",
                format!(
                    "protocol header magic mismatch: {:02x}{:02x}{:02x}{:02x}",
                    bytes[0], bytes[1], bytes[2], bytes[3]
                ),
            )
            .with_category(ErrorCategory::Decode));
        }
        Ok(Self {
            id: ProtocolId::from_u8(bytes[4]),
            version: ProtocolVersion::new(bytes[5], bytes[6], bytes[7]),
        })
    }
}

impl fmt::Display for ProtocolHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AMQP({}, {})", self.id.as_u8(), self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 已知样例的编码结果逐字节固定。
    #[test]
    fn encode_matches_wire_layout() {
        let header = ProtocolHeader::new(ProtocolId::Tls, ProtocolVersion::V1_0_0);
        assert_eq!(header.encode(), [b'A', b'M', b'Q', b'P', 0x02, 1, 0, 0]);
    }

    /// 任意 0..=7 字节的截断输入都以 Decode 分类失败。
    #[test]
    fn truncated_input_fails_with_decode_category() {
        let wire = ProtocolHeader::new(ProtocolId::Amqp, ProtocolVersion::V1_0_0).encode();
        for len in 0..PROTOCOL_HEADER_SIZE {
            let err = ProtocolHeader::decode(&wire[..len]).expect_err("截断输入必须失败");
            assert_eq!(err.category(), ErrorCategory::Decode, "len={len}");
        }
    }

    /// 魔数不匹配以 Decode 分类失败。
    #[test]
    fn bad_magic_fails_with_decode_category() {
        let mut wire = ProtocolHeader::new(ProtocolId::Amqp, ProtocolVersion::V1_0_0).encode();
        wire[0] = b'X';
        let err = ProtocolHeader::decode(&wire).expect_err("魔数错误必须失败");
        assert_eq!(err.category(), ErrorCategory::Decode);
    }

    /// 未登记协议号在解码阶段成功，留待协商阶段拒绝。
    #[test]
    fn unknown_protocol_id_decodes() {
        let mut wire = ProtocolHeader::new(ProtocolId::Amqp, ProtocolVersion::V1_0_0).encode();
        wire[4] = 0x7f;
        let header = ProtocolHeader::decode(&wire).expect("未知协议号应可解码");
        assert_eq!(header.id(), ProtocolId::Unknown(0x7f));
        assert_eq!(header.encode(), wire);
    }
}
