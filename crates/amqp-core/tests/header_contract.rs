//! `header_contract` 集成测试：从外部 crate 视角验证协议头编解码契约。
//!
//! # 测试目标（Why）
//! - 协议头是协商的全部线上语义，任何编码漂移都会破坏与既有对端的互通；
//! - 通过性质测试覆盖全部 `(协议号, 版本)` 组合，而非手工枚举样例。

use amqp_core::header::{PROTOCOL_HEADER_SIZE, ProtocolHeader, ProtocolId, ProtocolVersion};
use proptest::prelude::*;

proptest! {
    /// 对全部取值空间，`decode(encode(h)) == h` 且编码长度恒为 8。
    #[test]
    fn round_trip_holds_for_all_headers(
        id in any::<u8>(),
        major in any::<u8>(),
        minor in any::<u8>(),
        revision in any::<u8>(),
    ) {
        let header = ProtocolHeader::new(
            ProtocolId::from_u8(id),
            ProtocolVersion::new(major, minor, revision),
        );
        let wire = header.encode();
        prop_assert_eq!(wire.len(), PROTOCOL_HEADER_SIZE);
        let decoded = ProtocolHeader::decode(&wire).expect("合法编码必可解码");
        prop_assert_eq!(decoded, header);
        // 结构化相等与线上相等一致。
        prop_assert_eq!(decoded.encode(), wire);
    }

    /// 解码忽略第 8 字节之后的内容：恰好消费 8 字节。
    #[test]
    fn decode_consumes_exactly_eight_bytes(
        id in any::<u8>(),
        trailing in proptest::collection::vec(any::<u8>(), 0..16),
    ) {
        let header = ProtocolHeader::new(ProtocolId::from_u8(id), ProtocolVersion::V1_0_0);
        let mut wire = header.encode().to_vec();
        wire.extend_from_slice(&trailing);
        let decoded = ProtocolHeader::decode(&wire).expect("前缀合法即可解码");
        prop_assert_eq!(decoded, header);
    }
}
