use crate::error::peer_closed;
use amqp_core::contract::CallContext;
use amqp_core::error::AmqpError;
use amqp_core::header::{PROTOCOL_HEADER_SIZE, ProtocolHeader};
use amqp_transport::Transport;
use bytes::{BufMut, Bytes, BytesMut};

/// 从传输层恰好读取 8 字节并解码为协议头。
///
/// 读取以 `limit` 约束写入空间：一次到达的多余字节留在传输层缓存中，
/// 协商结束后不存在被误消费的载荷字节。
pub(crate) async fn read_header(
    ctx: &CallContext,
    transport: &dyn Transport,
) -> Result<ProtocolHeader, AmqpError> {
    let mut buf = BytesMut::with_capacity(PROTOCOL_HEADER_SIZE);
    while buf.len() < PROTOCOL_HEADER_SIZE {
        let remaining = PROTOCOL_HEADER_SIZE - buf.len();
        let mut limited = (&mut buf).limit(remaining);
        let received = transport.read(ctx, &mut limited).await?;
        if received == 0 {
            return Err(peer_closed());
        }
    }
    ProtocolHeader::decode(&buf)
}

/// 将协议头写出到传输层。
pub(crate) async fn write_header(
    ctx: &CallContext,
    transport: &dyn Transport,
    header: ProtocolHeader,
) -> Result<(), AmqpError> {
    let wire = Bytes::copy_from_slice(&header.encode());
    transport.write(ctx, &[wire]).await?;
    Ok(())
}
