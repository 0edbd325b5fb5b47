//! 协议抽象
//!
//! 协议只负责“报文 ↔ 语义消息”的转换，不接触线程、传输和总线；
//! 接收循环由 [`StreamDriver`](crate::driver::StreamDriver) 统一实现。

use crate::error::DriverError;
use rover_protocol::{Framer, Payload};

/// 单个报文的解码结果
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// 发布到 `驱动名.channel`
    Message {
        channel: &'static str,
        payload: Payload,
    },
    /// 需要立即回写给设备的字节（握手等），不发布
    Reply(Vec<u8>),
    /// 无法识别的报文（链路噪声），丢弃
    Noise,
}

impl Decoded {
    pub fn message(channel: &'static str, payload: impl Into<Payload>) -> Self {
        Decoded::Message {
            channel,
            payload: payload.into(),
        }
    }
}

/// 字节流协议
pub trait Protocol: Send + 'static {
    type Framer: Framer + 'static;

    /// 协议名（日志用）
    fn name(&self) -> &'static str;

    /// 分帧算法
    fn framer(&self) -> Self::Framer;

    /// 接收循环启动时写给设备的字节
    fn on_start(&mut self) -> Option<Vec<u8>> {
        None
    }

    /// 解码一个完整报文
    fn decode(&mut self, packet: &[u8]) -> Decoded;

    /// 每解码出一条消息后写给设备的轮询请求
    fn poll_request(&self) -> Option<Vec<u8>> {
        None
    }

    /// 握手是否完成；未完成时外发命令被跳过
    fn is_ready(&self) -> bool {
        true
    }

    /// 把外发命令编码为线上字节
    fn encode_command(&mut self, command: &Payload) -> Result<Vec<u8>, DriverError>;
}
