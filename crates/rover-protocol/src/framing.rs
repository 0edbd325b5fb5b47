//! 字节流分帧
//!
//! 驱动从传输层收到的是任意切分的字节块，`Framer` 负责把
//! “上次剩余的 tail + 新到达的字节”切成完整报文。
//!
//! # 约定
//!
//! - `split` 每次最多切出一个报文，`packet` 为空表示数据不足
//! - 返回的 `tail` 始终是输入的后缀（调用方据此原地裁剪缓冲区）
//! - 对终止符分帧，`packet ++ tail == input`；CAN 桥接分帧会丢弃前导填充字节

use crate::can::{BRIDGE_STATUS, FILLER};

/// 报文起始控制字符
pub const STX: u8 = 0x02;

/// 报文结束控制字符
pub const ETX: u8 = 0x03;

/// 换行符（NMEA 等文本协议）
pub const LF: u8 = b'\n';

/// 一次切分的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Split<'a> {
    /// 尚未构成完整报文的剩余字节
    pub tail: &'a [u8],
    /// 完整报文（可能为空）
    pub packet: &'a [u8],
}

impl<'a> Split<'a> {
    /// 数据不足，整个输入作为 tail
    pub fn incomplete(buf: &'a [u8]) -> Self {
        Self {
            tail: buf,
            packet: &[],
        }
    }

    /// 在 `at` 处切开：`[..at]` 为报文，`[at..]` 为 tail
    pub fn at(buf: &'a [u8], at: usize) -> Self {
        let (packet, tail) = buf.split_at(at);
        Self { tail, packet }
    }

    pub fn has_packet(&self) -> bool {
        !self.packet.is_empty()
    }
}

/// 分帧算法
pub trait Framer: Send {
    /// 从缓冲区头部切出一个报文
    fn split<'a>(&self, buf: &'a [u8]) -> Split<'a>;
}

/// 终止符分帧
///
/// 第一个终止符之前（含终止符）的字节为报文，其后为 tail。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminatorFramer {
    pub terminator: u8,
}

impl TerminatorFramer {
    pub const fn new(terminator: u8) -> Self {
        Self { terminator }
    }

    /// STX/ETX 包裹的二进制报文（激光雷达）
    pub const fn etx() -> Self {
        Self::new(ETX)
    }

    /// 按行分帧
    pub const fn line() -> Self {
        Self::new(LF)
    }
}

impl Framer for TerminatorFramer {
    fn split<'a>(&self, buf: &'a [u8]) -> Split<'a> {
        match buf.iter().position(|&b| b == self.terminator) {
            Some(i) => Split::at(buf, i + 1),
            None => Split::incomplete(buf),
        }
    }
}

/// CAN 桥接分帧
///
/// 跳过前导 `0xFF` 填充；`0xFE xx` 为两字节状态报文；
/// 其余为 CAN 帧，长度为 `2 + (byte1 & 0x0F)`。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CanBridgeFramer;

impl Framer for CanBridgeFramer {
    fn split<'a>(&self, buf: &'a [u8]) -> Split<'a> {
        let start = buf.iter().position(|&b| b != FILLER).unwrap_or(buf.len());
        let data = &buf[start..];
        if data.len() < 2 {
            return Split::incomplete(data);
        }

        let size = if data[0] == BRIDGE_STATUS {
            2
        } else {
            2 + (data[1] & 0x0F) as usize
        };

        if data.len() < size {
            Split::incomplete(data)
        } else {
            Split::at(data, size)
        }
    }
}

/// 不分帧：每次把整个缓冲区作为一个报文
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassThroughFramer;

impl Framer for PassThroughFramer {
    fn split<'a>(&self, buf: &'a [u8]) -> Split<'a> {
        Split::at(buf, buf.len())
    }
}

/// 接收缓冲区
///
/// 由驱动线程独占，保存 tail 并对新数据反复调用 `Framer::split`。
#[derive(Debug)]
pub struct StreamBuffer<F: Framer> {
    framer: F,
    tail: Vec<u8>,
}

impl<F: Framer> StreamBuffer<F> {
    pub fn new(framer: F) -> Self {
        Self {
            framer,
            tail: Vec::new(),
        }
    }

    /// 追加新数据，返回本次得到的全部完整报文（按顺序）
    pub fn push(&mut self, data: &[u8]) -> Vec<Vec<u8>> {
        self.tail.extend_from_slice(data);

        let mut packets = Vec::new();
        let mut consumed = 0;
        loop {
            let split = self.framer.split(&self.tail[consumed..]);
            consumed = self.tail.len() - split.tail.len();
            if !split.has_packet() {
                break;
            }
            packets.push(split.packet.to_vec());
        }

        self.tail.drain(..consumed);
        packets
    }

    /// 当前未完成的字节
    pub fn tail(&self) -> &[u8] {
        &self.tail
    }

    pub fn clear(&mut self) {
        self.tail.clear();
    }

    pub fn framer(&self) -> &F {
        &self.framer
    }
}
