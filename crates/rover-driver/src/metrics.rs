//! 驱动运行指标
//!
//! 原子计数器，驱动线程写入，任意线程读取快照。

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct DriverMetrics {
    /// 从传输层收到的字节数
    pub bytes_received: AtomicU64,

    /// 分帧得到的报文数
    pub packets_total: AtomicU64,

    /// 成功解码的报文数
    pub packets_decoded: AtomicU64,

    /// 被丢弃的噪声报文数
    pub packets_dropped: AtomicU64,

    /// 发布到总线的消息数
    pub messages_published: AtomicU64,

    /// 实际写到传输层的命令数
    pub commands_sent: AtomicU64,

    /// 协议未就绪时被跳过的命令数
    pub commands_skipped: AtomicU64,

    /// 传输层错误次数（不含超时）
    pub transport_errors: AtomicU64,

    /// 读超时次数（正常现象，无数据时会超时）
    pub rx_timeouts: AtomicU64,
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            packets_total: self.packets_total.load(Ordering::Relaxed),
            packets_decoded: self.packets_decoded.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            commands_sent: self.commands_sent.load(Ordering::Relaxed),
            commands_skipped: self.commands_skipped.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bytes_received: u64,
    pub packets_total: u64,
    pub packets_decoded: u64,
    pub packets_dropped: u64,
    pub messages_published: u64,
    pub commands_sent: u64,
    pub commands_skipped: u64,
    pub transport_errors: u64,
    pub rx_timeouts: u64,
}

impl MetricsSnapshot {
    /// 噪声报文比例（百分比）
    ///
    /// `packets_total` 为 0 时返回 0.0。
    pub fn drop_rate(&self) -> f64 {
        if self.packets_total == 0 {
            return 0.0;
        }
        (self.packets_dropped as f64 / self.packets_total as f64) * 100.0
    }
}
