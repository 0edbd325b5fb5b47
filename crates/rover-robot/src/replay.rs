//! 日志回放
//!
//! - [`ReplayRobot`]：按录制顺序重放输入消息，并把控制逻辑产生的命令
//!   与输出 stream 上录制的命令逐条比对（`force` 时跳过比对）。
//! - [`verify_driver_replay`]：用协议的分帧器和解码器重新处理录制的原始字节块
//!   （驱动开启 `publish_raw` 时写入），与录制的解码结果比对。

use crate::config::RobotConfig;
use crate::error::RobotError;
use crate::io::RobotIo;
use rover_driver::{BusEvent, Decoded, Protocol};
use rover_log::{LogAsserter, LogError, LogReader, Mismatch, StreamFilter, StreamId, read_config};
use rover_protocol::{BusMessage, Payload, StreamBuffer};
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub struct ReplayRobot {
    asserter: LogAsserter,
    stream_id: StreamId,
    stream_id_out: Option<StreamId>,
    force: bool,
    replayed: u64,
}

impl ReplayRobot {
    pub fn open(path: impl AsRef<Path>, config: &RobotConfig, force: bool) -> Result<Self, RobotError> {
        let mut asserter = LogAsserter::open(path.as_ref())?;
        asserter.set_assert_stream(config.stream_id_out());
        info!(
            "Replaying {} (stream {}, force={})",
            path.as_ref().display(),
            config.stream_id(),
            force
        );
        Ok(Self {
            asserter,
            stream_id: config.stream_id(),
            stream_id_out: config.stream_id_out(),
            force,
            replayed: 0,
        })
    }

    /// 使用日志中的配置快照
    pub fn from_log(path: impl AsRef<Path>, force: bool) -> Result<Self, RobotError> {
        let path = path.as_ref();
        let snapshot = read_config(path)?
            .ok_or_else(|| RobotError::Config(format!("no config snapshot in {}", path.display())))?;
        let config = RobotConfig::from_json(&snapshot)?;
        Self::open(path, &config, force)
    }

    /// 已重放的输入消息数
    pub fn replayed(&self) -> u64 {
        self.replayed
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        self.asserter.mismatches()
    }

    /// 已读过但没有被 `execute` 对应上的录制命令数
    pub fn unmatched_outputs(&self) -> usize {
        self.asserter.unmatched_outputs()
    }
}

impl RobotIo for ReplayRobot {
    /// 日志结束时返回 [`RobotError::Shutdown`]；`timeout` 不起作用
    fn update(&mut self, _timeout: Duration) -> Result<Option<BusEvent>, RobotError> {
        let Some(record) = self.asserter.next_record(&StreamFilter::Only(self.stream_id))? else {
            return Err(RobotError::Shutdown);
        };
        let message = rover_protocol::decode(&record.payload)?;
        self.replayed += 1;
        Ok(Some(BusEvent {
            elapsed: record.elapsed,
            name: message.name,
            payload: message.payload,
        }))
    }

    fn execute(&mut self, message_id: &str, payload: Payload) -> Result<(), RobotError> {
        let stream_id = self.stream_id_out.ok_or(RobotError::NoOutputStream)?;
        if self.force {
            return Ok(());
        }
        let bytes = rover_protocol::encode(&BusMessage::new(message_id, payload))?;
        match self.asserter.write(stream_id, &bytes) {
            Ok(()) => Ok(()),
            Err(LogError::Mismatch(mismatch)) => Err(RobotError::ReplayMismatch(mismatch)),
            Err(e) => Err(e.into()),
        }
    }
}

/// 驱动回放时的一处不一致
#[derive(Debug, Clone, PartialEq)]
pub struct DriverMismatch {
    /// 录制消息的时间（重新解码多出的消息为 `None`）
    pub elapsed: Option<Duration>,
    pub expected: Option<BusMessage>,
    pub actual: Option<BusMessage>,
}

impl fmt::Display for DriverMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.expected, &self.actual) {
            (Some(expected), Some(actual)) => write!(f, "expected {}, decoded {}", expected, actual),
            (Some(expected), None) => write!(f, "expected {}, decoded nothing", expected),
            (None, Some(actual)) => write!(f, "unexpected {}", actual),
            (None, None) => write!(f, "empty mismatch"),
        }
    }
}

/// [`verify_driver_replay`] 的结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverReplayReport {
    /// 处理过的原始字节块数
    pub chunks: usize,
    /// 比对一致的消息数
    pub verified: usize,
    pub mismatches: Vec<DriverMismatch>,
}

impl DriverReplayReport {
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// 重新解码驱动 `driver_name` 录制的原始字节块，并与录制的消息比对
///
/// 只比对名称为 `<driver_name>.<channel>` 的消息；原始块本身（`.raw`）作为输入。
pub fn verify_driver_replay<P: Protocol>(
    path: impl AsRef<Path>,
    stream_id: StreamId,
    driver_name: &str,
    mut protocol: P,
) -> Result<DriverReplayReport, RobotError> {
    let mut reader = LogReader::open(path)?;
    let raw_name = format!("{}.raw", driver_name);
    let prefix = format!("{}.", driver_name);

    let mut buffer = StreamBuffer::new(protocol.framer());
    let mut decoded: VecDeque<BusMessage> = VecDeque::new();
    let mut report = DriverReplayReport::default();

    while let Some(record) = reader.next_record(&StreamFilter::Only(stream_id))? {
        let message = rover_protocol::decode(&record.payload)?;

        if message.name == raw_name {
            let Payload::Bytes(chunk) = &message.payload else {
                warn!("Ignoring non-bytes raw record at {:?}", record.elapsed);
                continue;
            };
            report.chunks += 1;
            for packet in buffer.push(chunk) {
                if let Decoded::Message { channel, payload } = protocol.decode(&packet) {
                    decoded.push_back(BusMessage::new(format!("{}{}", prefix, channel), payload));
                }
            }
            continue;
        }

        if !message.name.starts_with(&prefix) {
            continue;
        }
        match decoded.pop_front() {
            Some(actual) if actual == message => report.verified += 1,
            actual => report.mismatches.push(DriverMismatch {
                elapsed: Some(record.elapsed),
                expected: Some(message),
                actual,
            }),
        }
    }

    report.mismatches.extend(decoded.into_iter().map(|actual| DriverMismatch {
        elapsed: None,
        expected: None,
        actual: Some(actual),
    }));

    for mismatch in &report.mismatches {
        warn!("Driver {} replay mismatch: {}", driver_name, mismatch);
    }
    info!(
        "Driver {} replay: {} chunks, {} verified, {} mismatches",
        driver_name,
        report.chunks,
        report.verified,
        report.mismatches.len()
    );
    Ok(report)
}
