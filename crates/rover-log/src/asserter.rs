//! 回放校验
//!
//! `LogAsserter` 像 [`LogReader`] 一样顺序回放记录，同时接受
//! `write(stream_id, payload)`：新产生的输出与录制在 `assert_stream_id`
//! 上的下一条记录逐字节比较。
//!
//! 控制逻辑的输出在日志中通常落后于触发它的输入，因此 `write` 时
//! 若尚未读到对应记录，会向前预读（预读的记录稍后仍按原顺序交付）。

use crate::error::LogError;
use crate::format::{LogRecord, StreamFilter, StreamId};
use crate::reader::LogReader;
use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::warn;

/// 一次校验失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// 录制记录的时间（录制中已无更多输出时为 `None`）
    pub elapsed: Option<Duration>,
    pub stream_id: StreamId,
    /// 录制的 payload
    pub expected: Option<Vec<u8>>,
    /// 新产生的 payload
    pub actual: Vec<u8>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.expected, self.elapsed) {
            (Some(expected), Some(elapsed)) => write!(
                f,
                "Replay mismatch on stream {} at {:?}: expected {}, got {}",
                self.stream_id,
                elapsed,
                hex::encode(expected),
                hex::encode(&self.actual)
            ),
            _ => write!(
                f,
                "Replay mismatch on stream {}: unexpected output {}",
                self.stream_id,
                hex::encode(&self.actual)
            ),
        }
    }
}

/// 带输出校验的日志回放
pub struct LogAsserter {
    reader: LogReader,
    assert_stream_id: Option<StreamId>,
    /// 为 `write` 预读的记录及其是否已被比较
    lookahead: VecDeque<(LogRecord, bool)>,
    /// 已交付但尚未比较的校验 stream 记录
    pending: VecDeque<LogRecord>,
    mismatches: Vec<Mismatch>,
}

impl LogAsserter {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        Ok(Self::new(LogReader::open(path)?))
    }

    pub fn new(reader: LogReader) -> Self {
        Self {
            reader,
            assert_stream_id: None,
            lookahead: VecDeque::new(),
            pending: VecDeque::new(),
            mismatches: Vec::new(),
        }
    }

    pub fn with_assert_stream(mut self, stream_id: StreamId) -> Self {
        self.assert_stream_id = Some(stream_id);
        self
    }

    pub fn set_assert_stream(&mut self, stream_id: Option<StreamId>) {
        self.assert_stream_id = stream_id;
    }

    pub fn assert_stream_id(&self) -> Option<StreamId> {
        self.assert_stream_id
    }

    pub fn start_time(&self) -> SystemTime {
        self.reader.start_time()
    }

    pub fn stream_names(&self) -> &[String] {
        self.reader.stream_names()
    }

    pub fn stream_id(&self, name: &str) -> Option<StreamId> {
        self.reader.stream_id(name)
    }

    fn is_assert_stream(&self, stream_id: StreamId) -> bool {
        self.assert_stream_id == Some(stream_id)
    }

    /// 读取下一条匹配的记录（与 [`LogReader::next_record`] 相同语义）
    pub fn next_record(&mut self, filter: &StreamFilter) -> Result<Option<LogRecord>, LogError> {
        loop {
            let (record, compared) = match self.lookahead.pop_front() {
                Some(entry) => entry,
                None => match self.reader.next_record(&StreamFilter::All)? {
                    Some(record) => (record, false),
                    None => return Ok(None),
                },
            };

            if !compared && self.is_assert_stream(record.stream_id) {
                self.pending.push_back(record.clone());
            }
            if filter.matches(record.stream_id) {
                return Ok(Some(record));
            }
        }
    }

    pub fn records(&mut self, filter: impl Into<StreamFilter>) -> AssertRecords<'_> {
        AssertRecords {
            asserter: self,
            filter: filter.into(),
        }
    }

    /// 取下一条尚未比较的校验 stream 记录，必要时预读
    fn next_expected(&mut self) -> Result<Option<LogRecord>, LogError> {
        if let Some(record) = self.pending.pop_front() {
            return Ok(Some(record));
        }
        while let Some(record) = self.reader.next_record(&StreamFilter::All)? {
            if self.is_assert_stream(record.stream_id) {
                self.lookahead.push_back((record.clone(), true));
                return Ok(Some(record));
            }
            self.lookahead.push_back((record, false));
        }
        Ok(None)
    }

    /// 校验新产生的输出
    ///
    /// 只接受校验 stream；不一致时记录并返回 [`LogError::Mismatch`]。
    pub fn write(&mut self, stream_id: StreamId, payload: &[u8]) -> Result<(), LogError> {
        if !self.is_assert_stream(stream_id) {
            return Err(LogError::UnexpectedStream {
                stream_id,
                assert_stream_id: self.assert_stream_id,
            });
        }

        let expected = self.next_expected()?;
        if let Some(record) = &expected
            && record.payload == payload
        {
            return Ok(());
        }

        let mismatch = Mismatch {
            elapsed: expected.as_ref().map(|r| r.elapsed),
            stream_id,
            expected: expected.map(|r| r.payload),
            actual: payload.to_vec(),
        };
        warn!("{}", mismatch);
        self.mismatches.push(mismatch.clone());
        Err(LogError::Mismatch(Box::new(mismatch)))
    }

    /// 迄今为止的全部校验失败
    pub fn mismatches(&self) -> &[Mismatch] {
        &self.mismatches
    }

    /// 已回放但没有被任何 `write` 对应上的录制输出数量
    pub fn unmatched_outputs(&self) -> usize {
        self.pending.len()
    }

    pub fn into_reader(self) -> LogReader {
        self.reader
    }
}

/// [`LogAsserter::records`] 返回的迭代器
pub struct AssertRecords<'a> {
    asserter: &'a mut LogAsserter,
    filter: StreamFilter,
}

impl AssertRecords<'_> {
    /// 在迭代过程中校验输出
    pub fn write(&mut self, stream_id: StreamId, payload: &[u8]) -> Result<(), LogError> {
        self.asserter.write(stream_id, payload)
    }
}

impl Iterator for AssertRecords<'_> {
    type Item = Result<LogRecord, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.asserter.next_record(&self.filter).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::LogWriter;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn recorded(dir: &TempDir) -> PathBuf {
        let log = LogWriter::create(dir.path().join("tmp3"), "test_log_asserter").unwrap();
        log.write(1, b"\x01\x02").unwrap();
        log.write(2, b"\x05").unwrap();
        log.write(1, b"\x07\x08").unwrap();
        log.write(2, b"\x06").unwrap();
        log.filename().to_path_buf()
    }

    #[test]
    fn test_write_after_record_delivered() {
        let dir = TempDir::new().unwrap();
        let mut log = LogAsserter::open(recorded(&dir)).unwrap().with_assert_stream(2);

        let filter = StreamFilter::AnyOf(vec![1, 2]);
        let mut seen = Vec::new();
        while let Some(record) = log.next_record(&filter).unwrap() {
            if record.stream_id == 2 {
                log.write(2, &record.payload).unwrap();
            }
            seen.push(record.stream_id);
        }
        assert_eq!(seen, vec![1, 2, 1, 2]);
        assert!(log.mismatches().is_empty());
        assert_eq!(log.unmatched_outputs(), 0);
    }

    #[test]
    fn test_write_ahead_of_replay() {
        let dir = TempDir::new().unwrap();
        let mut log = LogAsserter::open(recorded(&dir)).unwrap().with_assert_stream(2);

        // 输出先于录制位置到达
        log.write(2, b"\x05").unwrap();
        log.write(2, b"\x06").unwrap();

        let mut seen = Vec::new();
        while let Some(record) = log.next_record(&StreamFilter::All).unwrap() {
            seen.push((record.stream_id, record.payload));
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[2], (2, b"\x05".to_vec()));
        assert_eq!(log.unmatched_outputs(), 0);
    }

    #[test]
    fn test_mismatch_reports_both_payloads() {
        let dir = TempDir::new().unwrap();
        let mut log = LogAsserter::open(recorded(&dir)).unwrap().with_assert_stream(2);

        match log.write(2, b"\x09") {
            Err(LogError::Mismatch(mismatch)) => {
                assert_eq!(mismatch.expected.as_deref(), Some(&b"\x05"[..]));
                assert_eq!(mismatch.actual, b"\x09");
                assert!(mismatch.to_string().contains("expected 05, got 09"));
            },
            other => panic!("expected mismatch, got {:?}", other),
        }
        log.write(2, b"\x06").unwrap();

        // 录制中已没有更多输出
        assert!(matches!(log.write(2, b"\x07"), Err(LogError::Mismatch(m)) if m.expected.is_none()));
        assert_eq!(log.mismatches().len(), 2);
    }

    #[test]
    fn test_write_to_other_stream_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut log = LogAsserter::open(recorded(&dir)).unwrap().with_assert_stream(2);
        assert!(matches!(
            log.write(1, b"\x01\x02"),
            Err(LogError::UnexpectedStream {
                stream_id: 1,
                assert_stream_id: Some(2)
            })
        ));
    }
}
