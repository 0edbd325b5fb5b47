//! 日志顺序读取

use crate::error::LogError;
use crate::format::{
    FORMAT_VERSION, INFO_STREAM_ID, InfoRecord, LogRecord, MAGIC, MAX_PAYLOAD_SIZE,
    RECORD_HEADER_LEN, StreamFilter, StreamId, decode_record_header,
};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// 日志读取器
///
/// 单次顺序扫描，不可回退。扫描过程中顺带收集 stream 0 上的
/// `names` 快照，因此 [`stream_names`](Self::stream_names) 反映的是
/// 已读到位置为止的注册表。
pub struct LogReader {
    filename: PathBuf,
    input: BufReader<File>,
    start_time: SystemTime,
    names: Vec<String>,
    finished: bool,
}

impl LogReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let filename = path.as_ref().to_path_buf();
        let mut input = BufReader::new(File::open(&filename)?);

        let mut magic = [0u8; 8];
        if read_full(&mut input, &mut magic)? < magic.len() || &magic != MAGIC {
            return Err(LogError::InvalidFormat(format!(
                "{}: magic mismatch",
                filename.display()
            )));
        }

        let mut version = [0u8; 1];
        if read_full(&mut input, &mut version)? < 1 {
            return Err(LogError::InvalidFormat("missing version".to_string()));
        }
        if version[0] != FORMAT_VERSION {
            return Err(LogError::UnsupportedVersion(version[0]));
        }

        let mut start = [0u8; 8];
        if read_full(&mut input, &mut start)? < start.len() {
            return Err(LogError::InvalidFormat("missing start time".to_string()));
        }
        let start_time = UNIX_EPOCH + Duration::from_micros(u64::from_le_bytes(start));

        Ok(Self {
            filename,
            input,
            start_time,
            names: Vec::new(),
            finished: false,
        })
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// 已扫描部分中最新的 stream 名称表
    pub fn stream_names(&self) -> &[String] {
        &self.names
    }

    /// 按名称查找 stream id
    pub fn stream_id(&self, name: &str) -> Option<StreamId> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| StreamId::try_from(i + 1).ok())
    }

    /// 读取下一条匹配的记录；文件结束返回 `Ok(None)`
    ///
    /// 末尾被截断的记录（进程异常退出）记一条 warn 后视为文件结束。
    pub fn next_record(&mut self, filter: &StreamFilter) -> Result<Option<LogRecord>, LogError> {
        while !self.finished {
            let mut header = [0u8; RECORD_HEADER_LEN];
            let n = read_full(&mut self.input, &mut header)?;
            if n == 0 {
                self.finished = true;
                break;
            }
            if n < RECORD_HEADER_LEN {
                warn!(
                    "Truncated record header at end of {} ({} bytes), ignoring",
                    self.filename.display(),
                    n
                );
                self.finished = true;
                break;
            }

            let (elapsed, stream_id, len) = decode_record_header(&header);
            if len > MAX_PAYLOAD_SIZE {
                return Err(LogError::PayloadTooLarge {
                    size: len,
                    max: MAX_PAYLOAD_SIZE,
                });
            }

            let mut payload = vec![0u8; len];
            let n = read_full(&mut self.input, &mut payload)?;
            if n < len {
                warn!(
                    "Truncated record payload at end of {} ({} of {} bytes), ignoring",
                    self.filename.display(),
                    n,
                    len
                );
                self.finished = true;
                break;
            }

            if stream_id == INFO_STREAM_ID
                && let Some(InfoRecord::Names(names)) = InfoRecord::from_bytes(&payload)
            {
                self.names = names;
            }

            if filter.matches(stream_id) {
                return Ok(Some(LogRecord {
                    elapsed,
                    stream_id,
                    payload,
                }));
            }
        }
        Ok(None)
    }

    /// 记录迭代器（单次遍历，可在多次调用之间接续）
    pub fn records(&mut self, filter: impl Into<StreamFilter>) -> Records<'_> {
        Records {
            reader: self,
            filter: filter.into(),
        }
    }
}

/// [`LogReader::records`] 返回的迭代器
pub struct Records<'a> {
    reader: &'a mut LogReader,
    filter: StreamFilter,
}

impl Iterator for Records<'_> {
    type Item = Result<LogRecord, LogError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.reader.next_record(&self.filter).transpose()
    }
}

/// 读到 `buf` 填满或 EOF，返回实际读取的字节数
fn read_full(input: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// 扫描整个日志，返回最终的 stream 名称表
pub fn read_stream_names(path: impl AsRef<Path>) -> Result<Vec<String>, LogError> {
    let mut reader = LogReader::open(path)?;
    while reader.next_record(&StreamFilter::Only(INFO_STREAM_ID))?.is_some() {}
    Ok(reader.names)
}

/// 读取运行开始时写入的配置快照（stream 0 上第一条 `config` 记录）
pub fn read_config(path: impl AsRef<Path>) -> Result<Option<serde_json::Value>, LogError> {
    let mut reader = LogReader::open(path)?;
    while let Some(record) = reader.next_record(&StreamFilter::Only(INFO_STREAM_ID))? {
        if let Some(InfoRecord::Config(config)) = InfoRecord::from_bytes(&record.payload) {
            return Ok(Some(config));
        }
    }
    Ok(None)
}
