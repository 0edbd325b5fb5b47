//! 日志写入
//!
//! `LogWriter` 独占一个新建的日志文件（fs4 排他锁），内部用一把互斥锁
//! 串行化所有写入。需要把“写日志”和其它动作（例如入队）合成一个临界区时，
//! 调用 [`LogWriter::lock`] 拿到 [`LogWriteGuard`] 在锁内完成。

use crate::error::LogError;
use crate::format::{
    FORMAT_VERSION, INFO_STREAM_ID, InfoRecord, MAGIC, MAX_PAYLOAD_SIZE, RECORD_HEADER_LEN, StreamId,
    as_micros,
    encode_record_header,
};
use fs4::fs_std::FileExt;
use parking_lot::{Mutex, MutexGuard};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info};

/// 同一秒内重名时追加后缀的最大尝试次数
const MAX_NAME_ATTEMPTS: u32 = 100;

struct WriterState<W: Write = BufWriter<File>> {
    file: W,
    started: Instant,
    last_elapsed: Duration,
    names: Vec<String>,
    /// 写入失败后文件尾部可能残缺，之后拒绝一切追加
    failed: bool,
}

impl<W: Write> WriterState<W> {
    fn new(file: W, started: Instant) -> Self {
        Self {
            file,
            started,
            last_elapsed: Duration::ZERO,
            names: Vec::new(),
            failed: false,
        }
    }

    fn append(&mut self, stream_id: StreamId, payload: &[u8]) -> Result<Duration, LogError> {
        if self.failed {
            return Err(LogError::WriterFailed);
        }
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(LogError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        // 文件精度为微秒；返回值与读回的值一致，并保证单调不减
        let now = Duration::from_micros(as_micros(self.started.elapsed()));
        let elapsed = now.max(self.last_elapsed);

        let mut record = Vec::with_capacity(RECORD_HEADER_LEN + payload.len());
        record.extend_from_slice(&encode_record_header(elapsed, stream_id, payload.len() as u32));
        record.extend_from_slice(payload);
        // 每条记录落盘，异常退出时文件仍是合法前缀
        if let Err(e) = self.file.write_all(&record).and_then(|()| self.file.flush()) {
            error!("Log write failed, rejecting further records: {}", e);
            self.failed = true;
            return Err(e.into());
        }

        self.last_elapsed = elapsed;
        Ok(elapsed)
    }
}

/// 写锁守卫
///
/// 持有期间其它线程的写入被阻塞。
pub struct LogWriteGuard<'a> {
    state: MutexGuard<'a, WriterState>,
}

impl LogWriteGuard<'_> {
    /// 追加一条记录，返回相对起始时间
    pub fn write(&mut self, stream_id: StreamId, payload: &[u8]) -> Result<Duration, LogError> {
        self.state.append(stream_id, payload)
    }
}

/// 日志写入器
pub struct LogWriter {
    filename: PathBuf,
    start_time: SystemTime,
    state: Mutex<WriterState>,
}

impl LogWriter {
    /// 创建新日志：`prefix + %y%m%d_%H%M%S + .log`
    ///
    /// 并在 stream 0 写入 `{"note": note}`。
    pub fn create(prefix: impl AsRef<Path>, note: &str) -> Result<Self, LogError> {
        let stamp = chrono::Local::now().format("%y%m%d_%H%M%S").to_string();
        let base = prefix.as_ref().as_os_str();

        let mut attempt = 0;
        let (filename, file) = loop {
            let mut name = OsString::from(base);
            name.push(&stamp);
            if attempt > 0 {
                name.push(format!("-{}", attempt));
            }
            name.push(".log");
            let path = PathBuf::from(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    debug!("Log file {} exists, trying next suffix", path.display());
                    attempt += 1;
                },
                Err(e) => return Err(e.into()),
            }
        };

        let writer = Self::with_file(filename, file)?;
        writer.write_info(&InfoRecord::Note(note.to_string()))?;
        info!("Log file created: {}", writer.filename.display());
        Ok(writer)
    }

    fn with_file(filename: PathBuf, file: File) -> Result<Self, LogError> {
        if !file.try_lock_exclusive()? {
            return Err(LogError::Locked(filename));
        }

        let started = Instant::now();
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        let start_us = as_micros(since_epoch);
        let start_time = UNIX_EPOCH + Duration::from_micros(start_us);

        let mut file = BufWriter::new(file);
        file.write_all(MAGIC)?;
        file.write_all(&[FORMAT_VERSION])?;
        file.write_all(&start_us.to_le_bytes())?;
        file.flush()?;

        Ok(Self {
            filename,
            start_time,
            state: Mutex::new(WriterState::new(file, started)),
        })
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// 日志起始时间（微秒精度，与读回值一致）
    pub fn start_time(&self) -> SystemTime {
        self.start_time
    }

    /// 获取写锁
    pub fn lock(&self) -> LogWriteGuard<'_> {
        LogWriteGuard {
            state: self.state.lock(),
        }
    }

    /// 追加一条记录，返回相对起始时间
    pub fn write(&self, stream_id: StreamId, payload: &[u8]) -> Result<Duration, LogError> {
        self.lock().write(stream_id, payload)
    }

    /// 在 stream 0 写入内务记录
    pub fn write_info(&self, record: &InfoRecord) -> Result<Duration, LogError> {
        let payload = record.to_bytes()?;
        self.write(INFO_STREAM_ID, &payload)
    }

    /// 注册 stream 名称，返回分配的 id（从 1 开始连续分配）
    ///
    /// 重名返回 [`LogError::DuplicateStream`]。
    pub fn register(&self, name: &str) -> Result<StreamId, LogError> {
        let mut state = self.state.lock();
        if state.names.iter().any(|n| n == name) {
            return Err(LogError::DuplicateStream(name.to_string()));
        }
        let id = StreamId::try_from(state.names.len() + 1).map_err(|_| LogError::TooManyStreams)?;

        state.names.push(name.to_string());
        let snapshot = InfoRecord::Names(state.names.clone()).to_bytes()?;
        state.append(INFO_STREAM_ID, &snapshot)?;
        debug!("Registered stream {} = {}", id, name);
        Ok(id)
    }

    /// 已注册的 stream 名称（下标 + 1 即 id）
    pub fn stream_names(&self) -> Vec<String> {
        self.state.lock().names.clone()
    }

    pub fn flush(&self) -> Result<(), LogError> {
        self.state.lock().file.flush()?;
        Ok(())
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Err(e) = state.file.flush() {
            error!("Failed to flush log {}: {}", self.filename.display(), e);
        }
        let _ = state.file.get_ref().unlock();
    }
}
