//! # Rover Log
//!
//! 多路复用的追加式日志存储。
//!
//! 一个日志文件包含多个逻辑流（stream），每条记录为
//! `(相对起始时间, stream_id, payload)`，按写入锁的获取顺序排列，
//! 因此文件顺序即时间顺序。
//!
//! ## 三种访问方式
//!
//! - [`LogWriter`]：独占写入（文件排他锁）
//! - [`LogReader`]：顺序扫描，可按 stream 过滤
//! - [`LogAsserter`]：回放时校验新产生的输出与录制内容一致
//!
//! ## 示例
//!
//! ```no_run
//! use rover_log::{LogReader, LogWriter, StreamFilter};
//!
//! # fn main() -> Result<(), rover_log::LogError> {
//! let log = LogWriter::create("run-", "bench test")?;
//! let raw = log.register("raw")?;
//! log.write(raw, b"\x02data\x03")?;
//! let filename = log.filename().to_path_buf();
//! drop(log);
//!
//! let mut reader = LogReader::open(&filename)?;
//! for record in reader.records(StreamFilter::Only(raw)) {
//!     println!("{:?}", record?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod asserter;
pub mod error;
pub mod format;
pub mod reader;
pub mod writer;

pub use asserter::{AssertRecords, LogAsserter, Mismatch};
pub use error::LogError;
pub use format::{INFO_STREAM_ID, InfoRecord, LogRecord, StreamFilter, StreamId};
pub use reader::{LogReader, Records, read_config, read_stream_names};
pub use writer::{LogWriteGuard, LogWriter};
