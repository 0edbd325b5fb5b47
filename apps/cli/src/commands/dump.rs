//! dump 命令
//!
//! 逐条打印日志记录：stream 0 按 JSON 显示，总线消息解码后显示，其余按十六进制

use anyhow::Result;
use clap::Args;
use rover_log::{INFO_STREAM_ID, LogReader, LogRecord, StreamFilter, StreamId};
use std::path::PathBuf;

/// 十六进制显示的最大字节数
const MAX_HEX_BYTES: usize = 64;

#[derive(Args, Debug)]
pub struct DumpCommand {
    /// 日志文件
    pub log: PathBuf,

    /// 只显示这些 stream（可重复）
    #[arg(short, long = "stream")]
    pub streams: Vec<StreamId>,
}

impl DumpCommand {
    pub fn execute(&self) -> Result<()> {
        let mut reader = LogReader::open(&self.log)?;
        let filter = StreamFilter::from(self.streams.clone());
        let mut count = 0usize;
        while let Some(record) = reader.next_record(&filter)? {
            println!("{}", describe(&record, reader.stream_names()));
            count += 1;
        }
        println!("-- {} records", count);
        Ok(())
    }
}

fn stream_label(stream_id: StreamId, names: &[String]) -> String {
    match names.get(usize::from(stream_id).wrapping_sub(1)) {
        Some(name) if stream_id != INFO_STREAM_ID => format!("{} ({})", stream_id, name),
        _ => stream_id.to_string(),
    }
}

fn describe(record: &LogRecord, names: &[String]) -> String {
    let body = if record.stream_id == INFO_STREAM_ID {
        match serde_json::from_slice::<serde_json::Value>(&record.payload) {
            Ok(value) => value.to_string(),
            Err(_) => String::from_utf8_lossy(&record.payload).into_owned(),
        }
    } else if let Ok(message) = rover_protocol::decode(&record.payload) {
        message.to_string()
    } else if record.payload.len() > MAX_HEX_BYTES {
        format!(
            "{}... ({} bytes)",
            hex::encode(&record.payload[..MAX_HEX_BYTES]),
            record.payload.len()
        )
    } else {
        hex::encode(&record.payload)
    };
    format!(
        "{:>12.6} {:<12} {}",
        record.elapsed.as_secs_f64(),
        stream_label(record.stream_id, names),
        body
    )
}
