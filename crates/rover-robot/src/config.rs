//! 机器人配置
//!
//! ```toml
//! [robot]
//! stream_id = 1
//! stream_id_out = 2
//! stream_id_ref = 3
//! drivers = ["lidar", "spider"]
//! executors = ["spider"]
//!
//! [robot.lidar]
//! transport = { kind = "tcp", address = "192.168.1.10:2111" }
//!
//! [robot.spider]
//! transport = { kind = "tcp", address = "192.168.1.11:4001" }
//! ```
//!
//! 完整文档在运行开始时以 `{"config": ...}` 写入 stream 0，
//! 回放时可以直接从日志中恢复。

use crate::error::RobotError;
use rover_driver::DriverConfig;
use rover_log::{INFO_STREAM_ID, InfoRecord, LogWriter, StreamId};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// `[robot]` 段
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RobotSection {
    /// 驱动输入消息的 stream
    pub stream_id: StreamId,
    /// `execute` 输出命令的 stream
    #[serde(default)]
    pub stream_id_out: Option<StreamId>,
    /// `update` 返回消息的参考 stream
    #[serde(default)]
    pub stream_id_ref: Option<StreamId>,
    pub drivers: Vec<String>,
    #[serde(default)]
    pub executors: Vec<String>,
    /// 各驱动的参数表（`[robot.<driver>]`）
    #[serde(flatten)]
    pub driver_configs: BTreeMap<String, toml::Table>,
}

/// 完整配置文档 + 解析后的 `[robot]` 段
#[derive(Debug, Clone, PartialEq)]
pub struct RobotConfig {
    document: toml::Table,
    section: RobotSection,
}

impl RobotConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RobotError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RobotError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config {}", path.display());
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, RobotError> {
        Self::from_table(toml::from_str(text)?)
    }

    /// 从日志中的配置快照恢复
    pub fn from_json(value: &serde_json::Value) -> Result<Self, RobotError> {
        Self::from_table(serde_json::from_value(value.clone())?)
    }

    pub fn from_table(document: toml::Table) -> Result<Self, RobotError> {
        let robot = document
            .get("robot")
            .ok_or_else(|| RobotError::Config("missing [robot] section".into()))?;
        let section: RobotSection = robot.clone().try_into()?;
        let config = Self { document, section };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), RobotError> {
        let s = &self.section;

        let mut ids = HashSet::new();
        for id in [Some(s.stream_id), s.stream_id_out, s.stream_id_ref].into_iter().flatten() {
            if id == INFO_STREAM_ID {
                return Err(RobotError::Config(format!(
                    "stream {} is reserved for log house-keeping",
                    INFO_STREAM_ID
                )));
            }
            if !ids.insert(id) {
                return Err(RobotError::Config(format!("stream {} configured twice", id)));
            }
        }

        let mut names = HashSet::new();
        for name in &s.drivers {
            if !names.insert(name.as_str()) {
                return Err(RobotError::Config(format!("driver {} listed twice", name)));
            }
            if !s.driver_configs.contains_key(name) {
                return Err(RobotError::Config(format!("missing section [robot.{}]", name)));
            }
        }

        if let Some(name) = s.executors.iter().find(|name| !names.contains(name.as_str())) {
            return Err(RobotError::Config(format!("executor {} is not a configured driver", name)));
        }

        Ok(())
    }

    pub fn document(&self) -> &toml::Table {
        &self.document
    }

    pub fn section(&self) -> &RobotSection {
        &self.section
    }

    pub fn stream_id(&self) -> StreamId {
        self.section.stream_id
    }

    pub fn stream_id_out(&self) -> Option<StreamId> {
        self.section.stream_id_out
    }

    pub fn stream_id_ref(&self) -> Option<StreamId> {
        self.section.stream_id_ref
    }

    pub fn drivers(&self) -> &[String] {
        &self.section.drivers
    }

    pub fn is_executor(&self, name: &str) -> bool {
        self.section.executors.iter().any(|e| e == name)
    }

    /// 驱动的只读参数表
    pub fn driver_config(&self, name: &str) -> Result<DriverConfig, RobotError> {
        self.section
            .driver_configs
            .get(name)
            .map(|table| DriverConfig::new(name, table.clone()))
            .ok_or_else(|| RobotError::Config(format!("missing section [robot.{}]", name)))
    }

    pub fn to_json(&self) -> Result<serde_json::Value, RobotError> {
        Ok(serde_json::to_value(&self.document)?)
    }

    /// 把完整配置写入 stream 0
    pub fn log_snapshot(&self, log: &LogWriter) -> Result<Duration, RobotError> {
        Ok(log.write_info(&InfoRecord::Config(self.to_json()?))?)
    }
}
