//! 驱动配置
//!
//! 每个驱动收到自己那一节配置表的只读副本，例如：
//!
//! ```toml
//! [robot.lidar]
//! driver = "lidar"
//! transport = { kind = "tcp", address = "192.168.1.10:2111" }
//! receive_timeout_ms = 10
//! publish_raw = true
//! ```

use crate::error::DriverError;
use crate::transport::TransportConfig;
use std::time::Duration;

/// 接收循环默认轮询超时
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverConfig {
    name: String,
    table: toml::Table,
}

impl DriverConfig {
    pub fn new(name: impl Into<String>, table: toml::Table) -> Self {
        Self {
            name: name.into(),
            table,
        }
    }

    /// 驱动实例名（配置节名）
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &toml::Table {
        &self.table
    }

    pub fn get(&self, key: &str) -> Option<&toml::Value> {
        self.table.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.table.get(key).and_then(toml::Value::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.table.get(key).and_then(toml::Value::as_integer)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.table.get(key).and_then(toml::Value::as_bool)
    }

    /// 浮点数（整数也接受）
    pub fn get_float(&self, key: &str) -> Option<f64> {
        match self.table.get(key)? {
            toml::Value::Float(value) => Some(*value),
            toml::Value::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// 注册表键：`driver` 项，缺省为实例名
    pub fn driver_kind(&self) -> &str {
        self.get_str("driver").unwrap_or(&self.name)
    }

    /// 传输配置（必填）
    pub fn transport(&self) -> Result<TransportConfig, DriverError> {
        let value = self.table.get("transport").ok_or_else(|| self.error("missing transport"))?;
        value
            .clone()
            .try_into()
            .map_err(|e| self.error(format!("invalid transport: {}", e)))
    }

    /// 接收循环轮询超时（`receive_timeout_ms`，默认 10ms）
    pub fn receive_timeout(&self) -> Result<Duration, DriverError> {
        match self.table.get("receive_timeout_ms") {
            None => Ok(DEFAULT_RECEIVE_TIMEOUT),
            Some(value) => value
                .as_integer()
                .and_then(|ms| u64::try_from(ms).ok())
                .map(Duration::from_millis)
                .ok_or_else(|| self.error("receive_timeout_ms must be a non-negative integer")),
        }
    }

    /// 是否把收到的原始字节块发布到 `<name>.raw`（用于回放校验）
    pub fn publish_raw(&self) -> bool {
        self.get_bool("publish_raw").unwrap_or(false)
    }

    pub fn error(&self, message: impl Into<String>) -> DriverError {
        DriverError::Config {
            driver: self.name.clone(),
            message: message.into(),
        }
    }
}
