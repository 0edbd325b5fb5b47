//! 驱动注册表
//!
//! 按驱动类型名（配置中的 `driver` 键，缺省为驱动名本身）查找工厂函数。

use crate::bus::DriverBus;
use crate::config::DriverConfig;
use crate::driver::{Driver, LoopOptions, StreamDriver};
use crate::error::DriverError;
use crate::protocol::Protocol;
use crate::protocols::{Lidar, Line, Raw, Spider};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// 驱动工厂：由配置与总线句柄构造一个未启动的驱动
pub type DriverFactory =
    Arc<dyn Fn(&DriverConfig, DriverBus) -> Result<Box<dyn Driver>, DriverError> + Send + Sync>;

#[derive(Default, Clone)]
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

fn stream_factory<P, F>(make: F) -> DriverFactory
where
    P: Protocol,
    F: Fn() -> P + Send + Sync + 'static,
{
    Arc::new(move |config: &DriverConfig, bus: DriverBus| {
        let transport = config.transport()?.open()?;
        let options = LoopOptions::from_config(config)?;
        let driver: Box<dyn Driver> = Box::new(StreamDriver::new(make(), transport, bus, options));
        Ok(driver)
    })
}

impl DriverRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 内置驱动：`lidar`、`spider`、`line`、`raw`
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.factories.insert("lidar".into(), stream_factory(Lidar::new));
        registry.factories.insert("spider".into(), stream_factory(Spider::new));
        registry.factories.insert("line".into(), stream_factory(Line::new));
        registry.factories.insert("raw".into(), stream_factory(|| Raw));
        registry
    }

    /// 注册驱动类型；同名类型已存在时返回 [`DriverError::DuplicateDriver`]
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> Result<(), DriverError>
    where
        F: Fn(&DriverConfig, DriverBus) -> Result<Box<dyn Driver>, DriverError> + Send + Sync + 'static,
    {
        let kind = kind.into();
        if self.factories.contains_key(&kind) {
            return Err(DriverError::DuplicateDriver(kind));
        }
        debug!("Registered driver kind {}", kind);
        self.factories.insert(kind, Arc::new(factory));
        Ok(())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// 已注册的类型名（排序后）
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn create(&self, config: &DriverConfig, bus: DriverBus) -> Result<Box<dyn Driver>, DriverError> {
        let kind = config.driver_kind();
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| DriverError::UnknownDriver(kind.to_string()))?;
        factory(config, bus)
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry").field("kinds", &self.kinds()).finish()
    }
}
