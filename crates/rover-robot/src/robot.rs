//! 驱动容器
//!
//! [`Robot`] 持有日志写入器、消费者队列和全部驱动。驱动线程通过
//! [`InputGate`] 发布消息：在日志写锁内完成写日志和入队，
//! 因此日志顺序与 `update` 的消费顺序严格一致。

use crate::config::RobotConfig;
use crate::error::RobotError;
use crate::io::RobotIo;
use rover_driver::{
    BusChannel, BusEvent, BusShutdown, Driver, DriverBus, DriverError, DriverRegistry,
    MetricsSnapshot, OutputGate,
};
use rover_log::{LogWriter, StreamId};
use rover_protocol::{BusMessage, Payload};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// 所有驱动共用的输出门
pub struct InputGate {
    log: Arc<LogWriter>,
    stream_id: StreamId,
    queue: Arc<BusChannel<BusEvent>>,
}

impl OutputGate for InputGate {
    fn input(&self, name: &str, payload: Payload) -> Result<Duration, DriverError> {
        let message = BusMessage::new(name, payload);
        let bytes = rover_protocol::encode(&message)?;

        let mut log = self.log.lock();
        // 队列关闭后不再写日志，否则记录无人消费
        if self.queue.is_shutdown() {
            return Err(BusShutdown.into());
        }
        let elapsed = log.write(self.stream_id, &bytes)?;
        // 入队必须在写锁内完成
        self.queue.push(BusEvent {
            elapsed,
            name: message.name,
            payload: message.payload,
        })?;
        Ok(elapsed)
    }
}

pub struct Robot {
    log: Arc<LogWriter>,
    stream_id_out: Option<StreamId>,
    stream_id_ref: Option<StreamId>,
    gate: Arc<InputGate>,
    queue: Arc<BusChannel<BusEvent>>,
    drivers: Vec<Box<dyn Driver>>,
    /// `drivers` 中执行器的下标
    executors: Vec<usize>,
    finished: bool,
}

impl Robot {
    /// 按配置创建全部驱动（不启动）
    pub fn new(config: &RobotConfig, log: Arc<LogWriter>, registry: &DriverRegistry) -> Result<Self, RobotError> {
        let queue = Arc::new(BusChannel::new());
        let gate = Arc::new(InputGate {
            log: log.clone(),
            stream_id: config.stream_id(),
            queue: queue.clone(),
        });

        let mut drivers = Vec::with_capacity(config.drivers().len());
        let mut executors = Vec::new();
        for name in config.drivers() {
            let driver_config = config.driver_config(name)?;
            let output: Arc<dyn OutputGate> = gate.clone();
            let driver = registry.create(&driver_config, DriverBus::new(name.as_str(), output))?;
            if config.is_executor(name) {
                executors.push(drivers.len());
            }
            debug!("Created driver {} ({})", name, driver_config.driver_kind());
            drivers.push(driver);
        }

        Ok(Self {
            log,
            stream_id_out: config.stream_id_out(),
            stream_id_ref: config.stream_id_ref(),
            gate,
            queue,
            drivers,
            executors,
            finished: false,
        })
    }

    pub fn log(&self) -> &Arc<LogWriter> {
        &self.log
    }

    /// 输出门句柄，可跨线程注入输入
    pub fn gate(&self) -> Arc<InputGate> {
        self.gate.clone()
    }

    pub fn driver_names(&self) -> Vec<&str> {
        self.drivers.iter().map(|d| d.name()).collect()
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.drivers.iter().map(|d| (d.name().to_string(), d.metrics())).collect()
    }

    pub fn start(&mut self) -> Result<(), RobotError> {
        for driver in &mut self.drivers {
            driver.start()?;
        }
        info!("Robot started with {} drivers", self.drivers.len());
        Ok(())
    }

    /// 驱动发布消息的入口，也可由外部直接注入输入
    pub fn input_gate(&self, name: &str, payload: Payload) -> Result<Duration, RobotError> {
        match self.gate.input(name, payload) {
            Err(DriverError::BusShutdown(BusShutdown)) => Err(RobotError::Shutdown),
            other => Ok(other?),
        }
    }

    /// 取下一条输入消息
    ///
    /// 没有驱动时立即返回 `Ok(None)`。配置了 `stream_id_ref` 时，
    /// 返回的消息同时写入参考 stream。
    pub fn update(&mut self, timeout: Duration) -> Result<Option<BusEvent>, RobotError> {
        if self.drivers.is_empty() {
            return Ok(None);
        }
        let event = match self.queue.listen(Some(timeout)) {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(None),
            Err(BusShutdown) => return Err(RobotError::Shutdown),
        };
        if let Some(stream_id) = self.stream_id_ref {
            let message = BusMessage::new(event.name.as_str(), event.payload.clone());
            self.log.write(stream_id, &rover_protocol::encode(&message)?)?;
        }
        Ok(Some(event))
    }

    /// 在输出 stream 上记录命令，然后发给每个执行器
    pub fn execute(&mut self, message_id: &str, payload: Payload) -> Result<(), RobotError> {
        let stream_id = self.stream_id_out.ok_or(RobotError::NoOutputStream)?;
        let message = BusMessage::new(message_id, payload);
        self.log.write(stream_id, &rover_protocol::encode(&message)?)?;
        for &index in &self.executors {
            self.drivers[index].send(message.payload.clone())?;
        }
        Ok(())
    }

    /// 先对全部驱动请求停止，再逐个等待退出
    ///
    /// 返回第一个 join 错误，但总会等待所有驱动。重复调用无副作用。
    pub fn finish(&mut self) -> Result<(), RobotError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        for driver in &self.drivers {
            driver.request_stop();
        }
        let mut result = Ok(());
        for driver in &mut self.drivers {
            if let Err(e) = driver.join()
                && result.is_ok()
            {
                result = Err(e.into());
            }
        }
        {
            // 与 InputGate 的检查互斥
            let _log = self.log.lock();
            self.queue.shutdown();
        }
        self.log.flush()?;
        info!("Robot finished");
        result
    }
}

impl RobotIo for Robot {
    fn update(&mut self, timeout: Duration) -> Result<Option<BusEvent>, RobotError> {
        Robot::update(self, timeout)
    }

    fn execute(&mut self, message_id: &str, payload: Payload) -> Result<(), RobotError> {
        Robot::execute(self, message_id, payload)
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            error!("Robot shutdown failed: {}", e);
        }
    }
}
