//! 驱动线程
//!
//! [`StreamDriver`] 把任意 [`Protocol`] 与 [`Transport`] 组合成一个驱动：
//! 独立线程中循环执行
//!
//! 1. 处理积压的外发命令（单次最多 32 条）
//! 2. 以有界超时读取传输层
//! 3. 分帧、解码、发布；每条消息后写一次轮询请求
//!
//! 停止请求通过关闭驱动的总线收件箱传达，循环在下一个周期退出，
//! 最长延迟为一个读取超时。

use crate::bus::DriverBus;
use crate::config::{DEFAULT_RECEIVE_TIMEOUT, DriverConfig};
use crate::error::{DriverError, TransportError};
use crate::metrics::{DriverMetrics, MetricsSnapshot};
use crate::protocol::{Decoded, Protocol};
use crate::state::{AtomicDriverState, DriverState};
use crate::transport::Transport;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use rover_protocol::{Payload, StreamBuffer};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Drop 时等待驱动线程退出的上限
const DROP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 单次处理的最大命令数，避免命令洪峰阻塞接收
const MAX_DRAIN_PER_CYCLE: usize = 32;

/// 接收线程句柄
///
/// 线程退出（包括 panic）时 `done` 的发送端随之 drop，
/// 因此可以带超时等待而不交出 `JoinHandle`。
struct LoopThread {
    handle: JoinHandle<()>,
    done: Receiver<()>,
}

impl LoopThread {
    fn spawn(name: String, f: impl FnOnce() + Send + 'static) -> std::io::Result<Self> {
        let (done_tx, done) = crossbeam_channel::bounded::<()>(0);
        let handle = std::thread::Builder::new().name(name).spawn(move || {
            let _done = done_tx;
            f();
        })?;
        Ok(Self { handle, done })
    }

    /// 等待线程结束；超时返回 `false`，句柄保持不变
    fn wait(&self, timeout: Duration) -> bool {
        matches!(self.done.recv_timeout(timeout), Err(RecvTimeoutError::Disconnected))
    }
}

/// 驱动接口
///
/// 容器只通过这个接口管理驱动：启动、请求停止、等待退出、投递命令。
pub trait Driver: Send {
    fn name(&self) -> &str;

    fn state(&self) -> DriverState;

    /// 启动接收线程（只能调用一次）
    fn start(&mut self) -> Result<(), DriverError>;

    /// 请求停止（幂等，不阻塞）
    fn request_stop(&self);

    /// 等待接收线程退出
    fn join(&mut self) -> Result<(), DriverError>;

    /// 带超时等待接收线程退出
    fn join_timeout(&mut self, timeout: Duration) -> Result<(), DriverError>;

    /// 投递外发命令
    ///
    /// 返回时命令已进入驱动收件箱；是否实际发出由协议状态决定。
    fn send(&self, command: Payload) -> Result<(), DriverError>;

    fn metrics(&self) -> MetricsSnapshot;
}

/// 接收循环参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOptions {
    /// 传输层读取超时（也是响应停止请求的最大延迟）
    pub receive_timeout: Duration,
    /// 把收到的原始字节块发布到 `<name>.raw`
    pub publish_raw: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            publish_raw: false,
        }
    }
}

impl LoopOptions {
    pub fn from_config(config: &DriverConfig) -> Result<Self, DriverError> {
        Ok(Self {
            receive_timeout: config.receive_timeout()?,
            publish_raw: config.publish_raw(),
        })
    }
}

/// 协议 + 传输组成的流式驱动
pub struct StreamDriver<P: Protocol> {
    bus: DriverBus,
    state: Arc<AtomicDriverState>,
    metrics: Arc<DriverMetrics>,
    options: LoopOptions,
    /// 启动前持有，启动时移交给接收线程
    parts: Option<(P, Box<dyn Transport>)>,
    thread: Option<LoopThread>,
}

impl<P: Protocol> StreamDriver<P> {
    pub fn new(protocol: P, transport: Box<dyn Transport>, bus: DriverBus, options: LoopOptions) -> Self {
        Self {
            bus,
            state: Arc::new(AtomicDriverState::default()),
            metrics: Arc::new(DriverMetrics::new()),
            options,
            parts: Some((protocol, transport)),
            thread: None,
        }
    }

    pub fn options(&self) -> LoopOptions {
        self.options
    }

    fn finish_join(&mut self, result: std::thread::Result<()>) -> Result<(), DriverError> {
        result.map_err(|_| {
            self.state.set(DriverState::Stopped);
            self.bus.shutdown();
            DriverError::ThreadPanicked(self.bus.name().to_string())
        })
    }
}

impl<P: Protocol> Driver for StreamDriver<P> {
    fn name(&self) -> &str {
        self.bus.name()
    }

    fn state(&self) -> DriverState {
        self.state.get()
    }

    fn start(&mut self) -> Result<(), DriverError> {
        if !self.state.compare_exchange(DriverState::Created, DriverState::Running) {
            return Err(DriverError::AlreadyStarted(self.name().to_string()));
        }
        let Some((protocol, transport)) = self.parts.take() else {
            return Err(DriverError::AlreadyStarted(self.name().to_string()));
        };

        let ctx = LoopContext {
            bus: self.bus.clone(),
            state: self.state.clone(),
            metrics: self.metrics.clone(),
            options: self.options,
        };
        let thread = LoopThread::spawn(format!("driver-{}", self.bus.name()), move || {
            receive_loop(protocol, transport, ctx)
        })
        .map_err(|e| {
            self.state.set(DriverState::Stopped);
            DriverError::ThreadSpawn(e)
        })?;

        info!("Driver {} started", self.bus.name());
        self.thread = Some(thread);
        Ok(())
    }

    fn request_stop(&self) {
        // 未启动的驱动直接结束
        if !self.state.compare_exchange(DriverState::Running, DriverState::StopRequested) {
            self.state.compare_exchange(DriverState::Created, DriverState::Stopped);
        }
        self.bus.shutdown();
        debug!("Driver {} stop requested", self.bus.name());
    }

    fn join(&mut self) -> Result<(), DriverError> {
        match self.thread.take() {
            Some(thread) => {
                let result = thread.handle.join();
                self.finish_join(result)
            },
            None => Ok(()),
        }
    }

    fn join_timeout(&mut self, timeout: Duration) -> Result<(), DriverError> {
        if let Some(thread) = &self.thread
            && !thread.wait(timeout)
        {
            return Err(DriverError::Timeout);
        }
        self.join()
    }

    fn send(&self, command: Payload) -> Result<(), DriverError> {
        self.bus.send(command)?;
        Ok(())
    }

    fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

impl<P: Protocol> Drop for StreamDriver<P> {
    fn drop(&mut self) {
        self.request_stop();
        if let Err(e) = self.join_timeout(DROP_JOIN_TIMEOUT) {
            error!("Driver {} failed to shut down: {}", self.bus.name(), e);
        }
    }
}

struct LoopContext {
    bus: DriverBus,
    state: Arc<AtomicDriverState>,
    metrics: Arc<DriverMetrics>,
    options: LoopOptions,
}

fn write_out(transport: &mut dyn Transport, data: &[u8], ctx: &LoopContext) {
    if let Err(e) = transport.write(data) {
        error!("Driver {}: transport write failed: {}", ctx.bus.name(), e);
        DriverMetrics::incr(&ctx.metrics.transport_errors);
    }
}

fn send_command<P: Protocol>(
    protocol: &mut P,
    transport: &mut dyn Transport,
    ctx: &LoopContext,
    command: Payload,
) {
    if !protocol.is_ready() {
        warn!(
            "Driver {}: {} not initialized, skipping command {}",
            ctx.bus.name(),
            protocol.name(),
            command
        );
        DriverMetrics::incr(&ctx.metrics.commands_skipped);
        return;
    }

    match protocol.encode_command(&command) {
        Ok(bytes) => {
            write_out(transport, &bytes, ctx);
            DriverMetrics::incr(&ctx.metrics.commands_sent);
        },
        Err(e) => error!("Driver {}: {}", ctx.bus.name(), e),
    }
}

/// 处理积压的外发命令
///
/// 返回 `true` 表示总线已关闭，循环应退出；此时收件箱中剩余的命令全部发出。
fn drain_commands<P: Protocol>(protocol: &mut P, transport: &mut dyn Transport, ctx: &LoopContext) -> bool {
    for _ in 0..MAX_DRAIN_PER_CYCLE {
        match ctx.bus.try_listen() {
            Ok(Some(command)) => send_command(protocol, transport, ctx, command),
            Ok(None) | Err(_) => break,
        }
    }

    if !ctx.bus.is_shutdown() {
        return false;
    }
    for command in ctx.bus.drain_commands() {
        send_command(protocol, transport, ctx, command);
    }
    true
}

fn publish(ctx: &LoopContext, channel: &str, payload: Payload) {
    match ctx.bus.publish(channel, payload) {
        Ok(_) => DriverMetrics::incr(&ctx.metrics.messages_published),
        Err(e) => error!("Driver {}: publish {} failed: {}", ctx.bus.name(), channel, e),
    }
}

/// 接收线程主循环
fn receive_loop<P: Protocol>(mut protocol: P, mut transport: Box<dyn Transport>, ctx: LoopContext) {
    let mut buffer = StreamBuffer::new(protocol.framer());

    if let Some(request) = protocol.on_start() {
        write_out(transport.as_mut(), &request, &ctx);
    }

    loop {
        if drain_commands(&mut protocol, transport.as_mut(), &ctx) {
            break;
        }

        let data = match transport.read(ctx.options.receive_timeout) {
            Ok(data) => data,
            Err(TransportError::Timeout) => {
                DriverMetrics::incr(&ctx.metrics.rx_timeouts);
                continue;
            },
            Err(TransportError::Closed) => {
                warn!("Driver {}: transport closed", ctx.bus.name());
                ctx.bus.shutdown();
                let dropped = ctx.bus.drain_commands().len();
                if dropped > 0 {
                    warn!("Driver {}: dropped {} pending commands", ctx.bus.name(), dropped);
                    DriverMetrics::add(&ctx.metrics.commands_skipped, dropped as u64);
                }
                break;
            },
            Err(e) => {
                error!("Driver {}: transport read failed: {}", ctx.bus.name(), e);
                DriverMetrics::incr(&ctx.metrics.transport_errors);
                continue;
            },
        };

        DriverMetrics::add(&ctx.metrics.bytes_received, data.len() as u64);
        if ctx.options.publish_raw {
            publish(&ctx, "raw", Payload::Bytes(data.clone()));
        }

        for packet in buffer.push(&data) {
            DriverMetrics::incr(&ctx.metrics.packets_total);
            match protocol.decode(&packet) {
                Decoded::Message { channel, payload } => {
                    DriverMetrics::incr(&ctx.metrics.packets_decoded);
                    publish(&ctx, channel, payload);
                    if let Some(request) = protocol.poll_request() {
                        write_out(transport.as_mut(), &request, &ctx);
                    }
                },
                Decoded::Reply(bytes) => {
                    DriverMetrics::incr(&ctx.metrics.packets_decoded);
                    write_out(transport.as_mut(), &bytes, &ctx);
                },
                Decoded::Noise => {
                    DriverMetrics::incr(&ctx.metrics.packets_dropped);
                    trace!("Driver {}: dropped {} byte packet", ctx.bus.name(), packet.len());
                },
            }
        }
    }

    ctx.bus.shutdown();
    ctx.state.set(DriverState::Stopped);
    trace!("Driver {}: receive loop exited", ctx.bus.name());
}
