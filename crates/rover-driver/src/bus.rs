//! 总线
//!
//! - [`BusChannel`]：无界 FIFO + 关闭信号。关闭通过 drop 一个专用通道的
//!   发送端实现，阻塞中的 `listen` 在 `select!` 中立即被唤醒。
//! - [`OutputGate`]：驱动发布消息的入口（由容器实现：写日志 + 入队）。
//! - [`DriverBus`]：交给单个驱动的句柄，包含输出门和该驱动的命令收件箱。

use crate::error::DriverError;
use crossbeam_channel::{Receiver, Sender, select};
use parking_lot::Mutex;
use rover_protocol::Payload;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::trace;

/// 总线已关闭
///
/// 区别于“暂时没有数据”（`Ok(None)`）的专用信号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusShutdown;

impl fmt::Display for BusShutdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bus shutdown")
    }
}

impl std::error::Error for BusShutdown {}

/// 多生产者单消费者通道，带协作关闭
pub struct BusChannel<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    /// drop 发送端即广播关闭
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    closed: AtomicBool,
}

impl<T> BusChannel<T> {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(0);
        Self {
            tx,
            rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            closed: AtomicBool::new(false),
        }
    }

    /// 入队；关闭后拒绝
    ///
    /// 与 [`shutdown`](Self::shutdown) 互斥：观察到关闭之后，
    /// 此前被接受的项都已在队列中。
    pub fn push(&self, item: T) -> Result<(), BusShutdown> {
        let guard = self.shutdown_tx.lock();
        if guard.is_none() {
            return Err(BusShutdown);
        }
        self.tx.send(item).map_err(|_| BusShutdown)
    }

    /// 等待下一项
    ///
    /// - `Ok(Some(item))`：收到数据
    /// - `Ok(None)`：超时
    /// - `Err(BusShutdown)`：已关闭（包括等待期间被关闭）
    ///
    /// `timeout` 为 `None` 时一直等待直到有数据或关闭。
    pub fn listen(&self, timeout: Option<Duration>) -> Result<Option<T>, BusShutdown> {
        if self.is_shutdown() {
            return Err(BusShutdown);
        }

        match timeout {
            Some(timeout) => select! {
                recv(self.rx) -> item => Ok(item.ok()),
                recv(self.shutdown_rx) -> _ => Err(BusShutdown),
                default(timeout) => Ok(None),
            },
            None => select! {
                recv(self.rx) -> item => Ok(item.ok()),
                recv(self.shutdown_rx) -> _ => Err(BusShutdown),
            },
        }
    }

    /// 非阻塞读取
    pub fn try_listen(&self) -> Result<Option<T>, BusShutdown> {
        if self.is_shutdown() {
            return Err(BusShutdown);
        }
        Ok(self.rx.try_recv().ok())
    }

    /// 取出队列中剩余的全部项（关闭后仍可调用）
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }

    /// 关闭通道（幂等）
    pub fn shutdown(&self) {
        let mut shutdown_tx = self.shutdown_tx.lock();
        if !self.closed.swap(true, Ordering::AcqRel) {
            trace!("Bus channel shutdown");
        }
        shutdown_tx.take();
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 队列中尚未消费的项数
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Default for BusChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// 消费者收到的总线事件
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    /// 写入日志时的相对时间
    pub elapsed: Duration,
    /// `驱动名.通道名`
    pub name: String,
    pub payload: Payload,
}

/// 驱动发布消息的入口
///
/// 实现方负责把消息写入日志并交给消费者，返回写入时间。
pub trait OutputGate: Send + Sync {
    fn input(&self, name: &str, payload: Payload) -> Result<Duration, DriverError>;
}

impl<F> OutputGate for F
where
    F: Fn(&str, Payload) -> Result<Duration, DriverError> + Send + Sync,
{
    fn input(&self, name: &str, payload: Payload) -> Result<Duration, DriverError> {
        self(name, payload)
    }
}

/// 单个驱动持有的总线句柄
#[derive(Clone)]
pub struct DriverBus {
    name: String,
    gate: Arc<dyn OutputGate>,
    inbox: Arc<BusChannel<Payload>>,
}

impl DriverBus {
    pub fn new(name: impl Into<String>, gate: Arc<dyn OutputGate>) -> Self {
        Self {
            name: name.into(),
            gate,
            inbox: Arc::new(BusChannel::new()),
        }
    }

    /// 驱动名称
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 消息全名：`驱动名.通道名`
    pub fn message_name(&self, channel: &str) -> String {
        format!("{}.{}", self.name, channel)
    }

    /// 发布消息
    pub fn publish(&self, channel: &str, payload: Payload) -> Result<Duration, DriverError> {
        self.gate.input(&self.message_name(channel), payload)
    }

    /// 投递外发命令到驱动收件箱
    ///
    /// 返回时命令已入队；总线关闭后返回 [`BusShutdown`]。
    pub fn send(&self, command: Payload) -> Result<(), BusShutdown> {
        self.inbox.push(command)
    }

    /// 等待下一条命令
    pub fn listen(&self, timeout: Option<Duration>) -> Result<Option<Payload>, BusShutdown> {
        self.inbox.listen(timeout)
    }

    pub fn try_listen(&self) -> Result<Option<Payload>, BusShutdown> {
        self.inbox.try_listen()
    }

    /// 取出收件箱中剩余的命令（停止时使用）
    pub fn drain_commands(&self) -> Vec<Payload> {
        self.inbox.drain()
    }

    pub fn shutdown(&self) {
        self.inbox.shutdown();
    }

    pub fn is_shutdown(&self) -> bool {
        self.inbox.is_shutdown()
    }

    /// 尚未处理的命令数
    pub fn pending_commands(&self) -> usize {
        self.inbox.len()
    }
}

impl fmt::Debug for DriverBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverBus")
            .field("name", &self.name)
            .field("pending_commands", &self.inbox.len())
            .field("shutdown", &self.inbox.is_shutdown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_listen_timeout_returns_none() {
        let channel: BusChannel<u32> = BusChannel::new();
        let start = Instant::now();
        assert_eq!(channel.listen(Some(Duration::from_millis(20))), Ok(None));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_fifo_order() {
        let channel = BusChannel::new();
        for i in 0..5 {
            channel.push(i).unwrap();
        }
        assert_eq!(channel.len(), 5);
        for i in 0..5 {
            assert_eq!(channel.listen(Some(Duration::ZERO)), Ok(Some(i)));
        }
        assert_eq!(channel.try_listen(), Ok(None));
    }

    #[test]
    fn test_shutdown_wakes_blocked_listener() {
        let channel: Arc<BusChannel<u32>> = Arc::new(BusChannel::new());
        let listener = {
            let channel = channel.clone();
            thread::spawn(move || channel.listen(None))
        };

        thread::sleep(Duration::from_millis(20));
        let start = Instant::now();
        channel.shutdown();
        assert_eq!(listener.join().unwrap(), Err(BusShutdown));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_shutdown_is_idempotent_and_sticky() {
        let channel = BusChannel::new();
        channel.push(1u8).unwrap();
        channel.shutdown();
        channel.shutdown();
        assert!(channel.is_shutdown());
        assert_eq!(channel.listen(Some(Duration::from_secs(1))), Err(BusShutdown));
        assert_eq!(channel.try_listen(), Err(BusShutdown));
        assert_eq!(channel.push(2), Err(BusShutdown));
        // 关闭前入队的数据仍可取出
        assert_eq!(channel.drain(), vec![1u8]);
    }

    #[test]
    fn test_concurrent_push_is_never_lost_after_shutdown() {
        let channel: Arc<BusChannel<u32>> = Arc::new(BusChannel::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let channel = channel.clone();
                thread::spawn(move || (0..1000).filter(|i| channel.push(p * 1000 + i).is_ok()).count())
            })
            .collect();

        thread::sleep(Duration::from_millis(1));
        channel.shutdown();
        // 关闭后立即取出的就是全部被接受的项
        let drained = channel.drain();
        let accepted: usize = producers.into_iter().map(|p| p.join().unwrap()).sum();
        assert_eq!(drained.len(), accepted);
        assert!(channel.drain().is_empty());
    }

    #[test]
    fn test_driver_bus_publish_uses_qualified_name() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let gate = {
            let seen = seen.clone();
            move |name: &str, payload: Payload| -> Result<Duration, DriverError> {
                seen.lock().push((name.to_string(), payload));
                Ok(Duration::from_millis(1))
            }
        };
        let bus = DriverBus::new("gps", Arc::new(gate));
        bus.publish("nmea", Payload::from("$GPGGA")).unwrap();
        assert_eq!(
            seen.lock().as_slice(),
            &[("gps.nmea".to_string(), Payload::from("$GPGGA"))]
        );
    }

    #[test]
    fn test_driver_bus_commands() {
        let gate = |_: &str, _: Payload| -> Result<Duration, DriverError> { Ok(Duration::ZERO) };
        let bus = DriverBus::new("spider", Arc::new(gate));
        bus.send(Payload::Int(1)).unwrap();
        assert_eq!(bus.pending_commands(), 1);
        assert_eq!(bus.try_listen(), Ok(Some(Payload::Int(1))));

        bus.shutdown();
        assert_eq!(bus.send(Payload::Int(2)), Err(BusShutdown));
    }
}
