//! # Rover Driver
//!
//! 驱动层：每个驱动独占一个传输通道和一个接收缓冲区，在独立线程中运行
//! 接收循环（读取 → 分帧 → 解码 → 发布），并通过总线接收外发命令。
//!
//! ## 模块
//!
//! - `bus`: 总线通道（多生产者单消费者，支持协作关闭）
//! - `transport`: 传输层抽象（TCP / UDP / Null / 内存通道）
//! - `protocol`: 协议抽象，`protocols` 中为内置协议
//! - `driver`: 驱动线程与生命周期状态机
//! - `registry`: 驱动注册表（显式传入容器，无全局状态）

pub mod bus;
pub mod config;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod protocols;
pub mod registry;
pub mod state;
pub mod transport;

pub use bus::{BusChannel, BusEvent, BusShutdown, DriverBus, OutputGate};
pub use config::DriverConfig;
pub use driver::{Driver, LoopOptions, StreamDriver};
pub use error::{DriverError, TransportError};
pub use metrics::{DriverMetrics, MetricsSnapshot};
pub use protocol::{Decoded, Protocol};
pub use registry::{DriverFactory, DriverRegistry};
pub use state::{AtomicDriverState, DriverState};
pub use transport::{
    ChannelTransport, ChannelTransportHandle, NullTransport, TcpTransport, Transport,
    TransportConfig, UdpTransport,
};
