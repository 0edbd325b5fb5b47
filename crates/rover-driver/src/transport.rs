//! 传输层
//!
//! 驱动线程独占一个 [`Transport`]，以有界超时轮询读取，
//! 从而在没有数据时也能及时响应停止请求。

use crate::error::TransportError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::{debug, info, trace};

/// 单次读取的缓冲区大小
const READ_BUFFER_SIZE: usize = 4096;

/// UDP 数据报最大长度
const MAX_DATAGRAM_SIZE: usize = 65536;

/// socket 读超时下限（0 表示永久阻塞，不能直接传入）
const MIN_SOCKET_TIMEOUT: Duration = Duration::from_millis(1);

/// 写超时：设备停止读取时不能让驱动线程永久阻塞
const WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// 字节流传输
pub trait Transport: Send {
    /// 读取下一块数据，超时返回 [`TransportError::Timeout`]
    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// 写出全部数据
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;
}

fn map_read_error(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => TransportError::Closed,
        _ => TransportError::Io(e),
    }
}

fn resolve(address: &str) -> Result<SocketAddr, TransportError> {
    address
        .to_socket_addrs()
        .map_err(|e| TransportError::InvalidAddress(format!("{}: {}", address, e)))?
        .next()
        .ok_or_else(|| TransportError::InvalidAddress(address.to_string()))
}

/// TCP 客户端
pub struct TcpTransport {
    stream: TcpStream,
    read_timeout: Option<Duration>,
}

impl TcpTransport {
    pub fn connect(address: &str, timeout: Duration) -> Result<Self, TransportError> {
        let addr = resolve(address)?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        info!("TCP transport connected to {}", addr);
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: TcpStream) -> Result<Self, TransportError> {
        stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        Ok(Self {
            stream,
            read_timeout: None,
        })
    }
}

impl Transport for TcpTransport {
    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let timeout = timeout.max(MIN_SOCKET_TIMEOUT);
        if self.read_timeout != Some(timeout) {
            self.stream.set_read_timeout(Some(timeout))?;
            self.read_timeout = Some(timeout);
        }

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        match self.stream.read(&mut buf) {
            Ok(0) => Err(TransportError::Closed),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            },
            Err(e) => Err(map_read_error(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(data).map_err(map_read_error)
    }
}

/// UDP（已 connect 到固定对端）
pub struct UdpTransport {
    socket: UdpSocket,
    read_timeout: Option<Duration>,
}

impl UdpTransport {
    pub fn connect(address: &str, bind: &str) -> Result<Self, TransportError> {
        let addr = resolve(address)?;
        let socket = UdpSocket::bind(bind)?;
        socket.connect(addr)?;
        info!("UDP transport bound to {} for {}", socket.local_addr()?, addr);
        Ok(Self {
            socket,
            read_timeout: None,
        })
    }
}

impl Transport for UdpTransport {
    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let timeout = timeout.max(MIN_SOCKET_TIMEOUT);
        if self.read_timeout != Some(timeout) {
            self.socket.set_read_timeout(Some(timeout))?;
            self.read_timeout = Some(timeout);
        }

        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        match self.socket.recv(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            },
            // 对端端口不可达（ICMP），每次 recv 都会立即返回；按超时处理
            Err(e) if e.kind() == io::ErrorKind::ConnectionRefused => {
                trace!("UDP peer unreachable");
                std::thread::sleep(timeout);
                Err(TransportError::Timeout)
            },
            Err(e) => Err(map_read_error(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.socket.send(data)?;
        Ok(())
    }
}

/// 串口（8N1，无流控）
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    read_timeout: Option<Duration>,
}

impl SerialTransport {
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(WRITE_TIMEOUT)
            .open()?;
        info!("Serial transport opened {} at {} baud", path, baud_rate);
        Ok(Self {
            port,
            read_timeout: None,
        })
    }
}

impl Transport for SerialTransport {
    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let timeout = timeout.max(MIN_SOCKET_TIMEOUT);
        if self.read_timeout != Some(timeout) {
            self.port.set_timeout(timeout)?;
            self.read_timeout = Some(timeout);
        }

        let mut buf = vec![0u8; READ_BUFFER_SIZE];
        match self.port.read(&mut buf) {
            Ok(0) => Err(TransportError::Timeout),
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            },
            Err(e) => Err(map_read_error(e)),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.port.write_all(data).map_err(map_read_error)
    }
}

/// 无设备：读取总是超时，写入被丢弃
#[derive(Debug, Default)]
pub struct NullTransport;

impl Transport for NullTransport {
    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        std::thread::sleep(timeout);
        Err(TransportError::Timeout)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        trace!("Null transport discarded {} bytes", data.len());
        Ok(())
    }
}

/// 内存传输（测试与回放）
///
/// 通过 [`ChannelTransport::pair`] 同时得到传输端和控制端；
/// 控制端 drop 后，读取返回 [`TransportError::Closed`]。
pub struct ChannelTransport {
    incoming: Receiver<Vec<u8>>,
    outgoing: Sender<Vec<u8>>,
}

/// [`ChannelTransport`] 的控制端
#[derive(Clone)]
pub struct ChannelTransportHandle {
    incoming: Sender<Vec<u8>>,
    outgoing: Receiver<Vec<u8>>,
}

impl ChannelTransport {
    pub fn pair() -> (Self, ChannelTransportHandle) {
        let (in_tx, in_rx) = crossbeam_channel::unbounded();
        let (out_tx, out_rx) = crossbeam_channel::unbounded();
        (
            Self {
                incoming: in_rx,
                outgoing: out_tx,
            },
            ChannelTransportHandle {
                incoming: in_tx,
                outgoing: out_rx,
            },
        )
    }
}

impl Transport for ChannelTransport {
    fn read(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        match self.incoming.recv_timeout(timeout) {
            Ok(data) => Ok(data),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.outgoing.send(data.to_vec()).map_err(|_| TransportError::Closed)
    }
}

impl ChannelTransportHandle {
    /// 模拟设备发来的字节
    pub fn feed(&self, data: impl Into<Vec<u8>>) -> Result<(), TransportError> {
        self.incoming.send(data.into()).map_err(|_| TransportError::Closed)
    }

    /// 等待驱动写出的下一块数据
    pub fn written(&self, timeout: Duration) -> Option<Vec<u8>> {
        self.outgoing.recv_timeout(timeout).ok()
    }

    /// 取出驱动已写出的全部数据
    pub fn drain_written(&self) -> Vec<Vec<u8>> {
        self.outgoing.try_iter().collect()
    }
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_udp_bind() -> String {
    "0.0.0.0:0".to_string()
}

fn default_baud() -> u32 {
    115_200
}

/// 传输配置（驱动配置表中的 `transport` 项）
///
/// ```toml
/// transport = { kind = "tcp", address = "192.168.1.10:2111" }
/// transport = { kind = "serial", port = "/dev/ttyUSB0", baud = 115200 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportConfig {
    Tcp {
        address: String,
        #[serde(default = "default_connect_timeout_ms")]
        connect_timeout_ms: u64,
    },
    Udp {
        address: String,
        #[serde(default = "default_udp_bind")]
        bind: String,
    },
    Serial {
        port: String,
        #[serde(default = "default_baud")]
        baud: u32,
    },
    Null,
}

impl TransportConfig {
    pub fn open(&self) -> Result<Box<dyn Transport>, TransportError> {
        debug!("Opening transport {:?}", self);
        match self {
            TransportConfig::Tcp {
                address,
                connect_timeout_ms,
            } => Ok(Box::new(TcpTransport::connect(
                address,
                Duration::from_millis(*connect_timeout_ms),
            )?)),
            TransportConfig::Udp { address, bind } => {
                Ok(Box::new(UdpTransport::connect(address, bind)?))
            },
            TransportConfig::Serial { port, baud } => Ok(Box::new(SerialTransport::open(port, *baud)?)),
            TransportConfig::Null => Ok(Box::new(NullTransport)),
        }
    }
}
