//! 驱动生命周期状态
//!
//! `Created → Running → StopRequested → Stopped`
//!
//! 未启动就请求停止的驱动直接进入 `Stopped`；接收循环因传输层关闭
//! 自行退出时也会进入 `Stopped`。

use std::sync::atomic::{AtomicU8, Ordering};

/// 驱动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DriverState {
    /// 已构造，线程未启动
    #[default]
    Created = 0,

    /// 接收循环运行中
    Running = 1,

    /// 已请求停止，等待接收循环退出
    StopRequested = 2,

    /// 接收循环已退出
    Stopped = 3,
}

impl DriverState {
    /// 从 u8 转换
    ///
    /// 无效值视为 `Stopped`。
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::StopRequested,
            _ => Self::Stopped,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    pub fn is_stopped(self) -> bool {
        self == Self::Stopped
    }
}

/// 驱动状态（原子版本，驱动线程与控制线程共享）
#[derive(Debug)]
pub struct AtomicDriverState {
    inner: AtomicU8,
}

impl AtomicDriverState {
    pub fn new(state: DriverState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> DriverState {
        DriverState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, state: DriverState) {
        self.inner.store(state.as_u8(), Ordering::Release);
    }

    /// 比较并交换
    ///
    /// 当前值等于 `current` 时设置为 `new` 并返回 true。
    pub fn compare_exchange(&self, current: DriverState, new: DriverState) -> bool {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for AtomicDriverState {
    fn default() -> Self {
        Self::new(DriverState::Created)
    }
}
