//! 控制逻辑面向的统一接口
//!
//! 控制循环只依赖 [`RobotIo`]，因此同一份控制代码既可以驱动真实硬件
//! （[`Robot`](crate::Robot)），也可以在日志上回放（[`ReplayRobot`](crate::ReplayRobot)）。

use crate::error::RobotError;
use rover_driver::BusEvent;
use rover_protocol::Payload;
use std::time::Duration;

pub trait RobotIo {
    /// 取下一条输入消息
    ///
    /// 超时返回 `Ok(None)`；总线关闭或日志结束返回 [`RobotError::Shutdown`]。
    fn update(&mut self, timeout: Duration) -> Result<Option<BusEvent>, RobotError>;

    /// 输出一条命令
    fn execute(&mut self, message_id: &str, payload: Payload) -> Result<(), RobotError>;
}
