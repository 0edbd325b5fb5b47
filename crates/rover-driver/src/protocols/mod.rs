//! 内置协议
//!
//! | 注册键 | 分帧 | 消息 |
//! |---|---|---|
//! | `lidar` | STX/ETX | `scan` |
//! | `spider` | CAN 桥接 | `can`, `bridge` |
//! | `line` | 换行 | `line` |
//! | `raw` | 不分帧 | `data` |

pub mod lidar;
pub mod line;
pub mod raw;
pub mod spider;

pub use lidar::Lidar;
pub use line::Line;
pub use raw::Raw;
pub use spider::Spider;

use crate::error::DriverError;
use rover_protocol::Payload;

pub(crate) fn unsupported(driver: &str, command: &Payload) -> DriverError {
    DriverError::UnsupportedCommand {
        driver: driver.to_string(),
        kind: command.kind(),
    }
}
