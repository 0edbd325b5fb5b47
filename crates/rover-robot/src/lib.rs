//! # Rover Robot
//!
//! 驱动容器与回放：
//!
//! - [`RobotConfig`]: TOML 配置（`[robot]` 段 + 每个驱动的参数表）
//! - [`Robot`]: 创建、启动、停止驱动；所有驱动输出经 [`InputGate`] 写日志后入队
//! - [`ReplayRobot`]: 在日志上重放输入并校验输出命令
//! - [`RobotIo`]: 控制逻辑面向的统一接口，真实运行与回放共用
//!
//! # 示例
//!
//! ```no_run
//! use rover_driver::DriverRegistry;
//! use rover_log::LogWriter;
//! use rover_robot::{Robot, RobotConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RobotConfig::load("robot.toml")?;
//! let log = Arc::new(LogWriter::create("robot-test-", "bench run")?);
//! config.log_snapshot(&log)?;
//!
//! let mut robot = Robot::new(&config, log, &DriverRegistry::with_builtin())?;
//! robot.start()?;
//! for _ in 0..1000 {
//!     if let Some(event) = robot.update(Duration::from_secs(5))? {
//!         println!("{} {}", event.name, event.payload);
//!     }
//! }
//! robot.finish()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod replay;
pub mod robot;

pub use config::{RobotConfig, RobotSection};
pub use error::RobotError;
pub use io::RobotIo;
pub use replay::{DriverMismatch, DriverReplayReport, ReplayRobot, verify_driver_replay};
pub use robot::{InputGate, Robot};
