//! 共用的控制循环
//!
//! 真实运行和回放都走这里，只依赖 [`RobotIo`]。

use anyhow::Result;
use rover_robot::{RobotError, RobotIo};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// 循环统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoopStats {
    pub steps: usize,
    pub messages: usize,
    pub timeouts: usize,
}

/// 注册 Ctrl-C 处理器，返回运行标志
pub fn install_stop_flag() -> Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("🛑 收到停止信号，正在停止...");
        flag.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}

/// 消费输入直到步数用完、总线关闭或收到停止信号
pub fn drive(
    io: &mut dyn RobotIo,
    steps: Option<usize>,
    timeout: Duration,
    running: &AtomicBool,
) -> Result<LoopStats> {
    let mut stats = LoopStats::default();
    while running.load(Ordering::SeqCst) && steps.is_none_or(|max| stats.steps < max) {
        stats.steps += 1;
        match io.update(timeout) {
            Ok(Some(event)) => {
                stats.messages += 1;
                debug!("{:>10.3}s {} {}", event.elapsed.as_secs_f64(), event.name, event.payload);
            },
            Ok(None) => {
                stats.timeouts += 1;
                warn!("No input within {:?}", timeout);
            },
            Err(RobotError::Shutdown) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(stats)
}
