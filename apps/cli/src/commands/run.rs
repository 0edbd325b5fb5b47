//! run 命令
//!
//! 按配置创建驱动，消费输入直到步数用完或 Ctrl-C

use super::control::{drive, install_stop_flag};
use anyhow::{Context, Result};
use clap::Args;
use rover_driver::DriverRegistry;
use rover_log::LogWriter;
use rover_robot::{Robot, RobotConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunCommand {
    /// 配置文件（TOML）
    pub config: PathBuf,

    /// 写入日志的说明
    #[arg(long)]
    pub note: Option<String>,

    /// 最多处理的 update 次数（缺省直到 Ctrl-C）
    #[arg(long)]
    pub steps: Option<usize>,

    /// 单次 update 的等待时间（毫秒）
    #[arg(long, default_value_t = 5000)]
    pub timeout_ms: u64,

    /// 日志文件名前缀（可以包含目录）
    #[arg(long, default_value = "robot-test-")]
    pub prefix: PathBuf,
}

impl RunCommand {
    pub fn execute(&self) -> Result<()> {
        let config = RobotConfig::load(&self.config)
            .with_context(|| format!("Failed to load config {}", self.config.display()))?;

        let note = self
            .note
            .clone()
            .unwrap_or_else(|| std::env::args().collect::<Vec<_>>().join(" "));
        let log = Arc::new(LogWriter::create(&self.prefix, &note).context("Failed to create log")?);
        config.log_snapshot(&log)?;

        println!("📁 日志: {}", log.filename().display());

        let registry = DriverRegistry::with_builtin();
        let mut robot = Robot::new(&config, log, &registry).context("Failed to create drivers")?;
        let running = install_stop_flag()?;
        robot.start()?;

        let result = drive(
            &mut robot,
            self.steps,
            Duration::from_millis(self.timeout_ms),
            &running,
        );
        // 无论循环是否出错都要停止驱动
        robot.finish()?;
        let stats = result?;

        println!();
        println!("✅ 完成: {} 步, {} 条消息, {} 次超时", stats.steps, stats.messages, stats.timeouts);
        for (name, metrics) in robot.metrics() {
            println!(
                "   {:<12} rx {:>8} B  decoded {:>6}  dropped {:>4} ({:.1}%)  sent {:>4}  skipped {:>4}",
                name,
                metrics.bytes_received,
                metrics.packets_decoded,
                metrics.packets_dropped,
                metrics.drop_rate(),
                metrics.commands_sent,
                metrics.commands_skipped
            );
        }
        Ok(())
    }
}
