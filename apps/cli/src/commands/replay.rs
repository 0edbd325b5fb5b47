//! replay 命令
//!
//! 按录制顺序重放输入；可选地用内置协议重新解码驱动的原始字节块

use super::control::{drive, install_stop_flag};
use anyhow::{Context, Result, bail};
use clap::Args;
use rover_driver::protocols::{Lidar, Line, Raw, Spider};
use rover_log::read_config;
use rover_robot::{DriverReplayReport, ReplayRobot, RobotConfig, verify_driver_replay};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Args, Debug)]
pub struct ReplayCommand {
    /// 录制的日志文件
    pub log: PathBuf,

    /// 使用指定配置（缺省使用日志中的快照）
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 跳过输出命令比对
    #[arg(long)]
    pub force: bool,

    /// 重新解码开启了 publish_raw 的驱动并比对
    #[arg(long)]
    pub verify_drivers: bool,
}

impl ReplayCommand {
    pub fn execute(&self) -> Result<()> {
        if !self.log.exists() {
            bail!("❌ 日志文件不存在: {}", self.log.display());
        }

        let config = match &self.config {
            Some(path) => RobotConfig::load(path)?,
            None => {
                let snapshot = read_config(&self.log)?
                    .with_context(|| format!("No config snapshot in {}", self.log.display()))?;
                RobotConfig::from_json(&snapshot)?
            },
        };

        println!("📁 文件: {}", self.log.display());
        let running = install_stop_flag()?;
        let mut replay = ReplayRobot::open(&self.log, &config, self.force)?;
        let stats = drive(&mut replay, None, Duration::ZERO, &running)?;

        println!("✅ 回放 {} 条输入", stats.messages);
        if !replay.mismatches().is_empty() {
            println!("⚠️  {} 处输出不一致", replay.mismatches().len());
        }
        if replay.unmatched_outputs() > 0 {
            println!("   {} 条录制的输出没有被重新产生", replay.unmatched_outputs());
        }

        if self.verify_drivers {
            let mut failed = 0;
            for name in config.drivers() {
                let driver_config = config.driver_config(name)?;
                if !driver_config.publish_raw() {
                    continue;
                }
                let report = verify(&self.log, config.stream_id(), name, driver_config.driver_kind())?;
                println!(
                    "   {:<12} {} 块, {} 一致, {} 不一致",
                    name,
                    report.chunks,
                    report.verified,
                    report.mismatches.len()
                );
                if !report.is_ok() {
                    failed += 1;
                }
            }
            if failed > 0 {
                bail!("{} driver(s) failed replay verification", failed);
            }
        }
        Ok(())
    }
}

/// 按驱动类型选择内置协议
fn verify(log: &Path, stream_id: u16, name: &str, kind: &str) -> Result<DriverReplayReport> {
    let report = match kind {
        "lidar" => verify_driver_replay(log, stream_id, name, Lidar::new())?,
        "spider" => verify_driver_replay(log, stream_id, name, Spider::new())?,
        "line" => verify_driver_replay(log, stream_id, name, Line::new())?,
        "raw" => verify_driver_replay(log, stream_id, name, Raw)?,
        other => bail!("No built-in protocol for driver kind {}", other),
    };
    Ok(report)
}
