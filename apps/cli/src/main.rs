//! # Rover CLI
//!
//! ```bash
//! # 在真实硬件上运行，日志写入当前目录
//! rover-cli run robot.toml --note "parking lot test"
//!
//! # 回放日志（配置取自日志中的快照）
//! rover-cli replay robot-test-240518_101500.log
//!
//! # 查看日志内容
//! rover-cli dump robot-test-240518_101500.log --stream 1 --stream 2
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{DumpCommand, ReplayCommand, RunCommand};

/// Rover CLI - 机器人中间件命令行工具
#[derive(Parser, Debug)]
#[command(name = "rover-cli")]
#[command(about = "Run drivers, replay and inspect rover logs", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 在真实硬件上运行
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 从日志回放
    Replay {
        #[command(flatten)]
        args: ReplayCommand,
    },

    /// 打印日志记录
    Dump {
        #[command(flatten)]
        args: DumpCommand,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("rover=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run { args } => args.execute(),
        Commands::Replay { args } => args.execute(),
        Commands::Dump { args } => args.execute(),
    }
}
