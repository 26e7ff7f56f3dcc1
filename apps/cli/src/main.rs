//! # Avatar CLI
//!
//! Haptic Avatar 力反馈设备命令行工具。
//!
//! ```bash
//! # 查询身份与状态
//! avatar-cli --port /dev/ttyUSB0 identity
//! avatar-cli --port /dev/ttyUSB0 status
//!
//! # 释放力输出 / 复位
//! avatar-cli release
//! avatar-cli reset --mode 15
//!
//! # 运行实时线程并打印状态（无硬件时使用 --mock）
//! avatar-cli --mock monitor --frequency 20 --duration 5
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod utils;

use commands::{MonitorCommand, ResetCommand};
use utils::ConnectArgs;

/// monitor 未配置诊断间隔时使用的默认值（每秒一条统计）
const MONITOR_DIAGNOSTICS_INTERVAL: u64 = 1000;

/// Avatar CLI - 力反馈设备命令行工具
#[derive(Parser, Debug)]
#[command(name = "avatar-cli")]
#[command(about = "Command-line interface for Haptic Avatar force-feedback devices", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connect: ConnectArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 查询设备身份
    Identity,

    /// 查询工具 ID、状态字与电机缩放系数
    Status,

    /// 释放所有电机输出
    Release,

    /// 复位设备
    Reset {
        #[command(flatten)]
        args: ResetCommand,
    },

    /// 运行采样/力循环并监控状态
    Monitor {
        #[command(flatten)]
        args: MonitorCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "avatar_cli=info,avatar_driver=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = cli.connect.load_config()?;
    if matches!(cli.command, Commands::Monitor { .. }) && config.timing.diagnostics_interval == 0 {
        config.timing.diagnostics_interval = MONITOR_DIAGNOSTICS_INTERVAL;
    }
    let mut controller = cli.connect.connect(config)?;

    match cli.command {
        Commands::Identity => commands::identity(&mut controller),
        Commands::Status => commands::status(&mut controller),
        Commands::Release => commands::release(&mut controller),
        Commands::Reset { args } => commands::reset(&mut controller, &args),
        Commands::Monitor { args } => args.execute(&mut controller),
    }
}
