//! 连接工具
//!
//! 按全局参数加载配置并创建控制器（真实串口或模拟设备）。

use anyhow::{Context, Result};
use avatar_driver::avatar_serial::mock::mock_device;
use avatar_driver::{HapticBuilder, HapticConfig, HapticController};
use std::path::PathBuf;

/// 所有子命令共用的连接参数
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// 串口路径（覆盖配置文件）
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// TOML 配置文件
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 使用内存模拟设备（无需硬件）
    #[arg(long, global = true)]
    pub mock: bool,
}

impl ConnectArgs {
    /// 合并配置文件与命令行参数
    pub fn load_config(&self) -> Result<HapticConfig> {
        let mut config = match &self.config {
            Some(path) => HapticConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => HapticConfig::default(),
        };
        if let Some(port) = &self.port {
            config.device.port = port.clone();
        }
        Ok(config)
    }

    /// 创建控制器并完成握手
    pub fn connect(&self, config: HapticConfig) -> Result<HapticController> {
        let mut builder = HapticBuilder::new().config(config);
        if self.mock {
            let (transport, handle) = mock_device();
            handle.set_angles([0.0, 0.1, 12.5, -0.05]);
            handle.set_jaw(0.4, 0.8);
            builder = builder.transport(transport);
            println!("🧪 使用模拟设备");
        } else {
            println!("🔌 连接到设备...");
        }
        let controller = builder.build().context("failed to connect to haptic device")?;
        println!("✅ 已连接: {}", controller.identity().unwrap_or("?"));
        Ok(controller)
    }
}
