//! 驱动配置
//!
//! 所有字段都有默认值，TOML 文件中只需写出需要覆盖的项。
//!
//! ```toml
//! [serial]
//! baud_rate = 115200
//! read_timeout_ms = 5
//!
//! [timing]
//! haptic_period_us = 1000
//! relay_period_us = 500
//! pacing = "spin"
//! diagnostics_interval = 0
//!
//! [force]
//! force_scale = 1.0
//!
//! [telemetry]
//! poll_jaw = true
//! poll_collision_force = false
//!
//! [device]
//! port = "/dev/ttyUSB0"
//! reset_mode_on_connect = 15
//! ```

use crate::error::DriverError;
use crate::geometry::ToolGeometry;
use crate::pacing::PacingStrategy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 串口参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud_rate: u32,
    /// 单次读超时（毫秒），限制慢设备在循环内的阻塞时间
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout_ms: 5,
        }
    }
}

impl SerialConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// 实时线程节拍
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// 采样/力循环目标周期（微秒）
    pub haptic_period_us: u64,
    /// 状态中继目标周期（微秒）
    pub relay_period_us: u64,
    pub pacing: PacingStrategy,
    /// 每 N 次迭代发送一次周期统计；0 关闭
    pub diagnostics_interval: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            haptic_period_us: 1000,
            relay_period_us: 500,
            pacing: PacingStrategy::Spin,
            diagnostics_interval: 0,
        }
    }
}

impl TimingConfig {
    pub fn haptic_period(&self) -> Duration {
        Duration::from_micros(self.haptic_period_us)
    }

    pub fn relay_period(&self) -> Duration {
        Duration::from_micros(self.relay_period_us)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    /// 输出力缩放系数
    pub force_scale: f64,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self { force_scale: 1.0 }
    }
}

/// 可选遥测项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// 每周期读取钳口张开程度与力矩
    pub poll_jaw: bool,
    /// 每周期读取最近碰撞力
    pub poll_collision_force: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            poll_jaw: true,
            poll_collision_force: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// 串口路径
    pub port: String,
    /// 握手成功后发送的复位模式；未设置则不复位
    pub reset_mode_on_connect: Option<u8>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            reset_mode_on_connect: None,
        }
    }
}

/// 驱动完整配置
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticConfig {
    pub serial: SerialConfig,
    pub timing: TimingConfig,
    pub force: ForceConfig,
    pub telemetry: TelemetryConfig,
    pub geometry: ToolGeometry,
    pub device: DeviceConfig,
}

impl HapticConfig {
    /// 从 TOML 文本解析并校验
    ///
    /// # Example
    ///
    /// ```
    /// use avatar_driver::HapticConfig;
    ///
    /// let config = HapticConfig::from_toml_str("[timing]\nhaptic_period_us = 2000\n").unwrap();
    /// assert_eq!(config.timing.haptic_period_us, 2000);
    /// assert_eq!(config.timing.relay_period_us, 500);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, DriverError> {
        let config: Self =
            toml::from_str(text).map_err(|e| DriverError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件加载并校验
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DriverError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// 校验取值范围
    ///
    /// - 两个周期必须大于 0
    /// - 读超时不得超过采样周期的 10 倍
    /// - 力缩放系数为有限值，几何尺寸为正
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.timing.haptic_period_us == 0 || self.timing.relay_period_us == 0 {
            return Err(DriverError::Config(
                "haptic_period_us and relay_period_us must be > 0".to_string(),
            ));
        }
        if self.serial.baud_rate == 0 {
            return Err(DriverError::Config("baud_rate must be > 0".to_string()));
        }
        if self.serial.read_timeout_ms.saturating_mul(1000)
            > self.timing.haptic_period_us.saturating_mul(10)
        {
            return Err(DriverError::Config(format!(
                "read_timeout_ms ({}) exceeds 10x the haptic period ({} us)",
                self.serial.read_timeout_ms, self.timing.haptic_period_us
            )));
        }
        if !self.force.force_scale.is_finite() {
            return Err(DriverError::Config("force_scale must be finite".to_string()));
        }
        if !self.geometry.is_valid() {
            return Err(DriverError::Config(
                "geometry dimensions must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
