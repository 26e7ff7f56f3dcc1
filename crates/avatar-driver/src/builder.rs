//! Builder 模式实现
//!
//! 提供链式 API 创建 `HapticController` 实例。

use crate::config::HapticConfig;
use crate::controller::HapticController;
use crate::device::{BoxedTransport, DeviceLink};
use crate::error::DriverError;
use crate::pacing::PacingStrategy;
use avatar_serial::SerialTransport;
use std::time::Duration;
use tracing::info;

/// 控制器 Builder
///
/// # Example
///
/// ```no_run
/// use avatar_driver::HapticBuilder;
/// use std::time::Duration;
///
/// # fn main() -> Result<(), avatar_driver::DriverError> {
/// let controller = HapticBuilder::new()
///     .port("/dev/ttyUSB0")
///     .baud_rate(115_200)
///     .haptic_period(Duration::from_millis(1))
///     .force_scale(0.8)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct HapticBuilder {
    config: HapticConfig,
    transport: Option<BoxedTransport>,
}

impl HapticBuilder {
    pub fn new() -> Self {
        Self {
            config: HapticConfig::default(),
            transport: None,
        }
    }

    /// 整体替换配置（之后的链式调用在此基础上覆盖）
    pub fn config(mut self, config: HapticConfig) -> Self {
        self.config = config;
        self
    }

    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.config.device.port = port.into();
        self
    }

    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.config.serial.baud_rate = baud_rate;
        self
    }

    pub fn haptic_period(mut self, period: Duration) -> Self {
        self.config.timing.haptic_period_us = period.as_micros() as u64;
        self
    }

    pub fn relay_period(mut self, period: Duration) -> Self {
        self.config.timing.relay_period_us = period.as_micros() as u64;
        self
    }

    pub fn pacing(mut self, pacing: PacingStrategy) -> Self {
        self.config.timing.pacing = pacing;
        self
    }

    pub fn force_scale(mut self, scale: f64) -> Self {
        self.config.force.force_scale = scale;
        self
    }

    /// 每 N 次迭代发送一次周期统计（0 关闭）
    pub fn diagnostics_interval(mut self, interval: u64) -> Self {
        self.config.timing.diagnostics_interval = interval;
        self
    }

    /// 握手后发送的复位模式
    pub fn reset_on_connect(mut self, mode: Option<u8>) -> Self {
        self.config.device.reset_mode_on_connect = mode;
        self
    }

    /// 使用自定义传输（测试或非串口后端），忽略端口配置
    pub fn transport(mut self, transport: impl SerialTransport + Send + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// 校验配置、打开链路并完成握手
    ///
    /// # 错误
    /// - `Config`: 配置不合法，或未提供传输且未启用 `native` 后端
    /// - `ConnectionInit`: 端口无法打开或握手失败
    pub fn build(self) -> Result<HapticController, DriverError> {
        self.config.validate()?;

        let link = match self.transport {
            Some(transport) => DeviceLink::new(transport),
            None => open_port(&self.config)?,
        };
        info!(
            "Connecting to haptic device on {}",
            link.port_name().unwrap_or(&self.config.device.port)
        );

        let mut controller = HapticController::new(link, self.config);
        controller.connect()?;
        Ok(controller)
    }
}

impl Default for HapticBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "native")]
fn open_port(config: &HapticConfig) -> Result<DeviceLink, DriverError> {
    Ok(DeviceLink::open(&config.device.port, &config.serial))
}

#[cfg(not(feature = "native"))]
fn open_port(_config: &HapticConfig) -> Result<DeviceLink, DriverError> {
    Err(DriverError::Config(
        "no transport given and the native serial backend is disabled".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::LinkState;
    use avatar_serial::mock::mock_device;

    #[test]
    fn test_builder_overrides() {
        let builder = HapticBuilder::new()
            .port("/dev/ttyACM1")
            .baud_rate(57_600)
            .haptic_period(Duration::from_micros(2000))
            .relay_period(Duration::from_micros(1000))
            .pacing(PacingStrategy::Hybrid)
            .force_scale(0.25)
            .diagnostics_interval(500)
            .reset_on_connect(Some(3));

        let config = &builder.config;
        assert_eq!(config.device.port, "/dev/ttyACM1");
        assert_eq!(config.serial.baud_rate, 57_600);
        assert_eq!(config.timing.haptic_period_us, 2000);
        assert_eq!(config.timing.relay_period_us, 1000);
        assert_eq!(config.timing.pacing, PacingStrategy::Hybrid);
        assert_eq!(config.force.force_scale, 0.25);
        assert_eq!(config.timing.diagnostics_interval, 500);
        assert_eq!(config.device.reset_mode_on_connect, Some(3));
    }

    #[test]
    fn test_build_with_mock_transport() {
        let (transport, handle) = mock_device();
        handle.set_identity("HapticAvatar unit 3");

        let controller = HapticBuilder::new().transport(transport).build().unwrap();
        assert_eq!(controller.state(), LinkState::Connected);
        assert_eq!(controller.identity(), Some("HapticAvatar unit 3"));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let (transport, handle) = mock_device();
        let result = HapticBuilder::new()
            .transport(transport)
            .haptic_period(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(DriverError::Config(_))));
        // 配置错误时不触碰设备
        assert!(handle.requests().is_empty());
    }

    #[test]
    fn test_build_fails_when_device_silent() {
        let (transport, handle) = mock_device();
        handle.set_silent(true);
        let result = HapticBuilder::new().transport(transport).build();
        assert!(matches!(result, Err(DriverError::ConnectionInit(_))));
    }
}
