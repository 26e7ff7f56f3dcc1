//! # Avatar Driver
//!
//! Haptic Avatar 力反馈设备驱动，包括：
//! - 设备链路（同步请求/响应，带类型的查询与力命令）
//! - 采样/力循环（1 ms 周期，遥测 -> 力计算 -> 下发）
//! - 状态中继（0.5 ms 周期，把最新采样整体拷贝给仿真侧）
//! - 协作方注册（力反馈提供者、钳口控制器，运行中可替换）
//!
//! # 线程模型
//!
//! ```text
//!   仿真线程                采样/力循环 (avatar-haptic)        状态中继 (avatar-relay)
//!  handle_event ─┐        ┌─ 遥测 ─> HapticSample ──seqlock──> SimuSample ──> latest()
//!  attach_*  ────┴─ArcSwap┴─ 力 ─> DeviceLink ─> 串口
//! ```
//!
//! 设备链路只在采样/力循环线程内使用。两个采样缓冲区都是单写多读的 seqlock，
//! 读者永远看到某一次完整发布的值。
//!
//! # 使用示例
//!
//! ```no_run
//! use avatar_driver::HapticBuilder;
//!
//! # fn main() -> Result<(), avatar_driver::DriverError> {
//! let mut controller = HapticBuilder::new().port("/dev/ttyUSB0").build()?;
//! controller.start()?;
//! let state = controller.latest();
//! println!("jaw opening = {}", state.sample.jaw.opening_angle);
//! controller.shutdown()?;
//! # Ok(())
//! # }
//! ```

mod builder;
pub mod collaborators;
pub mod config;
mod controller;
pub mod device;
mod error;
pub mod geometry;
pub mod metrics;
pub mod mode;
pub mod pacing;
pub mod pipeline;
pub mod sample;

pub use builder::HapticBuilder;
pub use collaborators::{Collaborators, ForceFeedback, JawController, SimEvent, ToolFrame};
pub use config::{
    DeviceConfig, ForceConfig, HapticConfig, SerialConfig, TelemetryConfig, TimingConfig,
};
pub use controller::HapticController;
pub use device::{BoxedTransport, DEFAULT_RESET_MODE, DeviceLink, Response};
pub use error::DriverError;
pub use geometry::ToolGeometry;
pub use metrics::{LoopMetrics, LoopMetricsSnapshot, LoopTiming};
pub use mode::{AtomicLinkState, LinkState};
pub use pacing::PacingStrategy;
pub use pipeline::{HapticLoopConfig, LoopContext, RelayLoopConfig, haptic_loop, relay_loop};
pub use sample::{HapticSample, SampleReader, SampleWriter, SimuSample, sample_channel};

pub use avatar_protocol;
pub use avatar_serial;
