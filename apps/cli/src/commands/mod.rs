//! 命令定义和实现

pub mod device;
pub mod monitor;

pub use device::{ResetCommand, identity, release, reset, status};
pub use monitor::MonitorCommand;
