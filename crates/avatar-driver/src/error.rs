//! 驱动层错误类型定义

use crate::mode::LinkState;
use avatar_protocol::ProtocolError;
use avatar_serial::SerialError;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 链路未连接（端口未打开或握手未成功）
    #[error("Device link not connected")]
    NotConnected,

    /// 串口读写错误（写失败、读超时、缓冲溢出）
    #[error("Device IO error: {0}")]
    Io(#[from] SerialError),

    /// 响应格式错误或请求参数非法
    #[error("Protocol error: {0}")]
    Decode(#[from] ProtocolError),

    /// 启动时身份握手失败，不允许启动实时线程
    #[error("Connection init failed: {0}")]
    ConnectionInit(String),

    /// 当前生命周期状态不允许该操作
    #[error("Invalid state: expected {expected}, found {actual:?}")]
    InvalidState {
        expected: &'static str,
        actual: LinkState,
    },

    /// 配置非法或无法加载
    #[error("Config error: {0}")]
    Config(String),

    /// 实时线程创建失败
    #[error("Failed to spawn thread: {0}")]
    ThreadSpawn(std::io::Error),

    /// 实时线程 panic（最终释放力命令已由 drop guard 发送）
    #[error("Thread panicked: {0}")]
    ThreadPanicked(&'static str),
}

impl DriverError {
    /// 是否为可在下一周期重试的错误
    ///
    /// 循环内遇到此类错误只放弃本周期的更新。
    pub fn is_transient(&self) -> bool {
        match self {
            DriverError::Io(e) => !e.is_fatal(),
            DriverError::Decode(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_serial::{SerialDeviceError, SerialDeviceErrorKind};

    #[test]
    fn test_driver_error_display() {
        assert_eq!(
            format!("{}", DriverError::NotConnected),
            "Device link not connected"
        );

        let msg = format!("{}", DriverError::Io(SerialError::Timeout));
        assert!(msg.contains("Read timeout"), "Io error message: {}", msg);

        let msg = format!(
            "{}",
            DriverError::Decode(ProtocolError::TokenCount {
                expected: 4,
                actual: 2
            })
        );
        assert!(msg.contains("token count"), "Decode error message: {}", msg);

        let msg = format!(
            "{}",
            DriverError::InvalidState {
                expected: "Connected or Stopped",
                actual: LinkState::Running,
            }
        );
        assert!(msg.contains("Running"));

        let msg = format!("{}", DriverError::ConnectionInit("no identity".to_string()));
        assert!(msg.contains("no identity"));
    }

    #[test]
    fn test_from_conversions() {
        let e: DriverError = SerialError::BufferOverflow.into();
        assert!(matches!(e, DriverError::Io(SerialError::BufferOverflow)));

        let e: DriverError = ProtocolError::Empty.into();
        assert!(matches!(e, DriverError::Decode(ProtocolError::Empty)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(DriverError::Io(SerialError::Timeout).is_transient());
        assert!(DriverError::Decode(ProtocolError::Empty).is_transient());
        assert!(!DriverError::Io(SerialError::Closed).is_transient());
        assert!(
            !DriverError::Io(SerialError::Device(SerialDeviceError::new(
                SerialDeviceErrorKind::NoDevice,
                "unplugged"
            )))
            .is_transient()
        );
        assert!(!DriverError::NotConnected.is_transient());
        assert!(!DriverError::ConnectionInit("x".into()).is_transient());
    }
}
