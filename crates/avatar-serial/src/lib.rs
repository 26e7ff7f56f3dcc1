//! # Avatar Serial Transport Layer
//!
//! 串口传输抽象层，为设备链路提供统一的"写一行 / 读一行"接口。
//!
//! - [`SerialTransport`]: 传输层 trait，设备链路只依赖此接口
//! - [`LineAssembler`]: 行重组缓冲，处理跨多次 `read` 到达的响应
//! - [`SerialPortTransport`]: 基于 `serialport` 的真实串口后端（`native` 特性）
//! - `mock`: 模拟设备（`mock` 特性），按协议应答并记录所有请求

use std::time::Duration;
use thiserror::Error;

mod line;
pub use line::LineAssembler;

#[cfg(feature = "native")]
mod port;
#[cfg(feature = "native")]
pub use port::{PortSettings, SerialPortTransport, list_ports};

#[cfg(feature = "mock")]
pub mod mock;

/// 单次调用的固定接收缓冲区长度（字节）
///
/// 协议中最长的响应为 4 个浮点数，加上行结束符远小于此长度。
pub const RECEIVE_BUFFER_LEN: usize = 256;

/// 串口传输层统一错误类型
#[derive(Error, Debug)]
pub enum SerialError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] SerialDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Receive buffer overflow")]
    BufferOverflow,
    #[error("Port closed")]
    Closed,
}

impl SerialError {
    /// 是否为致命错误（重试无意义，需要重新打开端口）
    pub fn is_fatal(&self) -> bool {
        match self {
            SerialError::Device(e) => e.is_fatal(),
            SerialError::Closed => true,
            _ => false,
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialDeviceErrorKind {
    Unknown,
    NotFound,
    NoDevice,
    AccessDenied,
    InvalidConfig,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct SerialDeviceError {
    pub kind: SerialDeviceErrorKind,
    pub message: String,
}

impl SerialDeviceError {
    pub fn new(kind: SerialDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            SerialDeviceErrorKind::NoDevice
                | SerialDeviceErrorKind::AccessDenied
                | SerialDeviceErrorKind::NotFound
        )
    }
}

impl From<String> for SerialDeviceError {
    fn from(message: String) -> Self {
        Self::new(SerialDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for SerialDeviceError {
    fn from(message: &str) -> Self {
        Self::new(SerialDeviceErrorKind::Unknown, message)
    }
}

/// 行式串口传输
///
/// 实现者负责把字节流切分为以 `\n` 结尾的行。
/// `read_line` 写入调用方提供的定长缓冲区，返回行长度（不含 `\n`），
/// 超出缓冲区长度的行返回 `BufferOverflow`，且该行会被完整丢弃以保持同步。
pub trait SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError>;
    fn read_line(&mut self, buf: &mut [u8]) -> Result<usize, SerialError>;
    fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), SerialError> {
        Ok(())
    }
    /// 丢弃所有已接收但未读取的字节（错误后重新对齐请求/响应）
    fn clear_input(&mut self) -> Result<(), SerialError> {
        Ok(())
    }
    fn name(&self) -> &str {
        "serial"
    }
}

impl<T: SerialTransport + ?Sized> SerialTransport for Box<T> {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        (**self).write_all(bytes)
    }

    fn read_line(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        (**self).read_line(buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
        (**self).set_read_timeout(timeout)
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        (**self).clear_input()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_error_display() {
        assert_eq!(format!("{}", SerialError::Timeout), "Read timeout");
        assert_eq!(
            format!("{}", SerialError::BufferOverflow),
            "Receive buffer overflow"
        );
        let e = SerialError::Device(SerialDeviceError::new(
            SerialDeviceErrorKind::NotFound,
            "/dev/ttyUSB9",
        ));
        assert!(format!("{}", e).contains("NotFound"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(!SerialError::Timeout.is_fatal());
        assert!(!SerialError::BufferOverflow.is_fatal());
        assert!(SerialError::Closed.is_fatal());
        assert!(
            SerialError::Device(SerialDeviceError::new(SerialDeviceErrorKind::NoDevice, "gone"))
                .is_fatal()
        );
        assert!(!SerialError::Device("busy".into()).is_fatal());
    }
}
