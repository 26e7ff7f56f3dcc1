//! 基于 `serialport` 的真实串口后端

use crate::{LineAssembler, SerialDeviceError, SerialDeviceErrorKind, SerialError, SerialTransport};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info};

/// 串口参数
///
/// 设备使用 8N1、无流控。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    /// 波特率
    pub baud_rate: u32,
    /// 读超时（单次 `read` 调用的上限）
    pub read_timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout: Duration::from_millis(5),
        }
    }
}

impl From<serialport::Error> for SerialError {
    fn from(e: serialport::Error) -> Self {
        let kind = match e.kind() {
            serialport::ErrorKind::NoDevice => SerialDeviceErrorKind::NoDevice,
            serialport::ErrorKind::InvalidInput => SerialDeviceErrorKind::InvalidConfig,
            serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                SerialDeviceErrorKind::NotFound
            },
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                SerialDeviceErrorKind::AccessDenied
            },
            serialport::ErrorKind::Io(_) => SerialDeviceErrorKind::Backend,
            serialport::ErrorKind::Unknown => SerialDeviceErrorKind::Unknown,
        };
        SerialError::Device(SerialDeviceError::new(kind, e.description))
    }
}

/// 串口传输
///
/// 写请求直接写入端口，读响应经过 [`LineAssembler`] 重组。
pub struct SerialPortTransport {
    name: String,
    lines: LineAssembler<Box<dyn SerialPort>>,
}

impl SerialPortTransport {
    /// 打开串口
    ///
    /// # 错误
    /// - `SerialError::Device`: 端口不存在、无权限或参数非法
    pub fn open(path: &str, settings: &PortSettings) -> Result<Self, SerialError> {
        let port = serialport::new(path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.read_timeout)
            .open()?;

        info!(
            "Serial port {} opened at {} baud (timeout {:?})",
            path, settings.baud_rate, settings.read_timeout
        );

        // 丢弃打开前残留在驱动缓冲中的字节
        port.clear(ClearBuffer::All)?;

        Ok(Self {
            name: path.to_string(),
            lines: LineAssembler::new(port),
        })
    }
}

impl SerialTransport for SerialPortTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        let port = self.lines.get_mut();
        port.write_all(bytes)?;
        port.flush()?;
        Ok(())
    }

    fn read_line(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        self.lines.read_line(buf)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), SerialError> {
        self.lines.get_mut().set_timeout(timeout)?;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        debug!("Clearing serial input buffer on {}", self.name);
        self.lines.clear();
        self.lines.get_mut().clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 列出系统可见的串口
pub fn list_ports() -> Result<Vec<String>, SerialError> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|p| p.port_name)
        .collect())
}
