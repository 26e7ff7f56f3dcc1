//! # Avatar Protocol
//!
//! Haptic Avatar 力反馈设备串口协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `command`: 命令码与参数/响应形状表
//! - `codec`: ASCII 行编码/解码
//! - `types`: 遥测数据类型（工具位姿、电机输出、钳口状态、碰撞力）
//!
//! ## 线路格式
//!
//! 协议为行文本协议：
//!
//! ```text
//! 请求: <command-code> [arg1 arg2 ...]\n
//! 响应: <val1> <val2> ... <valN>\r\n
//! ```
//!
//! 本 crate 只负责格式层，不包含任何 IO、重试或行重组逻辑。
//! 行重组由 `avatar-serial` 的读缓冲完成。

pub mod codec;
pub mod command;
pub mod types;

pub use codec::{LineBuf, Values, decode, decode_request, decode_text, encode};
pub use command::{CommandCode, ResponseShape};
pub use types::*;

use thiserror::Error;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// 响应行的数值个数与命令期望不一致
    #[error("Invalid token count: expected {expected}, got {actual}")]
    TokenCount { expected: usize, actual: usize },

    /// 某个 token 不是合法的浮点数
    #[error("Non-numeric token at position {position}: {token:?}")]
    NotNumeric { position: usize, token: String },

    /// 未知命令码
    #[error("Unknown command code: {0}")]
    UnknownCommand(u8),

    /// 编码时参数个数与命令声明不一致
    #[error("Invalid argument count for {command:?}: expected {expected}, got {actual}")]
    ArgumentCount {
        command: CommandCode,
        expected: usize,
        actual: usize,
    },

    /// 参数为 NaN 或无穷大
    #[error("Non-finite argument at position {position}")]
    NonFinite { position: usize },

    /// 响应行不是合法的 UTF-8 文本
    #[error("Invalid line encoding (not UTF-8)")]
    InvalidEncoding,

    /// 空行（只有行结束符）
    #[error("Empty line")]
    Empty,
}
