//! ASCII 行编解码
//!
//! 纯格式层：无状态、无 IO、无重试。
//!
//! - 编码结果写入栈上缓冲 [`LineBuf`]，命令表内的所有命令都不会触发堆分配
//! - 解码结果为 [`Values`]（`SmallVec<[f32; 4]>`），最长响应为 4 个值，同样留在栈上

use crate::ProtocolError;
use crate::command::CommandCode;
use smallvec::SmallVec;
use std::fmt::{self, Write};

/// 解码得到的数值序列
///
/// 协议中最长的数值响应为 4 个 float（角度/PWM/缩放系数），
/// 预留 4 个栈位置即可覆盖全部命令。
pub type Values = SmallVec<[f32; 4]>;

/// 编码后的请求行
///
/// 最长请求为 `"NN <f32> <f32> <f32> <f32>\n"`，64 字节足以覆盖常见数值，
/// 超出时 `SmallVec` 会退化为堆分配（不影响正确性）。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineBuf(SmallVec<[u8; 64]>);

impl LineBuf {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// 以文本形式查看（编码器只写入 ASCII）
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for LineBuf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Write for LineBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.extend_from_slice(s.as_bytes());
        Ok(())
    }
}

/// 协议行结束标记（设备会在响应末尾附加 `\r\n`，个别固件还会补 `\0`）
#[inline]
fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == '\0'
}

fn tokens(line: &str) -> impl Iterator<Item = &str> {
    line.split(is_separator).filter(|t| !t.is_empty())
}

fn as_text(line: &[u8]) -> Result<&str, ProtocolError> {
    std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidEncoding)
}

fn parse_value(position: usize, token: &str) -> Result<f32, ProtocolError> {
    match token.parse::<f32>() {
        // "nan"/"inf" 能被 parse 接受，但不是设备会发送的数值
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ProtocolError::NotNumeric {
            position,
            token: token.to_string(),
        }),
    }
}

/// 编码请求行
///
/// 输出 `"<code>[ <arg>...]\n"`。浮点数使用 `Display` 格式（最短可精确回读的十进制，
/// 不使用指数记法），整数值的参数输出为整数形式（如 `15`）。
///
/// # Errors
/// - `ArgumentCount`: 参数个数与命令声明不一致
/// - `NonFinite`: 参数为 NaN 或无穷大（绝不能下发到电机）
///
/// # Example
///
/// ```
/// use avatar_protocol::{CommandCode, encode};
///
/// let line = encode(CommandCode::SetManualPwm, &[0.0, 0.0, 0.0, 0.0]).unwrap();
/// assert_eq!(line.as_str(), "12 0 0 0 0\n");
/// ```
pub fn encode(command: CommandCode, args: &[f32]) -> Result<LineBuf, ProtocolError> {
    if args.len() != command.arg_count() {
        return Err(ProtocolError::ArgumentCount {
            command,
            expected: command.arg_count(),
            actual: args.len(),
        });
    }
    if let Some(position) = args.iter().position(|a| !a.is_finite()) {
        return Err(ProtocolError::NonFinite { position });
    }

    let mut line = LineBuf::new();
    // LineBuf::write_str 不会失败
    let _ = write!(line, "{}", command.code());
    for arg in args {
        let _ = write!(line, " {}", arg);
    }
    line.0.push(b'\n');
    Ok(line)
}

/// 解码数值响应行
///
/// 按空白切分，丢弃行结束标记，逐个解析为 `f32`。
///
/// # Errors
/// - `TokenCount`: token 个数与 `expected_arity` 不一致
/// - `NotNumeric`: 任一 token 不是有限浮点数
/// - `InvalidEncoding`: 非 UTF-8 字节
///
/// # Example
///
/// ```
/// use avatar_protocol::decode;
///
/// let values = decode("0.2 0.1 10 0.05\r\n", 4).unwrap();
/// assert_eq!(values.as_slice(), &[0.2, 0.1, 10.0, 0.05]);
/// assert!(decode("0.2 0.1\r\n", 4).is_err());
/// ```
pub fn decode(line: impl AsRef<[u8]>, expected_arity: usize) -> Result<Values, ProtocolError> {
    let text = as_text(line.as_ref())?;

    let actual = tokens(text).count();
    if actual != expected_arity {
        return Err(ProtocolError::TokenCount {
            expected: expected_arity,
            actual,
        });
    }

    tokens(text)
        .enumerate()
        .map(|(position, token)| parse_value(position, token))
        .collect()
}

/// 解码文本响应（如身份字符串）
///
/// 去掉首尾的行结束标记与空白，内部空白原样保留。
pub fn decode_text(line: impl AsRef<[u8]>) -> Result<String, ProtocolError> {
    let text = as_text(line.as_ref())?.trim_matches(is_separator);
    if text.is_empty() {
        return Err(ProtocolError::Empty);
    }
    Ok(text.to_string())
}

/// 解码请求行（设备侧视角）
///
/// 返回命令码与参数。用于模拟设备和编解码自检。
pub fn decode_request(line: impl AsRef<[u8]>) -> Result<(CommandCode, Values), ProtocolError> {
    let text = as_text(line.as_ref())?;
    let mut iter = tokens(text);

    let head = iter.next().ok_or(ProtocolError::Empty)?;
    let raw = head.parse::<u8>().map_err(|_| ProtocolError::NotNumeric {
        position: 0,
        token: head.to_string(),
    })?;
    let command = CommandCode::try_from(raw).map_err(|_| ProtocolError::UnknownCommand(raw))?;

    let rest = text.trim_start_matches(is_separator);
    let rest = &rest[head.len()..];
    let args = decode(rest, command.arg_count())?;
    Ok((command, args))
}
