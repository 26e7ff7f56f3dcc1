//! 行重组缓冲
//!
//! 设备响应可能被拆成多次 `read` 到达（串口驱动按 FIFO 阈值或超时交付），
//! 也可能一次 `read` 带回多行。`LineAssembler` 在内部暂存区中保存未消费的字节，
//! 每次只向调用方交付一整行。

use crate::{RECEIVE_BUFFER_LEN, SerialError};
use std::io::{ErrorKind, Read};

/// 行重组器
///
/// # 同步策略
///
/// - 行过长：继续消费直到 `\n`，然后返回 `BufferOverflow`，下一次调用从新行开始
/// - 行中途超时：丢弃已收到的半行，并标记"跳到下一个 `\n`"，
///   迟到的行尾不会被误当成下一次请求的响应
pub struct LineAssembler<R> {
    inner: R,
    staging: [u8; RECEIVE_BUFFER_LEN],
    start: usize,
    end: usize,
    skip_to_newline: bool,
}

impl<R: Read> LineAssembler<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            staging: [0u8; RECEIVE_BUFFER_LEN],
            start: 0,
            end: 0,
            skip_to_newline: false,
        }
    }

    /// 访问底层读写对象（写请求时使用）
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// 已缓冲但未交付的字节数
    pub fn buffered(&self) -> usize {
        self.end - self.start
    }

    /// 清空暂存区与跳行标记
    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
        self.skip_to_newline = false;
    }

    /// 读取一整行到 `out`，返回行长度（不含 `\n`）
    pub fn read_line(&mut self, out: &mut [u8]) -> Result<usize, SerialError> {
        let mut written = 0usize;
        let mut overflow = false;

        loop {
            // 1. 先消费暂存区
            while self.start < self.end {
                let window = &self.staging[self.start..self.end];
                let newline = window.iter().position(|&b| b == b'\n');
                let take = newline.unwrap_or(window.len());

                if self.skip_to_newline {
                    self.start += take;
                    if newline.is_some() {
                        self.start += 1;
                        self.skip_to_newline = false;
                    }
                    continue;
                }

                if !overflow {
                    if written + take > out.len() {
                        overflow = true;
                    } else {
                        out[written..written + take].copy_from_slice(&window[..take]);
                        written += take;
                    }
                }
                self.start += take;

                if newline.is_some() {
                    self.start += 1;
                    if overflow {
                        return Err(SerialError::BufferOverflow);
                    }
                    return Ok(written);
                }
            }

            // 2. 暂存区耗尽，从底层读取新的分片
            self.start = 0;
            self.end = 0;
            match self.inner.read(&mut self.staging) {
                Ok(0) => return Err(SerialError::Closed),
                Ok(n) => self.end = n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    if written > 0 || overflow {
                        self.skip_to_newline = true;
                    }
                    return Err(SerialError::Timeout);
                },
                Err(e) => return Err(SerialError::Io(e)),
            }
        }
    }
}
