//! 模拟设备
//!
//! 在内存中按线路协议应答请求，用于无硬件测试与 CLI 演示。
//!
//! - [`MockTransport`]: 交给设备链路使用的传输端（内部同样经过 [`LineAssembler`]）
//! - [`MockHandle`]: 测试线程持有的控制端，可设置遥测值、注入故障、查看请求日志
//!
//! 模拟端口支持把响应拆成固定大小的分片交付，用于验证行重组。

use crate::{LineAssembler, SerialDeviceError, SerialDeviceErrorKind, SerialError, SerialTransport};
use avatar_protocol::{CommandCode, Values, decode_request};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;

/// 请求日志容量（超出后丢弃最旧的记录）
pub const MOCK_LOG_CAPACITY: usize = 4096;

/// 模拟设备收到的一条请求
#[derive(Debug, Clone, PartialEq)]
pub struct MockRequest {
    pub command: CommandCode,
    pub args: Values,
}

/// 模拟设备内部状态
#[derive(Debug, Clone)]
struct DeviceModel {
    identity: String,
    tool_id: u32,
    status: u32,
    angles: [f32; 4],
    jaw_torque: f32,
    jaw_opening: f32,
    last_pwm: [f32; 4],
    motor_scaling: [f32; 4],
    collision_force: [f32; 3],
    /// 每次角度查询后递增，所有遥测响应都报告该计数（用于一致性测试）
    counter_mode: bool,
    counter: u64,
}

impl Default for DeviceModel {
    fn default() -> Self {
        Self {
            identity: "HapticAvatar mock 1.0".to_string(),
            tool_id: 1,
            status: 0,
            angles: [0.0; 4],
            jaw_torque: 0.0,
            jaw_opening: 0.0,
            last_pwm: [0.0; 4],
            motor_scaling: [1.0; 4],
            collision_force: [0.0; 3],
            counter_mode: false,
            counter: 0,
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    model: DeviceModel,
    /// 最近的请求（环形，最多 `MOCK_LOG_CAPACITY` 条）
    log: VecDeque<MockRequest>,
    /// 待交付给主机的字节
    outgoing: VecDeque<u8>,
    /// 主机写入但尚未遇到 `\n` 的字节
    incoming: Vec<u8>,
    fail_writes: bool,
    fail_reads: bool,
    unplugged: bool,
    silent: bool,
    garbage: bool,
    chunk_size: Option<usize>,
    response_delay: Duration,
}

impl MockState {
    fn handle_line(&mut self, line: &[u8]) {
        let (command, args) = match decode_request(line) {
            Ok(req) => req,
            Err(_) => {
                self.respond("ERR");
                return;
            },
        };
        if self.log.len() == MOCK_LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(MockRequest {
            command,
            args: args.clone(),
        });

        if self.silent {
            return;
        }
        if self.garbage {
            self.respond("#garbage#");
            return;
        }

        let m = &mut self.model;
        if m.counter_mode && command == CommandCode::GetAnglesAndLength {
            m.counter += 1;
        }
        let counter = m.counter as f32;

        let response = match command {
            CommandCode::GetIdentity => m.identity.clone(),
            CommandCode::GetToolId => m.tool_id.to_string(),
            CommandCode::GetStatus => m.status.to_string(),
            CommandCode::GetAnglesAndLength if m.counter_mode => join(&[counter; 4]),
            CommandCode::GetAnglesAndLength => join(&m.angles),
            CommandCode::GetToolJawTorque if m.counter_mode => join(&[counter]),
            CommandCode::GetToolJawTorque => join(&[m.jaw_torque]),
            CommandCode::SetToolJawOpeningAngle if m.counter_mode => join(&[counter]),
            CommandCode::SetToolJawOpeningAngle => join(&[m.jaw_opening]),
            CommandCode::GetLastPwm if m.counter_mode => join(&[counter; 4]),
            CommandCode::GetLastPwm => join(&m.last_pwm),
            CommandCode::GetMotorScalingValues => join(&m.motor_scaling),
            CommandCode::GetLastCollisionForce if m.counter_mode => join(&[counter; 3]),
            CommandCode::GetLastCollisionForce => join(&m.collision_force),
            CommandCode::SetManualPwm => {
                m.last_pwm = [args[0], args[1], args[2], args[3]];
                "OK".to_string()
            },
            CommandCode::Reset => {
                m.last_pwm = [0.0; 4];
                "OK".to_string()
            },
            CommandCode::SetMotorForceAndTorques | CommandCode::SetTipForceAndRotTorque => {
                "OK".to_string()
            },
        };
        self.respond(&response);
    }

    fn respond(&mut self, text: &str) {
        self.outgoing.extend(text.as_bytes());
        self.outgoing.extend(b"\r\n");
    }
}

fn join(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 模拟端口（字节层）
pub struct MockPort {
    state: Arc<Mutex<MockState>>,
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let delay = self.state.lock().response_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        if state.fail_reads || state.outgoing.is_empty() {
            return Err(io::Error::new(ErrorKind::TimedOut, "mock read timeout"));
        }
        let limit = state.chunk_size.unwrap_or(buf.len()).min(buf.len());
        let n = limit.min(state.outgoing.len());
        for (slot, byte) in buf.iter_mut().zip(state.outgoing.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.fail_writes {
            return Err(io::Error::new(ErrorKind::BrokenPipe, "mock write failure"));
        }
        for &byte in buf {
            if byte == b'\n' {
                let line = std::mem::take(&mut state.incoming);
                state.handle_line(&line);
            } else {
                state.incoming.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 模拟设备传输端
pub struct MockTransport {
    lines: LineAssembler<MockPort>,
}

impl SerialTransport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        if self.lines.get_ref().state.lock().unplugged {
            return Err(SerialError::Device(SerialDeviceError::new(
                SerialDeviceErrorKind::NoDevice,
                "mock device unplugged",
            )));
        }
        self.lines.get_mut().write_all(bytes)?;
        Ok(())
    }

    fn read_line(&mut self, buf: &mut [u8]) -> Result<usize, SerialError> {
        self.lines.read_line(buf)
    }

    fn clear_input(&mut self) -> Result<(), SerialError> {
        self.lines.clear();
        self.lines.get_ref().state.lock().outgoing.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 模拟设备控制端
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

/// 创建一对（传输端，控制端）
///
/// # Example
///
/// ```
/// use avatar_serial::mock::mock_device;
/// use avatar_serial::SerialTransport;
///
/// let (mut transport, handle) = mock_device();
/// handle.set_angles([0.2, 0.1, 10.0, 0.05]);
/// transport.write_all(b"4\n").unwrap();
/// let mut buf = [0u8; 64];
/// let n = transport.read_line(&mut buf).unwrap();
/// assert_eq!(&buf[..n], b"0.2 0.1 10 0.05\r");
/// ```
pub fn mock_device() -> (MockTransport, MockHandle) {
    let state = Arc::new(Mutex::new(MockState::default()));
    let transport = MockTransport {
        lines: LineAssembler::new(MockPort {
            state: state.clone(),
        }),
    };
    (transport, MockHandle { state })
}

impl MockHandle {
    pub fn set_identity(&self, identity: impl Into<String>) {
        self.state.lock().model.identity = identity.into();
    }

    pub fn set_tool_id(&self, id: u32) {
        self.state.lock().model.tool_id = id;
    }

    pub fn set_status(&self, status: u32) {
        self.state.lock().model.status = status;
    }

    pub fn set_angles(&self, angles: [f32; 4]) {
        self.state.lock().model.angles = angles;
    }

    pub fn set_jaw(&self, opening: f32, torque: f32) {
        let mut state = self.state.lock();
        state.model.jaw_opening = opening;
        state.model.jaw_torque = torque;
    }

    pub fn set_last_pwm(&self, pwm: [f32; 4]) {
        self.state.lock().model.last_pwm = pwm;
    }

    pub fn set_motor_scaling(&self, scaling: [f32; 4]) {
        self.state.lock().model.motor_scaling = scaling;
    }

    pub fn set_collision_force(&self, force: [f32; 3]) {
        self.state.lock().model.collision_force = force;
    }

    /// 计数模式：每次角度查询递增计数，所有遥测都报告当前计数
    pub fn set_counter_mode(&self, enabled: bool) {
        self.state.lock().model.counter_mode = enabled;
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// 模拟拔线：之后所有写入返回致命设备错误
    pub fn unplug(&self) {
        self.state.lock().unplugged = true;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// 设备收下请求但不应答（读超时）
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// 设备以非数值内容应答（解码失败）
    pub fn set_garbage(&self, garbage: bool) {
        self.state.lock().garbage = garbage;
    }

    /// 每次 `read` 最多交付的字节数
    pub fn set_chunk_size(&self, size: Option<usize>) {
        self.state.lock().chunk_size = size.map(|s| s.max(1));
    }

    pub fn set_response_delay(&self, delay: Duration) {
        self.state.lock().response_delay = delay;
    }

    /// 请求日志快照（最近 `MOCK_LOG_CAPACITY` 条，按到达顺序）
    pub fn requests(&self) -> Vec<MockRequest> {
        self.state.lock().log.iter().cloned().collect()
    }

    /// 请求日志中的命令序列
    pub fn commands(&self) -> Vec<CommandCode> {
        self.state.lock().log.iter().map(|r| r.command).collect()
    }

    /// 指定命令收到的次数
    pub fn count(&self, command: CommandCode) -> usize {
        self.state.lock().log.iter().filter(|r| r.command == command).count()
    }

    pub fn clear_requests(&self) {
        self.state.lock().log.clear();
    }

    /// 最近一次下发的 PWM（释放后为全 0）
    pub fn last_pwm(&self) -> [f32; 4] {
        self.state.lock().model.last_pwm
    }
}
