//! 设备链路
//!
//! 独占一个串口传输，按"写一行请求、读一行响应"的方式与设备交互，
//! 并在其上提供类型化访问器。
//!
//! # 连接状态
//!
//! - 端口打开失败或握手未成功时链路处于未连接状态，所有访问器立即返回
//!   `DriverError::NotConnected`，不会阻塞
//! - 读写出错后清空输入缓冲，迟到的响应不会被下一次请求误读
//! - 致命传输错误（设备拔出、端口关闭）使链路回到未连接状态

use crate::error::DriverError;
use crate::geometry::ToolGeometry;
use avatar_protocol::{
    CollisionForce, CommandCode, DeviceStatus, ForceCommand, MotorOutput, MotorScaling,
    ProtocolError, ResponseShape, ToolPose, Values, decode, decode_text, encode,
};
use avatar_serial::{RECEIVE_BUFFER_LEN, SerialTransport};
use nalgebra::Vector3;
use tracing::{debug, error, info, warn};

/// 类型擦除的传输（控制器与 CLI 使用）
pub type BoxedTransport = Box<dyn SerialTransport + Send>;

/// 复位命令的默认模式位掩码（编码器、电机输出、标定标志、碰撞对象全部复位）
pub const DEFAULT_RESET_MODE: u8 = 15;

/// 一次请求的响应
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Values(Values),
    Text(String),
    Ack,
}

impl Response {
    /// 取出定长数值
    fn into_array<const N: usize>(self) -> Result<[f32; N], DriverError> {
        match self {
            Response::Values(values) => {
                let actual = values.len();
                <[f32; N]>::try_from(values.as_slice()).map_err(|_| {
                    DriverError::Decode(ProtocolError::TokenCount {
                        expected: N,
                        actual,
                    })
                })
            },
            _ => Err(DriverError::Decode(ProtocolError::TokenCount {
                expected: N,
                actual: 0,
            })),
        }
    }
}

/// 设备链路
pub struct DeviceLink<T = BoxedTransport> {
    transport: Option<T>,
    connected: bool,
    identity: Option<String>,
    geometry: ToolGeometry,
}

#[cfg(feature = "native")]
impl DeviceLink<BoxedTransport> {
    /// 打开串口
    ///
    /// 不会失败：端口无法打开时返回未连接的链路（错误写入日志）。
    /// 打开成功后仍需 [`DeviceLink::handshake`] 才进入已连接状态。
    pub fn open(path: &str, config: &crate::config::SerialConfig) -> Self {
        let settings = avatar_serial::PortSettings {
            baud_rate: config.baud_rate,
            read_timeout: config.read_timeout(),
        };
        match avatar_serial::SerialPortTransport::open(path, &settings) {
            Ok(port) => Self::new(Box::new(port)),
            Err(e) => {
                error!("Failed to open serial port {}: {}", path, e);
                Self::disconnected()
            },
        }
    }
}

impl<T: SerialTransport> DeviceLink<T> {
    /// 包装一个已打开的传输（尚未握手）
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
            connected: false,
            identity: None,
            geometry: ToolGeometry::default(),
        }
    }

    /// 没有传输的链路
    pub fn disconnected() -> Self {
        Self {
            transport: None,
            connected: false,
            identity: None,
            geometry: ToolGeometry::default(),
        }
    }

    pub fn with_geometry(mut self, geometry: ToolGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn geometry(&self) -> &ToolGeometry {
        &self.geometry
    }

    /// 是否已打开端口并完成身份握手
    pub fn is_connected(&self) -> bool {
        self.connected && self.transport.is_some()
    }

    /// 握手时读取的设备身份
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// 传输名称（串口路径或 "mock"）
    pub fn port_name(&self) -> Option<&str> {
        self.transport.as_ref().map(|t| t.name())
    }

    /// 身份握手：未连接 -> 已连接
    ///
    /// # 错误
    /// - `ConnectionInit`: 端口未打开、无响应或身份为空
    pub fn handshake(&mut self) -> Result<&str, DriverError> {
        if self.transport.is_none() {
            return Err(DriverError::ConnectionInit("serial port not open".to_string()));
        }
        if let Some(transport) = self.transport.as_mut() {
            // 丢弃打开端口前设备残留的输出
            transport
                .clear_input()
                .map_err(|e| DriverError::ConnectionInit(e.to_string()))?;
        }

        match self.exchange(CommandCode::GetIdentity, &[]) {
            Ok(Response::Text(identity)) => {
                info!(
                    "Haptic Avatar connected on {}: {}",
                    self.port_name().unwrap_or("?"),
                    identity
                );
                self.connected = true;
                Ok(self.identity.insert(identity).as_str())
            },
            Ok(other) => Err(DriverError::ConnectionInit(format!(
                "unexpected identity response: {:?}",
                other
            ))),
            Err(e) => Err(DriverError::ConnectionInit(e.to_string())),
        }
    }

    /// 发送一条命令并读取响应
    ///
    /// 每次调用使用独立的定长接收缓冲区（[`RECEIVE_BUFFER_LEN`] 字节）。
    ///
    /// # 错误
    /// - `NotConnected`: 链路未连接
    /// - `Io`: 写失败、读超时、缓冲溢出
    /// - `Decode`: 响应格式错误或参数非法
    pub fn send_command(
        &mut self,
        command: CommandCode,
        args: &[f32],
    ) -> Result<Response, DriverError> {
        if !self.is_connected() {
            return Err(DriverError::NotConnected);
        }
        self.exchange(command, args)
    }

    fn exchange(&mut self, command: CommandCode, args: &[f32]) -> Result<Response, DriverError> {
        let request = encode(command, args)?;
        let transport = self.transport.as_mut().ok_or(DriverError::NotConnected)?;

        let result = round_trip(transport, command, request.as_bytes());
        if let Err(e) = &result {
            if let DriverError::Io(io) = e
                && io.is_fatal()
            {
                error!("Device link lost on {:?}: {}", command, e);
                self.connected = false;
            } else {
                debug!("{:?} failed: {}, resynchronising input", command, e);
            }
            if let Err(clear) = transport.clear_input() {
                warn!("Failed to clear serial input: {}", clear);
            }
        }
        result
    }

    fn query<const N: usize>(&mut self, command: CommandCode) -> Result<[f32; N], DriverError> {
        self.send_command(command, &[])?.into_array::<N>()
    }

    fn command(&mut self, command: CommandCode, args: &[f32]) -> Result<(), DriverError> {
        self.send_command(command, args).map(|_| ())
    }

    /// 固件身份字符串（同时刷新缓存）
    pub fn get_identity(&mut self) -> Result<String, DriverError> {
        match self.send_command(CommandCode::GetIdentity, &[])? {
            Response::Text(identity) => {
                self.identity = Some(identity.clone());
                Ok(identity)
            },
            _ => Err(DriverError::Decode(ProtocolError::Empty)),
        }
    }

    /// 插入工具的识别号
    pub fn get_tool_id(&mut self) -> Result<u32, DriverError> {
        let [id] = self.query::<1>(CommandCode::GetToolId)?;
        Ok(id as u32)
    }

    /// 设备状态位域
    pub fn get_device_status(&mut self) -> Result<DeviceStatus, DriverError> {
        let [raw] = self.query::<1>(CommandCode::GetStatus)?;
        Ok(DeviceStatus(raw as u32))
    }

    /// 端口角度、工具旋转角与插入长度
    pub fn get_angles_and_length(&mut self) -> Result<ToolPose, DriverError> {
        Ok(ToolPose::from_array(self.query(CommandCode::GetAnglesAndLength)?))
    }

    /// 钳口力矩
    pub fn get_jaw_torque(&mut self) -> Result<f32, DriverError> {
        let [torque] = self.query::<1>(CommandCode::GetToolJawTorque)?;
        Ok(torque)
    }

    /// 钳口张开程度
    ///
    /// 设备命令表中该命令名为 "Set"，但只用于读取，不发送参数。
    pub fn get_jaw_opening_angle(&mut self) -> Result<f32, DriverError> {
        let [opening] = self.query::<1>(CommandCode::SetToolJawOpeningAngle)?;
        Ok(opening)
    }

    /// 最近一次下发到电机的 PWM
    pub fn get_last_pwm(&mut self) -> Result<MotorOutput, DriverError> {
        Ok(MotorOutput::from_array(self.query(CommandCode::GetLastPwm)?))
    }

    /// PWM 到力/力矩的换算系数
    pub fn get_motor_scaling_values(&mut self) -> Result<MotorScaling, DriverError> {
        Ok(MotorScaling::from_array(
            self.query(CommandCode::GetMotorScalingValues)?,
        ))
    }

    /// 最近一次碰撞合力（设备局部坐标系）
    pub fn get_last_collision_force(&mut self) -> Result<CollisionForce, DriverError> {
        Ok(CollisionForce::from_array(
            self.query(CommandCode::GetLastCollisionForce)?,
        ))
    }

    /// 按电机设置力与力矩
    pub fn set_motor_force_and_torques(
        &mut self,
        rot_torque: f32,
        pitch_torque: f32,
        z_force: f32,
        yaw_torque: f32,
    ) -> Result<(), DriverError> {
        self.command(
            CommandCode::SetMotorForceAndTorques,
            &[rot_torque, pitch_torque, z_force, yaw_torque],
        )
    }

    /// 设置尖端力向量与旋转力矩
    pub fn set_tip_force_and_rot_torque(
        &mut self,
        force: [f32; 3],
        rot_torque: f32,
    ) -> Result<(), DriverError> {
        self.command(
            CommandCode::SetTipForceAndRotTorque,
            &[force[0], force[1], force[2], rot_torque],
        )
    }

    /// 下发一条力命令
    pub fn apply(&mut self, command: ForceCommand) -> Result<(), DriverError> {
        self.command(command.command(), &command.args())
    }

    /// 下发设备坐标系下的尖端力
    ///
    /// 先按工具几何分解为按电机的力/力矩，再发送 `SetMotorForceAndTorques`。
    pub fn set_force_vector(&mut self, force: &Vector3<f64>) -> Result<(), DriverError> {
        let command = self.geometry.decompose(force);
        self.apply(command)
    }

    /// 释放力：所有电机 PWM 置 0
    pub fn release_force(&mut self) -> Result<(), DriverError> {
        self.command(CommandCode::SetManualPwm, &[0.0; 4])
    }

    /// 复位设备（模式位掩码，默认见 [`DEFAULT_RESET_MODE`]）
    pub fn reset_device(&mut self, mode: u8) -> Result<(), DriverError> {
        info!("Resetting device with mode {}", mode);
        self.command(CommandCode::Reset, &[f32::from(mode)])
    }
}

fn round_trip<T: SerialTransport>(
    transport: &mut T,
    command: CommandCode,
    request: &[u8],
) -> Result<Response, DriverError> {
    transport.write_all(request)?;

    let mut buf = [0u8; RECEIVE_BUFFER_LEN];
    let n = transport.read_line(&mut buf)?;
    let line = &buf[..n];

    Ok(match command.response() {
        ResponseShape::Values(arity) => Response::Values(decode(line, arity)?),
        ResponseShape::Text => Response::Text(decode_text(line)?),
        ResponseShape::Ack => Response::Ack,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use avatar_serial::mock::{MockHandle, MockTransport, mock_device};

    fn connected() -> (DeviceLink<MockTransport>, MockHandle) {
        let (transport, handle) = mock_device();
        let mut link = DeviceLink::new(transport);
        link.handshake().unwrap();
        handle.clear_requests();
        (link, handle)
    }

    #[test]
    fn test_handshake_reads_identity() {
        let (transport, handle) = mock_device();
        handle.set_identity("HapticAvatar v2.3 build 42");
        let mut link = DeviceLink::new(transport);
        assert!(!link.is_connected());

        assert_eq!(link.handshake().unwrap(), "HapticAvatar v2.3 build 42");
        assert!(link.is_connected());
        assert_eq!(link.identity(), Some("HapticAvatar v2.3 build 42"));
        assert_eq!(link.port_name(), Some("mock"));
    }

    #[test]
    fn test_handshake_failure_is_connection_init() {
        let (transport, handle) = mock_device();
        handle.set_silent(true);
        let mut link = DeviceLink::new(transport);
        assert!(matches!(link.handshake(), Err(DriverError::ConnectionInit(_))));
        assert!(!link.is_connected());

        let mut link = DeviceLink::<MockTransport>::disconnected();
        assert!(matches!(link.handshake(), Err(DriverError::ConnectionInit(_))));
    }

    #[test]
    fn test_accessors_fail_fast_when_disconnected() {
        let (transport, handle) = mock_device();
        let mut link = DeviceLink::new(transport);
        assert!(matches!(link.get_angles_and_length(), Err(DriverError::NotConnected)));
        assert!(matches!(link.release_force(), Err(DriverError::NotConnected)));
        // 未连接时不触碰端口
        assert!(handle.requests().is_empty());

        let mut link = DeviceLink::<MockTransport>::disconnected();
        assert!(!link.is_connected());
        assert!(matches!(link.get_last_pwm(), Err(DriverError::NotConnected)));
    }

    #[test]
    fn test_typed_accessors() {
        let (mut link, handle) = connected();
        handle.set_angles([0.2, 0.1, 10.0, 0.05]);
        handle.set_tool_id(3);
        handle.set_status(0b101);
        handle.set_jaw(0.75, 1.25);
        handle.set_last_pwm([10.0, -20.0, 30.0, -40.0]);
        handle.set_motor_scaling([1.5, 2.5, 3.5, 4.5]);
        handle.set_collision_force([0.1, 0.2, 0.3]);

        let pose = link.get_angles_and_length().unwrap();
        assert_eq!(pose, ToolPose::from_array([0.2, 0.1, 10.0, 0.05]));
        assert_eq!(link.get_tool_id().unwrap(), 3);
        assert!(link.get_device_status().unwrap().bit(2));
        assert_eq!(link.get_jaw_opening_angle().unwrap(), 0.75);
        assert_eq!(link.get_jaw_torque().unwrap(), 1.25);
        assert_eq!(
            link.get_last_pwm().unwrap(),
            MotorOutput::from_array([10.0, -20.0, 30.0, -40.0])
        );
        assert_eq!(
            link.get_motor_scaling_values().unwrap(),
            MotorScaling::from_array([1.5, 2.5, 3.5, 4.5])
        );
        assert_eq!(
            link.get_last_collision_force().unwrap(),
            CollisionForce::from_array([0.1, 0.2, 0.3])
        );
    }

    #[test]
    fn test_jaw_opening_accessor_sends_no_arguments() {
        let (mut link, handle) = connected();
        link.get_jaw_opening_angle().unwrap();
        let reqs = handle.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].command, CommandCode::SetToolJawOpeningAngle);
        assert!(reqs[0].args.is_empty());
    }

    #[test]
    fn test_release_force_is_manual_zero_pwm() {
        let (mut link, handle) = connected();
        handle.set_last_pwm([100.0; 4]);
        link.release_force().unwrap();

        let reqs = handle.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].command, CommandCode::SetManualPwm);
        assert_eq!(reqs[0].args.as_slice(), &[0.0; 4]);
        assert_eq!(handle.last_pwm(), [0.0; 4]);
    }

    #[test]
    fn test_set_force_vector_decomposes() {
        let (mut link, handle) = connected();
        link.set_force_vector(&Vector3::new(1.5, 2.0, -1.0)).unwrap();

        let reqs = handle.requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].command, CommandCode::SetMotorForceAndTorques);
        // [rot, pitch, z, yaw] = [fx * 2.5, fz * 20, fy, fx * 20]
        assert_eq!(reqs[0].args.as_slice(), &[3.75, -20.0, 2.0, 30.0]);
    }

    #[test]
    fn test_tip_force_and_reset() {
        let (mut link, handle) = connected();
        link.set_tip_force_and_rot_torque([0.5, -0.5, 1.0], 0.1).unwrap();
        link.set_motor_force_and_torques(1.0, 2.0, 3.0, 4.0).unwrap();
        link.reset_device(DEFAULT_RESET_MODE).unwrap();

        let reqs = handle.requests();
        assert_eq!(
            handle.commands(),
            vec![
                CommandCode::SetTipForceAndRotTorque,
                CommandCode::SetMotorForceAndTorques,
                CommandCode::Reset,
            ]
        );
        assert_eq!(reqs[0].args.as_slice(), &[0.5, -0.5, 1.0, 0.1]);
        assert_eq!(reqs[2].args.as_slice(), &[15.0]);
    }

    #[test]
    fn test_non_finite_force_is_rejected_before_the_wire() {
        let (mut link, handle) = connected();
        let err = link.set_force_vector(&Vector3::new(f64::NAN, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, DriverError::Decode(ProtocolError::NonFinite { .. })));
        assert!(err.is_transient());
        assert!(handle.requests().is_empty());
    }

    #[test]
    fn test_timeout_then_recovery() {
        let (mut link, handle) = connected();
        handle.set_silent(true);
        let err = link.get_angles_and_length().unwrap_err();
        assert!(matches!(err, DriverError::Io(avatar_serial::SerialError::Timeout)));
        assert!(err.is_transient());
        assert!(link.is_connected());

        handle.set_silent(false);
        handle.set_angles([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(link.get_angles_and_length().unwrap().to_array(), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_garbage_response_is_decode_error() {
        let (mut link, handle) = connected();
        handle.set_garbage(true);
        let err = link.get_last_pwm().unwrap_err();
        assert!(matches!(err, DriverError::Decode(_)));

        handle.set_garbage(false);
        assert!(link.get_last_pwm().is_ok());
    }

    #[test]
    fn test_fatal_error_disconnects() {
        let (mut link, handle) = connected();
        handle.unplug();

        let err = link.release_force().unwrap_err();
        assert!(!err.is_transient());
        assert!(!link.is_connected());
        assert!(matches!(link.release_force(), Err(DriverError::NotConnected)));
    }
}
