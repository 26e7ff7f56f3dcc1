//! 命令码定义
//!
//! 每个命令码固定对应：
//! - 请求参数个数（`arg_count`）
//! - 响应形状（`response`）：定长数值、文本或仅确认

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 协议命令码
///
/// 数值即线路上的命令标识。定义一次，不可变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum CommandCode {
    /// 复位编码器、电机输出、标定标志和碰撞对象（参数：模式位掩码）
    Reset = 0,
    /// 固件身份与构建版本
    GetIdentity = 1,
    /// 插入工具的识别号（与工具尖端销长度相关）
    GetToolId = 2,
    /// 设备状态位域（标定、功放、霍尔传感器、电池、风扇、电源、板温）
    GetStatus = 3,
    /// 端口角度（Yaw + Pitch）、工具旋转角与插入长度
    GetAnglesAndLength = 4,
    /// 钳口绕转轴的力矩
    GetToolJawTorque = 5,
    /// 钳口张开角度
    ///
    /// 名称来自设备命令表，实际只用于读取，不发送参数。
    SetToolJawOpeningAngle = 6,
    /// 最近一次下发到电机的 PWM
    GetLastPwm = 7,
    /// PWM 到力/力矩的换算系数（Nmm / PWM）
    GetMotorScalingValues = 8,
    /// 最近一次与几何体碰撞的合力（设备局部坐标系）
    GetLastCollisionForce = 9,
    /// 按电机设置力与力矩
    SetMotorForceAndTorques = 10,
    /// 设置工具尖端力向量与旋转力矩
    SetTipForceAndRotTorque = 11,
    /// 手动原始 PWM（全 0 即释放力）
    SetManualPwm = 12,
}

/// 响应形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// 固定个数的浮点数
    Values(usize),
    /// 不透明文本（如身份字符串）
    Text,
    /// 设备回一行确认，内容不解析
    Ack,
}

impl CommandCode {
    /// 全部命令（按命令码顺序）
    pub const ALL: [CommandCode; 13] = [
        CommandCode::Reset,
        CommandCode::GetIdentity,
        CommandCode::GetToolId,
        CommandCode::GetStatus,
        CommandCode::GetAnglesAndLength,
        CommandCode::GetToolJawTorque,
        CommandCode::SetToolJawOpeningAngle,
        CommandCode::GetLastPwm,
        CommandCode::GetMotorScalingValues,
        CommandCode::GetLastCollisionForce,
        CommandCode::SetMotorForceAndTorques,
        CommandCode::SetTipForceAndRotTorque,
        CommandCode::SetManualPwm,
    ];

    /// 线路命令码
    #[inline]
    pub fn code(self) -> u8 {
        self.into()
    }

    /// 请求参数个数
    pub fn arg_count(self) -> usize {
        match self {
            CommandCode::Reset => 1,
            CommandCode::SetMotorForceAndTorques
            | CommandCode::SetTipForceAndRotTorque
            | CommandCode::SetManualPwm => 4,
            _ => 0,
        }
    }

    /// 响应形状
    pub fn response(self) -> ResponseShape {
        match self {
            CommandCode::GetIdentity => ResponseShape::Text,
            CommandCode::GetToolId
            | CommandCode::GetStatus
            | CommandCode::GetToolJawTorque
            | CommandCode::SetToolJawOpeningAngle => ResponseShape::Values(1),
            CommandCode::GetLastCollisionForce => ResponseShape::Values(3),
            CommandCode::GetAnglesAndLength
            | CommandCode::GetLastPwm
            | CommandCode::GetMotorScalingValues => ResponseShape::Values(4),
            CommandCode::Reset
            | CommandCode::SetMotorForceAndTorques
            | CommandCode::SetTipForceAndRotTorque
            | CommandCode::SetManualPwm => ResponseShape::Ack,
        }
    }

    /// 是否为纯查询（无参数）
    pub fn is_query(self) -> bool {
        self.arg_count() == 0
    }
}
