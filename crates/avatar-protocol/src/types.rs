//! 遥测与力命令数据类型
//!
//! 所有类型均为 `Copy` 的定长结构，适合在 1kHz 循环中按值传递与整体拷贝。
//! 单位均为设备原生单位。

use crate::command::CommandCode;

/// 自由度索引（与设备的 4 元组顺序一致）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Dof {
    Rot = 0,
    Pitch = 1,
    Z = 2,
    Yaw = 3,
}

/// 工具原始位姿（`GetAnglesAndLength` 响应）
///
/// 由位姿映射协作方消费，本 crate 不做运动学换算。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ToolPose {
    /// 工具绕自身轴的旋转角
    pub rotation_angle: f32,
    /// 端口俯仰角
    pub pitch_angle: f32,
    /// 插入长度
    pub insertion_length: f32,
    /// 端口偏航角
    pub yaw_angle: f32,
}

impl ToolPose {
    pub fn from_array(v: [f32; 4]) -> Self {
        Self {
            rotation_angle: v[Dof::Rot as usize],
            pitch_angle: v[Dof::Pitch as usize],
            insertion_length: v[Dof::Z as usize],
            yaw_angle: v[Dof::Yaw as usize],
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [
            self.rotation_angle,
            self.pitch_angle,
            self.insertion_length,
            self.yaw_angle,
        ]
    }
}

/// 电机输出（下发的 PWM 或测得的上次 PWM）
///
/// 取值范围 [`MotorOutput::PWM_MIN`, `MotorOutput::PWM_MAX`]。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorOutput {
    pub rot: f32,
    pub pitch: f32,
    pub z: f32,
    pub yaw: f32,
}

impl MotorOutput {
    pub const PWM_MIN: f32 = -2040.0;
    pub const PWM_MAX: f32 = 2040.0;

    pub fn from_array(v: [f32; 4]) -> Self {
        Self {
            rot: v[0],
            pitch: v[1],
            z: v[2],
            yaw: v[3],
        }
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.rot, self.pitch, self.z, self.yaw]
    }

    /// 各通道是否都在设备 PWM 量程内
    pub fn in_range(&self) -> bool {
        self.to_array()
            .iter()
            .all(|v| (Self::PWM_MIN..=Self::PWM_MAX).contains(v))
    }
}

/// 电机换算系数（Nmm / PWM 单位）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorScaling {
    pub rot: f32,
    pub pitch: f32,
    pub z: f32,
    pub yaw: f32,
}

impl MotorScaling {
    pub fn from_array(v: [f32; 4]) -> Self {
        Self {
            rot: v[0],
            pitch: v[1],
            z: v[2],
            yaw: v[3],
        }
    }
}

/// 最近一次碰撞合力（设备局部坐标系）
///
/// 仅作参考遥测，力计算不以此为准。
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollisionForce {
    pub fx: f32,
    pub fy: f32,
    pub fz: f32,
}

impl CollisionForce {
    pub fn from_array(v: [f32; 3]) -> Self {
        Self {
            fx: v[0],
            fy: v[1],
            fz: v[2],
        }
    }
}

/// 钳口状态
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JawState {
    /// 张开程度：0.0 完全闭合，1.0 完全张开
    pub opening_angle: f32,
    /// 两片钳口绕转轴的力矩之和
    pub torque: f32,
}

/// 设备状态位域（原始值）
///
/// 包含标定、功放、霍尔传感器、电池、风扇、电源与板温等诊断位，
/// 本层只透传原始值。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStatus(pub u32);

impl DeviceStatus {
    pub fn raw(self) -> u32 {
        self.0
    }

    /// 指定位是否置位
    pub fn bit(self, index: u32) -> bool {
        index < 32 && (self.0 >> index) & 1 == 1
    }
}

/// 力命令
///
/// 每次写入只有一种形式生效。
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ForceCommand {
    /// 按电机下发（`SetMotorForceAndTorques`）
    PerMotor {
        rot_torque: f32,
        pitch_torque: f32,
        z_force: f32,
        yaw_torque: f32,
    },
    /// 尖端力向量 + 旋转力矩（`SetTipForceAndRotTorque`）
    TipForce { force: [f32; 3], rot_torque: f32 },
}

impl ForceCommand {
    /// 对应的线路命令
    pub fn command(&self) -> CommandCode {
        match self {
            ForceCommand::PerMotor { .. } => CommandCode::SetMotorForceAndTorques,
            ForceCommand::TipForce { .. } => CommandCode::SetTipForceAndRotTorque,
        }
    }

    /// 线路参数（固定 4 个）
    pub fn args(&self) -> [f32; 4] {
        match *self {
            ForceCommand::PerMotor {
                rot_torque,
                pitch_torque,
                z_force,
                yaw_torque,
            } => [rot_torque, pitch_torque, z_force, yaw_torque],
            ForceCommand::TipForce { force, rot_torque } => {
                [force[0], force[1], force[2], rot_torque]
            },
        }
    }
}
