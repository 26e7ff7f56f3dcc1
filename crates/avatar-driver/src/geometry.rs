//! 工具连杆几何
//!
//! 设备坐标系约定：y 轴沿工具杆方向（插入方向），x/z 轴垂直于杆。
//! 尖端力到电机输出的分解只依赖几何常量，是纯函数。

use avatar_protocol::ForceCommand;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// 工具连杆几何常量（设备单位，mm / 度）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolGeometry {
    /// 钳口长度（尖端到钳口转轴）
    pub jaw_length: f64,
    /// 工具杆半径
    pub shaft_radius: f64,
    /// 钳口 1 半径
    pub jaw1_radius: f64,
    /// 钳口 2 半径
    pub jaw2_radius: f64,
    /// 钳口最大张开角（度）
    pub max_opening_angle: f64,
}

impl Default for ToolGeometry {
    fn default() -> Self {
        Self {
            jaw_length: 20.0,
            shaft_radius: 2.5,
            jaw1_radius: 1.5,
            jaw2_radius: 1.5,
            max_opening_angle: 60.0,
        }
    }
}

impl ToolGeometry {
    /// 把设备坐标系下的尖端力分解为按电机的力/力矩
    ///
    /// - `z_force = fy`：沿杆方向的力直接由插入电机承担
    /// - `pitch_torque = fz * jaw_length`
    /// - `yaw_torque = fx * jaw_length`
    /// - `rot_torque = fx * shaft_radius`：横向力在杆表面产生的绕杆力矩
    ///
    /// # Example
    ///
    /// ```
    /// use avatar_driver::ToolGeometry;
    /// use avatar_protocol::ForceCommand;
    /// use nalgebra::Vector3;
    ///
    /// let cmd = ToolGeometry::default().decompose(&Vector3::new(1.0, 2.0, 0.5));
    /// assert_eq!(
    ///     cmd,
    ///     ForceCommand::PerMotor {
    ///         rot_torque: 2.5,
    ///         pitch_torque: 10.0,
    ///         z_force: 2.0,
    ///         yaw_torque: 20.0,
    ///     }
    /// );
    /// ```
    pub fn decompose(&self, force: &Vector3<f64>) -> ForceCommand {
        ForceCommand::PerMotor {
            rot_torque: (force.x * self.shaft_radius) as f32,
            pitch_torque: (force.z * self.jaw_length) as f32,
            z_force: force.y as f32,
            yaw_torque: (force.x * self.jaw_length) as f32,
        }
    }

    /// 归一化张开程度 [0, 1] 换算为钳口张开角（度）
    pub fn jaw_opening_degrees(&self, opening: f32) -> f64 {
        f64::from(opening.clamp(0.0, 1.0)) * self.max_opening_angle
    }

    /// 所有尺寸必须为正的有限值
    pub fn is_valid(&self) -> bool {
        [
            self.jaw_length,
            self.shaft_radius,
            self.jaw1_radius,
            self.jaw2_radius,
            self.max_opening_angle,
        ]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
    }
}
