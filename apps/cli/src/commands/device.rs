//! 单次设备命令：身份、状态、释放力、复位

use anyhow::Result;
use avatar_driver::{DEFAULT_RESET_MODE, HapticController};
use clap::Args;

/// 复位命令参数
#[derive(Args, Debug)]
pub struct ResetCommand {
    /// 复位模式
    #[arg(short, long, default_value_t = DEFAULT_RESET_MODE)]
    pub mode: u8,
}

/// 打印设备身份
pub fn identity(controller: &mut HapticController) -> Result<()> {
    let identity = controller.link_mut()?.get_identity()?;
    println!("{}", identity);
    Ok(())
}

/// 打印工具 ID、状态字与电机缩放系数
pub fn status(controller: &mut HapticController) -> Result<()> {
    let link = controller.link_mut()?;
    let tool_id = link.get_tool_id()?;
    let status = link.get_device_status()?;
    let scaling = link.get_motor_scaling_values()?;
    let pose = link.get_angles_and_length()?;

    println!("📊 设备状态:");
    println!("  工具 ID:   {}", tool_id);
    println!("  状态字:    {:#010x}", status.0);
    println!(
        "  电机缩放:  rot={:.3} pitch={:.3} z={:.3} yaw={:.3}",
        scaling.rot, scaling.pitch, scaling.z, scaling.yaw
    );
    println!(
        "  位姿:      rot={:.3} pitch={:.3} len={:.3} yaw={:.3}",
        pose.rotation_angle, pose.pitch_angle, pose.insertion_length, pose.yaw_angle
    );
    Ok(())
}

/// 释放所有电机输出
pub fn release(controller: &mut HapticController) -> Result<()> {
    println!("🛑 释放力输出...");
    controller.link_mut()?.release_force()?;
    println!("✅ 已释放");
    Ok(())
}

/// 复位设备
pub fn reset(controller: &mut HapticController, args: &ResetCommand) -> Result<()> {
    println!("🔄 复位设备 (mode {})...", args.mode);
    controller.link_mut()?.reset_device(args.mode)?;
    println!("✅ 复位完成");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ConnectArgs;
    use avatar_driver::HapticConfig;

    fn mock_controller() -> HapticController {
        let args = ConnectArgs {
            mock: true,
            ..Default::default()
        };
        args.connect(HapticConfig::default()).unwrap()
    }

    #[test]
    fn test_one_shot_commands_against_mock() {
        let mut controller = mock_controller();
        identity(&mut controller).unwrap();
        status(&mut controller).unwrap();
        release(&mut controller).unwrap();
        reset(&mut controller, &ResetCommand { mode: 3 }).unwrap();
    }
}
