//! 采样/力循环端到端测试
//!
//! 使用模拟设备驱动完整的控制器生命周期，验证力输出与释放行为。

use avatar_driver::avatar_protocol::CommandCode;
use avatar_driver::avatar_serial::mock::{MockHandle, mock_device};
use avatar_driver::*;
use nalgebra::{Matrix3, Vector3};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn test_config() -> HapticConfig {
    let mut config = HapticConfig::default();
    config.timing.pacing = PacingStrategy::Hybrid;
    config
}

fn connected_controller(config: HapticConfig) -> (HapticController, MockHandle) {
    let (transport, handle) = mock_device();
    let controller = HapticBuilder::new()
        .config(config)
        .transport(transport)
        .build()
        .unwrap();
    handle.clear_requests();
    (controller, handle)
}

/// 等待采样/力循环至少完成 `n` 次迭代
fn wait_iterations(controller: &HapticController, n: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.metrics().iterations < n {
        assert!(Instant::now() < deadline, "haptic loop made no progress");
        thread::sleep(Duration::from_millis(1));
    }
}

fn last_command(handle: &MockHandle) -> Option<CommandCode> {
    handle.requests().last().map(|r| r.command)
}

struct FixedJaw(f32);

impl JawController for FixedJaw {
    fn opening_angle(&self) -> f32 {
        self.0
    }
}

#[test]
fn test_no_collaborator_releases_every_iteration() {
    let (mut controller, handle) = connected_controller(test_config());
    controller.start().unwrap();
    wait_iterations(&controller, 20);
    controller.shutdown().unwrap();

    let snap = controller.metrics();
    assert_eq!(snap.force_commands, 0);
    // 每周期一次释放 + 最终释放
    assert_eq!(snap.releases, snap.iterations + 1);
    assert_eq!(handle.count(CommandCode::SetMotorForceAndTorques), 0);
    assert_eq!(handle.count(CommandCode::SetManualPwm) as u64, snap.iterations + 1);
    assert_eq!(last_command(&handle), Some(CommandCode::SetManualPwm));
    assert_eq!(handle.last_pwm(), [0.0; 4]);
}

#[test]
fn test_simulation_not_started_releases() {
    let (mut controller, handle) = connected_controller(test_config());
    controller.attach_force_feedback(|_tip: Vector3<f64>| Vector3::new(1.0, 0.0, 0.0));
    controller.start().unwrap();
    wait_iterations(&controller, 10);
    controller.shutdown().unwrap();

    assert_eq!(handle.count(CommandCode::SetMotorForceAndTorques), 0);
    assert_eq!(controller.metrics().force_commands, 0);
}

#[test]
fn test_zero_force_releases_instead_of_setting_zero() {
    let (mut controller, handle) = connected_controller(test_config());
    controller.attach_force_feedback(|_tip: Vector3<f64>| Vector3::zeros());
    controller.handle_event(SimEvent::StepBegin(ToolFrame::default()));
    controller.start().unwrap();
    wait_iterations(&controller, 10);
    controller.shutdown().unwrap();

    let snap = controller.metrics();
    assert_eq!(handle.count(CommandCode::SetMotorForceAndTorques), 0);
    assert_eq!(snap.releases, snap.iterations + 1);
}

#[test]
fn test_single_contact_issues_one_rotated_scaled_command() {
    let mut config = test_config();
    config.force.force_scale = 2.0;
    let (mut controller, handle) = connected_controller(config);

    // 只在第一次调用时报告接触
    let fired = AtomicBool::new(false);
    controller.attach_force_feedback(move |_tip: Vector3<f64>| {
        if fired.swap(true, Ordering::SeqCst) {
            Vector3::zeros()
        } else {
            Vector3::new(1.5, 0.0, 0.0)
        }
    });
    // 绕 z 轴 90°：x -> y
    let orientation = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    controller.handle_event(SimEvent::StepBegin(ToolFrame {
        tip_position: Vector3::new(0.0, -1.0, 0.0),
        orientation,
    }));

    controller.start().unwrap();
    wait_iterations(&controller, 10);
    controller.shutdown().unwrap();

    let force_requests: Vec<_> = handle
        .requests()
        .into_iter()
        .filter(|r| r.command == CommandCode::SetMotorForceAndTorques)
        .collect();
    assert_eq!(force_requests.len(), 1);
    // 设备坐标力 (0, 3, 0)：只有沿杆方向的分量
    assert_eq!(force_requests[0].args.as_slice(), &[0.0, 0.0, 3.0, 0.0]);
    assert_eq!(controller.metrics().force_commands, 1);
    assert_eq!(last_command(&handle), Some(CommandCode::SetManualPwm));
}

#[test]
fn test_lateral_force_decomposition() {
    let (mut controller, handle) = connected_controller(test_config());
    controller.attach_force_feedback(|_tip: Vector3<f64>| Vector3::new(1.0, 2.0, 0.5));
    controller.handle_event(SimEvent::StepBegin(ToolFrame::default()));
    controller.start().unwrap();
    wait_iterations(&controller, 5);
    controller.shutdown().unwrap();

    let first = handle
        .requests()
        .into_iter()
        .find(|r| r.command == CommandCode::SetMotorForceAndTorques)
        .unwrap();
    // rot = fx * 2.5, pitch = fz * 20, z = fy, yaw = fx * 20
    assert_eq!(first.args.as_slice(), &[2.5, 10.0, 2.0, 20.0]);
}

#[test]
fn test_jaw_controller_overrides_sampled_opening() {
    let (mut controller, handle) = connected_controller(test_config());
    handle.set_jaw(0.1, 2.0);
    handle.set_angles([0.2, 0.1, 10.0, 0.05]);
    controller.attach_jaw_controller(FixedJaw(0.75));
    controller.start().unwrap();
    wait_iterations(&controller, 5);

    let sample = controller.haptic_sample();
    assert_eq!(sample.jaw.opening_angle, 0.75);
    assert_eq!(sample.jaw.torque, 2.0);
    assert_eq!(sample.pose.insertion_length, 10.0);

    controller.detach_jaw_controller();
    let seen = controller.metrics().iterations;
    wait_iterations(&controller, seen + 5);
    assert_eq!(controller.haptic_sample().jaw.opening_angle, 0.1);
    controller.shutdown().unwrap();
}

#[test]
fn test_failed_iterations_publish_nothing_even_with_jaw_controller() {
    let (mut controller, handle) = connected_controller(test_config());
    handle.set_jaw(0.1, 2.0);
    handle.set_fail_reads(true);
    controller.attach_jaw_controller(FixedJaw(0.75));
    controller.start().unwrap();
    wait_iterations(&controller, 10);

    // 遥测一直失败：没有任何样本被发布
    let stale = controller.haptic_sample();
    assert_eq!(stale.iteration, 0);
    assert_eq!(stale.jaw.opening_angle, 0.0);

    handle.set_fail_reads(false);
    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.haptic_sample().iteration == 0 {
        assert!(Instant::now() < deadline, "no sample published after recovery");
        thread::sleep(Duration::from_millis(1));
    }
    let sample = controller.haptic_sample();
    assert_eq!(sample.jaw.opening_angle, 0.75);
    assert_eq!(sample.jaw.torque, 2.0);
    controller.shutdown().unwrap();
}

#[test]
fn test_persistent_device_failure_keeps_loop_alive() {
    let (mut controller, handle) = connected_controller(test_config());
    handle.set_angles([1.0, 2.0, 3.0, 4.0]);
    controller.start().unwrap();
    wait_iterations(&controller, 5);
    let before = controller.haptic_sample();

    handle.set_fail_reads(true);
    let seen = controller.metrics().iterations;
    wait_iterations(&controller, seen + 20);
    assert!(controller.is_healthy());
    controller.shutdown().unwrap();

    let snap = controller.metrics();
    assert!(snap.telemetry_errors >= 15);
    assert!(snap.command_errors >= 15);
    assert_eq!(snap.force_commands, 0);
    // 失败期间不发布，保留最后一次成功的值
    let after = controller.haptic_sample();
    assert_eq!(after.pose, before.pose);
    // 最终释放仍然发出（即使设备不应答）
    assert_eq!(last_command(&handle), Some(CommandCode::SetManualPwm));
}

#[test]
fn test_unplugged_device_still_attempts_release() {
    let (mut controller, handle) = connected_controller(test_config());
    controller.start().unwrap();
    wait_iterations(&controller, 3);
    handle.unplug();
    let seen = controller.metrics().iterations;
    wait_iterations(&controller, seen + 10);
    controller.shutdown().unwrap();

    assert_eq!(controller.state(), LinkState::Stopped);
    // 拔线后链路标记为断开，无法再次启动
    assert!(matches!(controller.start(), Err(DriverError::ConnectionInit(_))));
    assert!(controller.metrics().command_errors > 0);
}

#[test]
fn test_panicking_collaborator_still_releases() {
    let (mut controller, handle) = connected_controller(test_config());
    controller.attach_force_feedback(|_tip: Vector3<f64>| -> Vector3<f64> {
        panic!("force model failure")
    });
    controller.handle_event(SimEvent::StepBegin(ToolFrame::default()));
    controller.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.is_healthy() {
        assert!(Instant::now() < deadline, "haptic thread did not panic");
        thread::sleep(Duration::from_millis(1));
    }

    let result = controller.shutdown();
    assert!(matches!(result, Err(DriverError::ThreadPanicked("avatar-haptic"))));
    assert_eq!(controller.state(), LinkState::Stopped);
    assert_eq!(last_command(&handle), Some(CommandCode::SetManualPwm));
    assert_eq!(controller.metrics().releases, 1);
    // 链路随线程丢失
    assert!(matches!(controller.link_mut(), Err(DriverError::NotConnected)));
}

#[test]
fn test_failed_handshake_prevents_start() {
    let (transport, handle) = mock_device();
    handle.set_silent(true);
    let link = DeviceLink::new(Box::new(transport) as BoxedTransport);
    let mut controller = HapticController::new(link, test_config());

    assert!(matches!(controller.connect(), Err(DriverError::ConnectionInit(_))));
    assert!(matches!(controller.start(), Err(DriverError::ConnectionInit(_))));
    assert_eq!(controller.state(), LinkState::Disconnected);
    assert_eq!(handle.commands(), vec![CommandCode::GetIdentity]);
}

#[test]
fn test_restart_resumes_iteration_count() {
    let (mut controller, handle) = connected_controller(test_config());
    controller.start().unwrap();
    wait_iterations(&controller, 5);
    controller.shutdown().unwrap();
    let first = controller.haptic_sample().iteration;
    assert!(first >= 5);

    controller.start().unwrap();
    assert_eq!(controller.state(), LinkState::Running);
    let seen = controller.metrics().iterations;
    wait_iterations(&controller, seen + 5);
    controller.shutdown().unwrap();

    assert!(controller.haptic_sample().iteration > first);
    assert_eq!(last_command(&handle), Some(CommandCode::SetManualPwm));
}

#[test]
fn test_latest_is_relayed_state() {
    let (mut controller, handle) = connected_controller(test_config());
    handle.set_angles([0.5, 0.25, 42.0, 0.125]);
    controller.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.latest().sample.pose.insertion_length != 42.0 {
        assert!(Instant::now() < deadline, "relay never delivered a sample");
        thread::sleep(Duration::from_millis(1));
    }
    controller.shutdown().unwrap();

    let latest = controller.latest();
    assert_eq!(latest.sample.pose.rotation_angle, 0.5);
    assert_eq!(latest.sample.pose.pitch_angle, 0.25);
    assert!(latest.sample.iteration > 0);
    assert!(controller.metrics().relay_copies > 0);
}
