//! 状态中继一致性测试
//!
//! 模拟设备工作在计数模式：同一次迭代内的所有遥测都报告同一个计数值。
//! 消费方读到的任何 `SimuSample` 中，所有字段必须来自同一次迭代。

use avatar_driver::avatar_serial::mock::mock_device;
use avatar_driver::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn assert_consistent(state: &SimuSample) {
    let s = &state.sample;
    let c = s.pose.rotation_angle;
    assert_eq!(s.pose.to_array(), [c; 4], "pose mixed: {:?}", s);
    assert_eq!(s.motor.to_array(), [c; 4], "motor mixed: {:?}", s);
    assert_eq!(s.jaw.opening_angle, c, "jaw mixed: {:?}", s);
    assert_eq!(s.jaw.torque, c, "jaw torque mixed: {:?}", s);
    assert_eq!([s.collision.fx, s.collision.fy, s.collision.fz], [c; 3]);
}

#[test]
fn test_relay_never_mixes_iterations() {
    let (transport, handle) = mock_device();
    handle.set_counter_mode(true);

    let mut config = HapticConfig::default();
    config.telemetry.poll_collision_force = true;
    config.timing.pacing = PacingStrategy::Hybrid;
    let mut controller = HapticBuilder::new()
        .config(config)
        .transport(transport)
        .build()
        .unwrap();
    controller.start().unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let mut consumers = Vec::new();
    for _ in 0..3 {
        let reader = controller.simu_reader();
        let done = done.clone();
        consumers.push(thread::spawn(move || {
            let mut reads = 0u64;
            let mut last = 0.0f32;
            loop {
                let state = reader.read();
                assert_consistent(&state);
                // 计数只增不减
                assert!(state.sample.pose.rotation_angle >= last);
                last = state.sample.pose.rotation_angle;
                reads += 1;
                if done.load(Ordering::Acquire) {
                    break;
                }
            }
            (reads, last)
        }));
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.metrics().iterations < 200 {
        assert!(Instant::now() < deadline, "haptic loop made no progress");
        thread::sleep(Duration::from_millis(5));
    }
    done.store(true, Ordering::Release);
    for consumer in consumers {
        let (reads, last) = consumer.join().unwrap();
        assert!(reads > 0);
        assert!(last > 0.0);
    }

    controller.shutdown().unwrap();
    assert_consistent(&controller.latest());
    assert!(controller.metrics().relay_copies > 0);
}

#[test]
fn test_relay_timestamp_follows_sample() {
    let (transport, _handle) = mock_device();
    let mut controller = HapticBuilder::new()
        .pacing(PacingStrategy::Hybrid)
        .transport(transport)
        .build()
        .unwrap();
    controller.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while controller.latest().sample.iteration < 10 {
        assert!(Instant::now() < deadline, "relay never delivered a sample");
        thread::sleep(Duration::from_millis(1));
    }
    controller.shutdown().unwrap();

    let latest = controller.latest();
    // 中继时刻不早于采样时刻
    assert!(latest.relayed_at_us >= latest.sample.timestamp_us);
}
