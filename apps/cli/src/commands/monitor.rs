//! 监控命令
//!
//! 启动采样/力循环与状态中继，按固定频率打印最新状态与周期统计。

use anyhow::Result;
use avatar_driver::{HapticController, LoopTiming, SimuSample, ToolGeometry};
use clap::Args;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::info;

/// 监控命令参数
#[derive(Args, Debug)]
pub struct MonitorCommand {
    /// 打印频率（Hz）
    #[arg(short, long, default_value_t = 10)]
    pub frequency: u32,

    /// 运行时长（秒），缺省时运行到 Ctrl+C
    #[arg(short, long)]
    pub duration: Option<u64>,

    /// 每行输出一个 JSON 对象
    #[arg(long)]
    pub json: bool,
}

impl MonitorCommand {
    pub fn print_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.frequency.max(1)))
    }

    pub fn execute(&self, controller: &mut HapticController) -> Result<()> {
        let running = Arc::new(AtomicBool::new(true));
        let r = running.clone();
        ctrlc::set_handler(move || {
            r.store(false, Ordering::SeqCst);
            println!("\n收到退出信号，正在关闭...");
        })?;

        let timings = controller.timing_receiver();
        let geometry = controller.config().geometry;
        controller.start()?;
        println!("📊 监控中 ({} Hz)...", self.frequency);
        println!("按 Ctrl+C 停止\n");

        let started = Instant::now();
        let deadline = self.duration.map(|secs| started + Duration::from_secs(secs));
        while running.load(Ordering::SeqCst) {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            if !controller.is_healthy() {
                println!("⚠️ 实时线程已退出");
                break;
            }
            let state = controller.latest();
            if self.json {
                println!("{}", serde_json::to_string(&state)?);
            } else {
                println!("{}", format_sample(&state, &geometry));
            }
            for timing in timings.try_iter() {
                println!("{}", format_timing(&timing));
            }
            std::thread::sleep(self.print_interval());
        }

        let result = controller.shutdown();
        let snap = controller.metrics();
        info!("Monitor finished after {:?}", started.elapsed());
        println!(
            "\n迭代 {} | 中继 {} | 力命令 {} | 释放 {} | 遥测错误 {} ({:.2}%) | 超时 {} ({:.2}%)",
            snap.iterations,
            snap.relay_copies,
            snap.force_commands,
            snap.releases,
            snap.telemetry_errors,
            snap.telemetry_error_rate(),
            snap.overruns,
            snap.overrun_rate()
        );
        result?;
        Ok(())
    }
}

fn format_sample(state: &SimuSample, geometry: &ToolGeometry) -> String {
    let s = &state.sample;
    format!(
        "#{:<8} rot={:+.3} pitch={:+.3} len={:+.3} yaw={:+.3} | jaw={:.2} ({:.1}°) τ={:+.3} | pwm=[{:+.2} {:+.2} {:+.2} {:+.2}]",
        s.iteration,
        s.pose.rotation_angle,
        s.pose.pitch_angle,
        s.pose.insertion_length,
        s.pose.yaw_angle,
        s.jaw.opening_angle,
        geometry.jaw_opening_degrees(s.jaw.opening_angle),
        s.jaw.torque,
        s.motor.rot,
        s.motor.pitch,
        s.motor.z,
        s.motor.yaw,
    )
}

fn format_timing(timing: &LoopTiming) -> String {
    format!(
        "⏱  @{} 周期 mean={:.1}us min={}us max={}us 超时={}/{}",
        timing.iteration,
        timing.mean_period_us,
        timing.min_period_us,
        timing.max_period_us,
        timing.overruns,
        timing.samples
    )
}
