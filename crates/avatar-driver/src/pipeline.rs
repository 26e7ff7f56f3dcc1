//! 实时循环模块
//!
//! - [`haptic_loop`]: 采样/力循环。每周期读取遥测、发布 `HapticSample`、
//!   计算并下发力命令（或释放力），然后等待到周期截止
//! - [`relay_loop`]: 状态中继。每周期把最新的 `HapticSample` 整体拷贝到 `SimuSample`
//!
//! 两个线程只共享终止标志、指标与采样缓冲区。设备链路只在采样/力循环线程内使用，
//! 循环退出时连同写端一起交还给控制器。

use crate::collaborators::Collaborators;
use crate::config::HapticConfig;
use crate::device::DeviceLink;
use crate::error::DriverError;
use crate::metrics::{LoopMetrics, LoopTiming, TimingWindow};
use crate::pacing::{self, PacingStrategy};
use crate::sample::{HapticSample, SampleReader, SampleWriter, SimuSample};
use avatar_protocol::JawState;
use avatar_serial::SerialTransport;
use crossbeam_channel::Sender;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, trace, warn};

/// 采样/力循环配置
///
/// # Example
///
/// ```
/// use avatar_driver::{HapticConfig, HapticLoopConfig};
/// use std::time::Duration;
///
/// let config = HapticLoopConfig::from(&HapticConfig::default());
/// assert_eq!(config.period, Duration::from_millis(1));
/// assert!(config.poll_jaw);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HapticLoopConfig {
    /// 目标周期
    pub period: Duration,
    pub pacing: PacingStrategy,
    /// 输出力缩放系数
    pub force_scale: f64,
    pub poll_jaw: bool,
    pub poll_collision_force: bool,
    /// 每 N 次迭代发送一次 [`LoopTiming`]；0 关闭
    pub diagnostics_interval: u64,
}

impl From<&HapticConfig> for HapticLoopConfig {
    fn from(config: &HapticConfig) -> Self {
        Self {
            period: config.timing.haptic_period(),
            pacing: config.timing.pacing,
            force_scale: config.force.force_scale,
            poll_jaw: config.telemetry.poll_jaw,
            poll_collision_force: config.telemetry.poll_collision_force,
            diagnostics_interval: config.timing.diagnostics_interval,
        }
    }
}

impl Default for HapticLoopConfig {
    fn default() -> Self {
        Self::from(&HapticConfig::default())
    }
}

/// 状态中继配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayLoopConfig {
    pub period: Duration,
    pub pacing: PacingStrategy,
}

impl From<&HapticConfig> for RelayLoopConfig {
    fn from(config: &HapticConfig) -> Self {
        Self {
            period: config.timing.relay_period(),
            pacing: config.timing.pacing,
        }
    }
}

/// 两个实时线程共享的上下文
#[derive(Clone)]
pub struct LoopContext {
    pub collaborators: Arc<Collaborators>,
    /// 运行标志（Release 写、Acquire 读）
    pub is_running: Arc<AtomicBool>,
    pub metrics: Arc<LoopMetrics>,
    /// 时间戳零点
    pub epoch: Instant,
}

impl LoopContext {
    pub fn new(collaborators: Arc<Collaborators>) -> Self {
        Self {
            collaborators,
            is_running: Arc::new(AtomicBool::new(true)),
            metrics: Arc::new(LoopMetrics::new()),
            epoch: Instant::now(),
        }
    }

    fn micros(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }
}

/// 循环退出（包括 panic 展开）时发送最终的释放力命令
struct ReleaseGuard<'a, T: SerialTransport> {
    link: &'a mut DeviceLink<T>,
    metrics: &'a LoopMetrics,
}

impl<T: SerialTransport> Drop for ReleaseGuard<'_, T> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("Haptic thread: panicking, releasing force");
        }
        match self.link.release_force() {
            Ok(()) => {
                self.metrics.releases.fetch_add(1, Ordering::Relaxed);
                info!("Haptic thread: final force release sent");
            },
            Err(e) => error!("Haptic thread: final force release failed: {}", e),
        }
    }
}

#[cfg(feature = "realtime")]
fn raise_thread_priority(name: &str) {
    use thread_priority::*;

    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(_) => info!("{} thread priority set to MAX (realtime)", name),
        Err(e) => warn!(
            "Failed to set {} thread priority: {:?}. \
            On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
            name, e
        ),
    }
}

#[cfg(not(feature = "realtime"))]
fn raise_thread_priority(_name: &str) {}

/// 采样/力循环主函数
///
/// 一直运行到 `ctx.is_running` 变为 false。退出时（正常退出或 panic 展开）
/// 都会发送一次最终的 `release_force()`，然后交还链路与写端。
///
/// 遥测失败的迭代不发布样本（包括钳口控制器的覆盖值），消费方看到的
/// 始终是最后一次完整成功的迭代。
///
/// # 参数
/// - `link`: 已连接的设备链路（移动进本线程独占）
/// - `writer`: `HapticSample` 唯一写端
/// - `ctx`: 共享上下文
/// - `config`: 循环配置
/// - `timing_tx`: 诊断记录通道（`try_send`，满了就丢弃）
pub fn haptic_loop<T: SerialTransport>(
    mut link: DeviceLink<T>,
    mut writer: SampleWriter<HapticSample>,
    ctx: LoopContext,
    config: HapticLoopConfig,
    timing_tx: Option<Sender<LoopTiming>>,
) -> (DeviceLink<T>, SampleWriter<HapticSample>) {
    raise_thread_priority("Haptic");
    info!(
        "Haptic thread started (period {:?}, pacing {:?})",
        config.period, config.pacing
    );

    {
        let mut guard = ReleaseGuard {
            link: &mut link,
            metrics: &ctx.metrics,
        };
        run_haptic(&mut *guard.link, &mut writer, &ctx, &config, timing_tx.as_ref());
    }

    trace!("Haptic thread: loop exited");
    (link, writer)
}

fn run_haptic<T: SerialTransport>(
    link: &mut DeviceLink<T>,
    writer: &mut SampleWriter<HapticSample>,
    ctx: &LoopContext,
    config: &HapticLoopConfig,
    timing_tx: Option<&Sender<LoopTiming>>,
) {
    let metrics = &ctx.metrics;
    // 重启时沿用上次发布的值
    let mut sample = writer.reader().read();
    let mut iteration = sample.iteration;
    let mut window = TimingWindow::default();

    loop {
        // Acquire: 看到 false 时，控制器在置位前的写入都可见
        if !ctx.is_running.load(Ordering::Acquire) {
            trace!("Haptic thread: is_running flag is false, exiting");
            break;
        }

        let start = Instant::now();
        iteration += 1;

        // ============================================================
        // 1. 遥测：全部成功才整体替换并发布，失败的迭代不发布任何内容，
        //    因此已发布的样本在挂接钳口控制器时总是带有其张开程度
        // ============================================================
        let telemetry_ok = match read_telemetry(link, config, &sample) {
            Ok(next) => {
                sample = next;
                if let Some(opening) = ctx.collaborators.jaw_opening() {
                    sample.jaw.opening_angle = opening;
                }
                sample.iteration = iteration;
                sample.timestamp_us = ctx.micros();
                writer.publish(&sample);
                true
            },
            Err(e) => {
                let n = metrics.telemetry_errors.fetch_add(1, Ordering::Relaxed) + 1;
                if n.is_power_of_two() {
                    warn!("Haptic thread: telemetry failed ({} so far): {}", n, e);
                }
                false
            },
        };

        // ============================================================
        // 2. 力输出：有接触则下发力向量，否则释放
        // ============================================================
        let force = if telemetry_ok {
            ctx.collaborators.device_force(config.force_scale)
        } else {
            None
        };
        let result = match force {
            Some(force) => link
                .set_force_vector(&force)
                .map(|()| &metrics.force_commands),
            None => link.release_force().map(|()| &metrics.releases),
        };
        match result {
            Ok(counter) => {
                counter.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => report_command_error(metrics, &e),
        }
        metrics.iterations.fetch_add(1, Ordering::Relaxed);

        // ============================================================
        // 3. 等待到周期截止
        // ============================================================
        let overrun = pacing::wait_until(start + config.period, config.pacing);
        if overrun {
            metrics.overruns.fetch_add(1, Ordering::Relaxed);
        }

        // ============================================================
        // 4. 诊断（不阻塞、不分配）
        // ============================================================
        if config.diagnostics_interval > 0 {
            window.record(start.elapsed().as_micros() as u64, overrun);
            if iteration % config.diagnostics_interval == 0 {
                let timing = window.take(iteration);
                if let Some(tx) = timing_tx {
                    let _ = tx.try_send(timing);
                }
            }
        }
    }
}

fn read_telemetry<T: SerialTransport>(
    link: &mut DeviceLink<T>,
    config: &HapticLoopConfig,
    last: &HapticSample,
) -> Result<HapticSample, DriverError> {
    let mut next = *last;
    next.pose = link.get_angles_and_length()?;
    next.motor = link.get_last_pwm()?;
    if config.poll_jaw {
        next.jaw = JawState {
            opening_angle: link.get_jaw_opening_angle()?,
            torque: link.get_jaw_torque()?,
        };
    }
    if config.poll_collision_force {
        next.collision = link.get_last_collision_force()?;
    }
    Ok(next)
}

fn report_command_error(metrics: &LoopMetrics, e: &DriverError) {
    let n = metrics.command_errors.fetch_add(1, Ordering::Relaxed) + 1;
    if !e.is_transient() && n == 1 {
        error!("Haptic thread: force output unavailable: {}", e);
    } else if n.is_power_of_two() {
        warn!("Haptic thread: force command failed ({} so far): {}", n, e);
    }
}

/// 状态中继主函数
///
/// 每周期整体拷贝一次，不做变换与校验。退出时交还写端，无其他清理。
pub fn relay_loop(
    reader: SampleReader<HapticSample>,
    mut writer: SampleWriter<SimuSample>,
    ctx: LoopContext,
    config: RelayLoopConfig,
) -> SampleWriter<SimuSample> {
    raise_thread_priority("Relay");
    info!("Relay thread started (period {:?})", config.period);

    loop {
        if !ctx.is_running.load(Ordering::Acquire) {
            trace!("Relay thread: is_running flag is false, exiting");
            break;
        }

        let start = Instant::now();
        let sample = reader.read();
        writer.publish(&SimuSample {
            sample,
            relayed_at_us: ctx.micros(),
        });
        ctx.metrics.relay_copies.fetch_add(1, Ordering::Relaxed);

        pacing::wait_until(start + config.period, config.pacing);
    }

    trace!("Relay thread: loop exited");
    writer
}
