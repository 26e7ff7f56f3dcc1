//! 循环指标
//!
//! 零开销的原子计数器，实时线程写入，任意线程读取快照。

use std::sync::atomic::{AtomicU64, Ordering};

/// 实时循环指标
///
/// # 使用示例
///
/// ```rust
/// use avatar_driver::LoopMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = LoopMetrics::new();
/// metrics.releases.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().releases, 1);
/// ```
#[derive(Debug, Default)]
pub struct LoopMetrics {
    /// 采样/力循环完成的迭代数
    pub iterations: AtomicU64,
    /// 状态中继完成的拷贝数
    pub relay_copies: AtomicU64,
    /// 遥测读取失败次数（该周期沿用上次的值并释放力）
    pub telemetry_errors: AtomicU64,
    /// 成功下发的力命令数
    pub force_commands: AtomicU64,
    /// 成功下发的释放力命令数（包含最终释放）
    pub releases: AtomicU64,
    /// 超过目标周期的迭代数
    pub overruns: AtomicU64,
    /// 力/释放命令下发失败次数
    pub command_errors: AtomicU64,
}

impl LoopMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取所有计数器（Relaxed，各计数器之间可能有微小的时间差）
    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        LoopMetricsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            relay_copies: self.relay_copies.load(Ordering::Relaxed),
            telemetry_errors: self.telemetry_errors.load(Ordering::Relaxed),
            force_commands: self.force_commands.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            command_errors: self.command_errors.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.iterations.store(0, Ordering::Relaxed);
        self.relay_copies.store(0, Ordering::Relaxed);
        self.telemetry_errors.store(0, Ordering::Relaxed);
        self.force_commands.store(0, Ordering::Relaxed);
        self.releases.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.command_errors.store(0, Ordering::Relaxed);
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopMetricsSnapshot {
    pub iterations: u64,
    pub relay_copies: u64,
    pub telemetry_errors: u64,
    pub force_commands: u64,
    pub releases: u64,
    pub overruns: u64,
    pub command_errors: u64,
}

impl LoopMetricsSnapshot {
    /// 超时迭代占比（百分比）
    pub fn overrun_rate(&self) -> f64 {
        if self.iterations == 0 {
            return 0.0;
        }
        (self.overruns as f64 / self.iterations as f64) * 100.0
    }

    /// 遥测失败占比（百分比）
    pub fn telemetry_error_rate(&self) -> f64 {
        if self.iterations == 0 {
            return 0.0;
        }
        (self.telemetry_errors as f64 / self.iterations as f64) * 100.0
    }
}

/// 周期统计记录（诊断模式下每 N 次迭代发送一次）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopTiming {
    /// 窗口结束时的迭代序号
    pub iteration: u64,
    /// 窗口内的周期数
    pub samples: u64,
    pub mean_period_us: f64,
    pub min_period_us: u64,
    pub max_period_us: u64,
    /// 窗口内超过目标周期的迭代数
    pub overruns: u64,
}

/// 周期统计窗口（只在实时线程内使用，无分配）
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TimingWindow {
    samples: u64,
    sum_us: u64,
    min_us: u64,
    max_us: u64,
    overruns: u64,
}

impl TimingWindow {
    pub(crate) fn record(&mut self, period_us: u64, overrun: bool) {
        if self.samples == 0 {
            self.min_us = period_us;
            self.max_us = period_us;
        } else {
            self.min_us = self.min_us.min(period_us);
            self.max_us = self.max_us.max(period_us);
        }
        self.samples += 1;
        self.sum_us += period_us;
        if overrun {
            self.overruns += 1;
        }
    }

    /// 取出统计结果并清空窗口
    pub(crate) fn take(&mut self, iteration: u64) -> LoopTiming {
        let timing = LoopTiming {
            iteration,
            samples: self.samples,
            mean_period_us: if self.samples == 0 {
                0.0
            } else {
                self.sum_us as f64 / self.samples as f64
            },
            min_period_us: self.min_us,
            max_period_us: self.max_us,
            overruns: self.overruns,
        };
        *self = Self::default();
        timing
    }
}
