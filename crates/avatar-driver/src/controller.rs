//! 控制器
//!
//! 提供对外的 `HapticController`，封装两个实时线程、采样缓冲区与链路生命周期。

use crate::collaborators::{Collaborators, ForceFeedback, JawController, SimEvent};
use crate::config::HapticConfig;
use crate::device::DeviceLink;
use crate::error::DriverError;
use crate::metrics::{LoopMetricsSnapshot, LoopTiming};
use crate::mode::{AtomicLinkState, LinkState};
use crate::pipeline::{HapticLoopConfig, LoopContext, RelayLoopConfig, haptic_loop, relay_loop};
use crate::sample::{HapticSample, SampleReader, SampleWriter, SimuSample, sample_channel};
use crossbeam_channel::{Receiver, Sender};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

/// 诊断通道容量（消费方不读取时新记录被丢弃）
const TIMING_CHANNEL_CAPACITY: usize = 64;

const HAPTIC_THREAD: &str = "avatar-haptic";
const RELAY_THREAD: &str = "avatar-relay";

type HapticJoin = JoinHandle<Option<(DeviceLink, SampleWriter<HapticSample>)>>;
type RelayJoin = JoinHandle<Option<SampleWriter<SimuSample>>>;

/// Haptic Avatar 控制器
///
/// # 生命周期
///
/// 1. [`HapticController::connect`]：身份握手（可选复位），Disconnected -> Connected
/// 2. [`HapticController::start`]：启动采样/力循环与状态中继，-> Running
/// 3. [`HapticController::shutdown`]：置位终止标志并 join 两个线程，-> Stopped
///
/// Stopped 之后可以再次 `start()`。Drop 时如仍在运行会自动 `shutdown()`。
///
/// # Example
///
/// ```no_run
/// use avatar_driver::{HapticBuilder, SimEvent, ToolFrame};
/// use nalgebra::Vector3;
///
/// # fn main() -> Result<(), avatar_driver::DriverError> {
/// let mut controller = HapticBuilder::new().port("/dev/ttyUSB0").build()?;
/// controller.attach_force_feedback(|tip: Vector3<f64>| {
///     if tip.y < 0.0 { Vector3::new(0.0, -tip.y, 0.0) } else { Vector3::zeros() }
/// });
/// controller.start()?;
///
/// // 仿真线程每步
/// controller.handle_event(SimEvent::StepBegin(ToolFrame::default()));
/// let state = controller.latest();
/// println!("insertion = {}", state.sample.pose.insertion_length);
///
/// controller.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct HapticController {
    config: HapticConfig,
    /// 运行期间为 None（链路在采样/力循环线程内）
    link: Option<DeviceLink>,
    identity: Option<String>,
    haptic_writer: Option<SampleWriter<HapticSample>>,
    simu_writer: Option<SampleWriter<SimuSample>>,
    haptic_reader: SampleReader<HapticSample>,
    simu_reader: SampleReader<SimuSample>,
    ctx: LoopContext,
    state: AtomicLinkState,
    timing_tx: Sender<LoopTiming>,
    timing_rx: Receiver<LoopTiming>,
    haptic_thread: Option<HapticJoin>,
    relay_thread: Option<RelayJoin>,
    /// 测试用：让指定名称的线程创建失败
    #[cfg(test)]
    spawn_failure: Option<&'static str>,
}

impl HapticController {
    /// 用一条（可能尚未连接的）链路创建控制器
    ///
    /// 链路几何按配置覆盖。采样缓冲区在此一次性分配。
    pub fn new(link: DeviceLink, config: HapticConfig) -> Self {
        let link = link.with_geometry(config.geometry);
        let state = if link.is_connected() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        };
        let identity = link.identity().map(str::to_string);

        let (haptic_writer, haptic_reader) = sample_channel(HapticSample::default());
        let (simu_writer, simu_reader) = sample_channel(SimuSample::default());
        let (timing_tx, timing_rx) = crossbeam_channel::bounded(TIMING_CHANNEL_CAPACITY);

        let ctx = LoopContext::new(Arc::new(Collaborators::new()));
        ctx.is_running.store(false, Ordering::Release);

        Self {
            config,
            link: Some(link),
            identity,
            haptic_writer: Some(haptic_writer),
            simu_writer: Some(simu_writer),
            haptic_reader,
            simu_reader,
            ctx,
            state: AtomicLinkState::new(state),
            timing_tx,
            timing_rx,
            haptic_thread: None,
            relay_thread: None,
            #[cfg(test)]
            spawn_failure: None,
        }
    }

    /// 身份握手，并按配置复位设备
    ///
    /// # 错误
    /// - `InvalidState`: 实时线程正在运行
    /// - `ConnectionInit`: 端口未打开、握手或复位失败
    pub fn connect(&mut self) -> Result<(), DriverError> {
        let state = self.state();
        if matches!(state, LinkState::Running | LinkState::Terminating) {
            return Err(DriverError::InvalidState {
                expected: "Disconnected, Connected or Stopped",
                actual: state,
            });
        }
        let link = self
            .link
            .as_mut()
            .ok_or_else(|| DriverError::ConnectionInit("device link lost".to_string()))?;

        if !link.is_connected() {
            link.handshake()?;
        }
        if let Some(mode) = self.config.device.reset_mode_on_connect {
            link.reset_device(mode)
                .map_err(|e| DriverError::ConnectionInit(format!("reset failed: {}", e)))?;
        }

        self.identity = link.identity().map(str::to_string);
        if state != LinkState::Stopped {
            self.state.set(LinkState::Connected, Ordering::Release);
        }
        Ok(())
    }

    /// 启动采样/力循环与状态中继
    ///
    /// # 错误
    /// - `ConnectionInit`: 尚未握手或链路未连接（握手失败时不允许启动）
    /// - `InvalidState`: 已在运行或正在停止
    /// - `ThreadSpawn`: 线程创建失败
    pub fn start(&mut self) -> Result<(), DriverError> {
        let state = self.state();
        if state == LinkState::Disconnected {
            return Err(DriverError::ConnectionInit(
                "handshake has not succeeded".to_string(),
            ));
        }
        if !state.can_start() {
            return Err(DriverError::InvalidState {
                expected: "Connected or Stopped",
                actual: state,
            });
        }
        if !self.link.as_ref().is_some_and(|l| l.is_connected()) {
            return Err(DriverError::ConnectionInit(
                "device link not connected".to_string(),
            ));
        }
        let (Some(link), Some(haptic_writer), Some(simu_writer)) = (
            self.link.take(),
            self.haptic_writer.take(),
            self.simu_writer.take(),
        ) else {
            return Err(DriverError::InvalidState {
                expected: "sample buffers available",
                actual: state,
            });
        };

        // 链路与写端经交接通道进入线程；控制器保留一个接收端，
        // 创建线程失败时闭包被丢弃，资源仍可从通道取回
        let (haptic_tx, haptic_rx) = crossbeam_channel::bounded(1);
        let (relay_tx, relay_rx) = crossbeam_channel::bounded(1);
        // 接收端由本函数持有，发送不会失败
        let _ = haptic_tx.send((link, haptic_writer));
        let _ = relay_tx.send(simu_writer);

        // Release: 线程看到 true 之前，控制器的所有写入都已可见
        self.ctx.is_running.store(true, Ordering::Release);

        let haptic_ctx = self.ctx.clone();
        let haptic_config = HapticLoopConfig::from(&self.config);
        let timing_tx = self.timing_tx.clone();
        let handoff = haptic_rx.clone();
        let haptic = self.spawn_thread(HAPTIC_THREAD, move || {
            let (link, writer) = handoff.recv().ok()?;
            Some(haptic_loop(link, writer, haptic_ctx, haptic_config, Some(timing_tx)))
        });
        let haptic = match haptic {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn haptic thread: {}", e);
                self.ctx.is_running.store(false, Ordering::Release);
                if let Ok(writer) = relay_rx.try_recv() {
                    self.simu_writer = Some(writer);
                }
                if let Ok((link, writer)) = haptic_rx.try_recv() {
                    self.restore_released(link);
                    self.haptic_writer = Some(writer);
                }
                return Err(DriverError::ThreadSpawn(e));
            },
        };

        let relay_ctx = self.ctx.clone();
        let relay_config = RelayLoopConfig::from(&self.config);
        let relay_reader = self.haptic_reader.clone();
        let handoff = relay_rx.clone();
        let relay = self.spawn_thread(RELAY_THREAD, move || {
            let writer = handoff.recv().ok()?;
            Some(relay_loop(relay_reader, writer, relay_ctx, relay_config))
        });
        let relay = match relay {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to spawn relay thread: {}", e);
                if let Ok(writer) = relay_rx.try_recv() {
                    self.simu_writer = Some(writer);
                }
                // 停止已启动的采样/力循环并取回链路（线程退出前已释放力）
                self.ctx.is_running.store(false, Ordering::Release);
                self.haptic_thread = Some(haptic);
                self.state.set(LinkState::Terminating, Ordering::Release);
                if let Err(join_err) = self.join_haptic() {
                    error!("Haptic thread failed while aborting start: {}", join_err);
                }
                self.state.set(LinkState::Stopped, Ordering::Release);
                return Err(DriverError::ThreadSpawn(e));
            },
        };

        self.haptic_thread = Some(haptic);
        self.relay_thread = Some(relay);
        self.state.set(LinkState::Running, Ordering::Release);
        info!(
            "Haptic controller running (haptic {:?}, relay {:?})",
            self.config.timing.haptic_period(),
            self.config.timing.relay_period()
        );
        Ok(())
    }

    fn spawn_thread<F, T>(&self, name: &'static str, f: F) -> std::io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        #[cfg(test)]
        {
            if self.spawn_failure == Some(name) {
                return Err(std::io::Error::other("thread creation refused"));
            }
        }
        thread::Builder::new().name(name.to_string()).spawn(f)
    }

    /// 线程未能启动时收回链路：先释放力，再放回控制器
    fn restore_released(&mut self, mut link: DeviceLink) {
        match link.release_force() {
            Ok(()) => {
                self.ctx.metrics.releases.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => error!("Force release after failed start failed: {}", e),
        }
        if !link.is_connected() {
            self.state.set(LinkState::Disconnected, Ordering::Release);
        }
        self.link = Some(link);
    }

    fn join_haptic(&mut self) -> Result<(), DriverError> {
        let Some(handle) = self.haptic_thread.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(Some((link, writer))) => {
                self.link = Some(link);
                self.haptic_writer = Some(writer);
                Ok(())
            },
            Ok(None) => {
                error!("Haptic thread exited without receiving the device link");
                Ok(())
            },
            Err(_) => {
                error!("Haptic thread panicked; device link dropped");
                Err(DriverError::ThreadPanicked(HAPTIC_THREAD))
            },
        }
    }

    fn join_relay(&mut self) -> Result<(), DriverError> {
        let Some(handle) = self.relay_thread.take() else {
            return Ok(());
        };
        match handle.join() {
            Ok(Some(writer)) => {
                self.simu_writer = Some(writer);
                Ok(())
            },
            Ok(None) => {
                error!("Relay thread exited without receiving its sample writer");
                Ok(())
            },
            Err(_) => {
                error!("Relay thread panicked");
                Err(DriverError::ThreadPanicked(RELAY_THREAD))
            },
        }
    }

    /// 停止两个实时线程
    ///
    /// 阻塞直到两个线程都退出；采样/力循环退出前已发送最终释放力命令。
    /// 未运行时直接返回 `Ok(())`。
    ///
    /// # 错误
    /// - `ThreadPanicked`: 某个线程 panic（状态仍进入 Stopped）
    pub fn shutdown(&mut self) -> Result<(), DriverError> {
        if !self.state.compare_exchange(
            LinkState::Running,
            LinkState::Terminating,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return Ok(());
        }

        info!("Shutting down haptic controller");
        self.ctx.is_running.store(false, Ordering::Release);

        let haptic = self.join_haptic();
        let relay = self.join_relay();
        self.state.set(LinkState::Stopped, Ordering::Release);

        let snapshot = self.ctx.metrics.snapshot();
        info!(
            "Haptic controller stopped: {} iterations, {} relay copies, {} telemetry errors, {} overruns",
            snapshot.iterations, snapshot.relay_copies, snapshot.telemetry_errors, snapshot.overruns
        );
        haptic.and(relay)
    }

    /// 当前生命周期状态
    pub fn state(&self) -> LinkState {
        self.state.get(Ordering::Acquire)
    }

    /// 运行中且两个线程都存活
    pub fn is_healthy(&self) -> bool {
        self.state().is_running()
            && self.haptic_thread.as_ref().is_some_and(|h| !h.is_finished())
            && self.relay_thread.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 握手时读取的设备身份
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn config(&self) -> &HapticConfig {
        &self.config
    }

    /// 面向消费方的最新状态（一次完整中继拷贝）
    pub fn latest(&self) -> SimuSample {
        self.simu_reader.read()
    }

    /// 采样/力循环最近发布的状态（绕过中继）
    pub fn haptic_sample(&self) -> HapticSample {
        self.haptic_reader.read()
    }

    /// 消费方读端，可移动到其他线程
    pub fn simu_reader(&self) -> SampleReader<SimuSample> {
        self.simu_reader.clone()
    }

    pub fn metrics(&self) -> LoopMetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// 周期统计接收端（`diagnostics_interval > 0` 时有数据）
    pub fn timing_receiver(&self) -> Receiver<LoopTiming> {
        self.timing_rx.clone()
    }

    /// 协作方注册表，可交给仿真线程投递事件
    pub fn collaborators(&self) -> Arc<Collaborators> {
        self.ctx.collaborators.clone()
    }

    pub fn handle_event(&self, event: SimEvent) {
        self.ctx.collaborators.handle_event(event);
    }

    pub fn attach_force_feedback(&self, provider: impl ForceFeedback + 'static) {
        self.ctx.collaborators.attach_force_feedback(provider);
    }

    pub fn detach_force_feedback(&self) {
        self.ctx.collaborators.detach_force_feedback();
    }

    pub fn attach_jaw_controller(&self, controller: impl JawController + 'static) {
        self.ctx.collaborators.attach_jaw_controller(controller);
    }

    pub fn detach_jaw_controller(&self) {
        self.ctx.collaborators.detach_jaw_controller();
    }

    /// 直接访问设备链路（仅在实时线程未运行时可用）
    ///
    /// # 错误
    /// - `InvalidState`: 实时线程正在运行，链路归采样/力循环独占
    /// - `NotConnected`: 链路已随 panic 的线程丢失
    pub fn link_mut(&mut self) -> Result<&mut DeviceLink, DriverError> {
        let state = self.state();
        if matches!(state, LinkState::Running | LinkState::Terminating) {
            return Err(DriverError::InvalidState {
                expected: "not running",
                actual: state,
            });
        }
        self.link.as_mut().ok_or(DriverError::NotConnected)
    }
}

impl Drop for HapticController {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!("Haptic controller shutdown failed: {}", e);
        }
    }
}
