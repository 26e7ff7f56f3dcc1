//! 外部协作方接口
//!
//! - [`ForceFeedback`]: 根据工具尖端位置计算接触力（仿真侧实现）
//! - [`JawController`]: 钳口连杆控制器，报告张开程度
//! - [`SimEvent`]: 仿真步进事件，刷新工具坐标系并标记仿真已开始
//!
//! 协作方随时可以挂接或摘除，采样/力循环每周期无锁读取一次。

use arc_swap::{ArcSwap, ArcSwapOption};
use nalgebra::{Matrix3, Vector3};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 力反馈提供方
///
/// 在采样/力循环线程中每周期调用一次，必须在周期预算内返回。
pub trait ForceFeedback: Send + Sync {
    /// 输入尖端位置（世界坐标），返回接触力（世界坐标）；全零表示无接触
    fn compute_force(&self, tip_position: Vector3<f64>) -> Vector3<f64>;
}

impl<F> ForceFeedback for F
where
    F: Fn(Vector3<f64>) -> Vector3<f64> + Send + Sync,
{
    fn compute_force(&self, tip_position: Vector3<f64>) -> Vector3<f64> {
        self(tip_position)
    }
}

/// 钳口控制器
pub trait JawController: Send + Sync {
    /// 张开程度：0.0 完全闭合，1.0 完全张开
    fn opening_angle(&self) -> f32;
}

/// 工具坐标系（仿真每步写入）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolFrame {
    /// 尖端位置（世界坐标）
    pub tip_position: Vector3<f64>,
    /// 世界坐标到设备坐标的旋转
    pub orientation: Matrix3<f64>,
}

impl Default for ToolFrame {
    fn default() -> Self {
        Self {
            tip_position: Vector3::zeros(),
            orientation: Matrix3::identity(),
        }
    }
}

/// 仿真事件
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimEvent {
    /// 仿真步开始：携带本步的工具坐标系
    StepBegin(ToolFrame),
    /// 仿真步结束
    StepEnd,
}

/// 协作方注册表
///
/// 由控制器持有，与采样/力循环共享。仿真线程通过 [`Collaborators::handle_event`]
/// 投递事件；读取全部无锁。
#[derive(Default)]
pub struct Collaborators {
    force_feedback: ArcSwapOption<Box<dyn ForceFeedback>>,
    jaw_controller: ArcSwapOption<Box<dyn JawController>>,
    tool_frame: ArcSwap<ToolFrame>,
    simulation_started: AtomicBool,
}

impl Collaborators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach_force_feedback(&self, provider: impl ForceFeedback + 'static) {
        self.force_feedback
            .store(Some(Arc::new(Box::new(provider) as Box<dyn ForceFeedback>)));
    }

    pub fn detach_force_feedback(&self) {
        self.force_feedback.store(None);
    }

    pub fn attach_jaw_controller(&self, controller: impl JawController + 'static) {
        self.jaw_controller
            .store(Some(Arc::new(Box::new(controller) as Box<dyn JawController>)));
    }

    pub fn detach_jaw_controller(&self) {
        self.jaw_controller.store(None);
    }

    /// 处理仿真事件
    ///
    /// `StepBegin` 刷新工具坐标系并置位"仿真已开始"；`StepEnd` 不改变状态。
    pub fn handle_event(&self, event: SimEvent) {
        match event {
            SimEvent::StepBegin(frame) => {
                self.tool_frame.store(Arc::new(frame));
                self.simulation_started.store(true, Ordering::Release);
            },
            SimEvent::StepEnd => {},
        }
    }

    pub fn simulation_started(&self) -> bool {
        self.simulation_started.load(Ordering::Acquire)
    }

    /// 最近一次写入的工具坐标系
    pub fn tool_frame(&self) -> ToolFrame {
        **self.tool_frame.load()
    }

    /// 钳口控制器报告的张开程度（未挂接时为 None）
    pub fn jaw_opening(&self) -> Option<f32> {
        let guard = self.jaw_controller.load();
        (*guard).as_ref().map(|controller| controller.opening_angle())
    }

    /// 计算设备坐标系下的输出力
    ///
    /// 仿真未开始、未挂接力反馈或力为全零时返回 None（释放力）。
    /// 否则返回 `orientation * force * force_scale`。
    pub fn device_force(&self, force_scale: f64) -> Option<Vector3<f64>> {
        if !self.simulation_started() {
            return None;
        }
        let guard = self.force_feedback.load();
        let provider = (*guard).as_ref()?;

        let frame = self.tool_frame();
        let force = provider.compute_force(frame.tip_position);
        if force.iter().all(|c| *c == 0.0) {
            return None;
        }
        Some(frame.orientation * force * force_scale)
    }
}
