//! 链路生命周期状态
//!
//! 控制器在主线程切换状态，实时线程与监控方只读取。

use std::sync::atomic::{AtomicU8, Ordering};

/// 链路生命周期状态
///
/// # 状态转移
///
/// ```text
/// Disconnected --handshake--> Connected --start--> Running
///                                                     |
///                                         shutdown -> Terminating --join--> Stopped
///                                                                              |
///                                                     Running <----start-------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LinkState {
    /// 端口未打开或身份握手未成功
    #[default]
    Disconnected = 0,
    /// 握手成功，实时线程未启动
    Connected = 1,
    /// 采样/力循环与状态中继均在运行
    Running = 2,
    /// 终止标志已置位，等待线程退出
    Terminating = 3,
    /// 两个线程均已 join，最终释放力命令已发送
    Stopped = 4,
}

impl LinkState {
    /// 从 u8 转换
    ///
    /// 无效值视为 Disconnected。
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connected,
            2 => Self::Running,
            3 => Self::Terminating,
            4 => Self::Stopped,
            _ => Self::Disconnected,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// 是否允许启动实时线程
    pub fn can_start(self) -> bool {
        matches!(self, Self::Connected | Self::Stopped)
    }

    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

/// 链路状态（原子版本，用于线程间共享）
#[derive(Debug)]
pub struct AtomicLinkState {
    inner: AtomicU8,
}

impl AtomicLinkState {
    pub fn new(state: LinkState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> LinkState {
        LinkState::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, state: LinkState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }

    /// 比较并交换
    ///
    /// 当前值等于 `current` 时设置为 `new` 并返回 true。
    pub fn compare_exchange(
        &self,
        current: LinkState,
        new: LinkState,
        success: Ordering,
        failure: Ordering,
    ) -> bool {
        self.inner
            .compare_exchange(current.as_u8(), new.as_u8(), success, failure)
            .is_ok()
    }
}

impl Default for AtomicLinkState {
    fn default() -> Self {
        Self::new(LinkState::Disconnected)
    }
}
