//! 周期节拍
//!
//! 两个实时线程都只通过 [`wait_until`] 等待下一周期，
//! 切换等待策略不影响循环逻辑。

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// 等待策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingStrategy {
    /// 忙等到截止时刻（抖动最小，独占一个核心）
    #[default]
    Spin,
    /// `spin_sleep`：粗粒度部分交给系统睡眠，最后一段自旋
    Hybrid,
}

/// 等待直到 `deadline`
///
/// 返回 `true` 表示调用时已经超过截止时刻（本周期超时）。
#[inline]
pub fn wait_until(deadline: Instant, strategy: PacingStrategy) -> bool {
    let now = Instant::now();
    if now >= deadline {
        return true;
    }

    match strategy {
        PacingStrategy::Spin => {
            while Instant::now() < deadline {
                std::hint::spin_loop();
            }
        },
        PacingStrategy::Hybrid => {
            spin_sleep::sleep(deadline - now);
        },
    }
    false
}
