//! 采样缓冲区
//!
//! `HapticSample` 与 `SimuSample` 各自存放在一个单写者 seqlock 槽中：
//!
//! - 写者先把序号置为奇数，整体写入结构体，再把序号置为下一个偶数
//! - 读者读取前后序号一致且为偶数才接受拷贝，否则重试
//!
//! 因此读者拿到的永远是某一次完整写入的结果（可能比最新值旧一个周期），
//! 不会混合两次写入的字段。写者不加锁、不分配、不等待读者。
//!
//! 单写者约束由类型保证：[`SampleWriter`] 不实现 `Clone`，写入需要 `&mut self`，
//! 构造后整体移动到所属线程。

use avatar_protocol::{CollisionForce, JawState, MotorOutput, ToolPose};
use serde::Serialize;
use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering, fence};

/// 采样/力循环每周期发布的设备状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HapticSample {
    /// 循环迭代序号（从 1 开始）
    pub iteration: u64,
    /// 遥测读取完成时刻（相对控制器启动的微秒数）
    pub timestamp_us: u64,
    pub pose: ToolPose,
    /// 测得的上次 PWM（遥测，非命令）
    pub motor: MotorOutput,
    pub jaw: JawState,
    pub collision: CollisionForce,
}

/// 面向仿真消费方的状态拷贝
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SimuSample {
    pub sample: HapticSample,
    /// 中继拷贝时刻（相对控制器启动的微秒数）
    pub relayed_at_us: u64,
}

struct Slot<T: Copy> {
    seq: AtomicU64,
    data: UnsafeCell<T>,
}

// SAFETY: 写入只通过唯一的 SampleWriter 进行；读者在序号校验失败时丢弃拷贝。
unsafe impl<T: Copy + Send> Sync for Slot<T> {}

/// 写端（唯一）
pub struct SampleWriter<T: Copy> {
    slot: Arc<Slot<T>>,
}

/// 读端（可任意克隆）
pub struct SampleReader<T: Copy> {
    slot: Arc<Slot<T>>,
}

impl<T: Copy> Clone for SampleReader<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

/// 创建一个采样缓冲区，返回唯一写端与读端
///
/// # Example
///
/// ```
/// use avatar_driver::sample_channel;
///
/// let (mut writer, reader) = sample_channel([0u32; 4]);
/// writer.publish(&[1, 2, 3, 4]);
/// assert_eq!(reader.read(), [1, 2, 3, 4]);
/// ```
pub fn sample_channel<T: Copy>(initial: T) -> (SampleWriter<T>, SampleReader<T>) {
    let slot = Arc::new(Slot {
        seq: AtomicU64::new(0),
        data: UnsafeCell::new(initial),
    });
    (
        SampleWriter { slot: slot.clone() },
        SampleReader { slot },
    )
}

impl<T: Copy> SampleWriter<T> {
    /// 整体发布一个新值
    pub fn publish(&mut self, value: &T) {
        let seq = self.slot.seq.load(Ordering::Relaxed);
        self.slot.seq.store(seq.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        // SAFETY: 唯一写者；奇数序号使并发读者丢弃本次拷贝
        unsafe {
            std::ptr::write_volatile(self.slot.data.get(), *value);
        }
        self.slot.seq.store(seq.wrapping_add(2), Ordering::Release);
    }

    /// 已完成的发布次数
    pub fn published(&self) -> u64 {
        self.slot.seq.load(Ordering::Relaxed) / 2
    }

    /// 获取一个新的读端
    pub fn reader(&self) -> SampleReader<T> {
        SampleReader {
            slot: self.slot.clone(),
        }
    }
}

impl<T: Copy> SampleReader<T> {
    /// 读取最近一次完整发布的值
    pub fn read(&self) -> T {
        loop {
            let start = self.slot.seq.load(Ordering::Acquire);
            if start & 1 != 0 {
                std::hint::spin_loop();
                continue;
            }

            // SAFETY: T 为 Copy；序号校验失败时丢弃可能撕裂的拷贝
            let value = unsafe { std::ptr::read_volatile(self.slot.data.get()) };
            fence(Ordering::Acquire);
            let end = self.slot.seq.load(Ordering::Relaxed);
            if start == end {
                return value;
            }
            std::hint::spin_loop();
        }
    }

    /// 已完成的发布次数
    pub fn published(&self) -> u64 {
        self.slot.seq.load(Ordering::Acquire) / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::thread;

    #[test]
    fn test_initial_value_visible() {
        let (_writer, reader) = sample_channel(HapticSample::default());
        assert_eq!(reader.read(), HapticSample::default());
        assert_eq!(reader.published(), 0);
    }

    #[test]
    fn test_publish_replaces_whole_value() {
        let (mut writer, reader) = sample_channel(SimuSample::default());
        let mut value = SimuSample::default();
        value.sample.iteration = 7;
        value.sample.pose = ToolPose::from_array([0.2, 0.1, 10.0, 0.05]);
        value.relayed_at_us = 1234;
        writer.publish(&value);

        assert_eq!(reader.read(), value);
        assert_eq!(writer.published(), 1);
        assert_eq!(writer.reader().read(), value);
    }

    #[test]
    fn test_concurrent_reads_never_mix_writes() {
        let (mut writer, reader) = sample_channel([0u64; 16]);
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..2)
            .map(|_| {
                let reader = reader.clone();
                let done = done.clone();
                thread::spawn(move || {
                    let mut checked = 0u64;
                    loop {
                        let finished = done.load(Ordering::Acquire);
                        let v = reader.read();
                        assert!(v.iter().all(|x| *x == v[0]), "torn read: {:?}", v);
                        checked += 1;
                        if finished {
                            break;
                        }
                    }
                    checked
                })
            })
            .collect();

        for i in 1..=200_000u64 {
            writer.publish(&[i; 16]);
        }
        done.store(true, Ordering::Release);

        for handle in readers {
            assert!(handle.join().unwrap() > 0);
        }
        assert_eq!(reader.read(), [200_000u64; 16]);
    }
}
