//! 时间戳来源。
//!
//! 早期事件只需要一个单调递增的纳秒计数；启动早期可能还没有系统时钟，
//! 因此以 trait 注入，宿主可换成周期计数器等硬件时钟。

use crate::sync::{AtomicU64, Ordering};

/// 可注入的单调时钟。
///
/// # 接口约束（What）
/// - `now_ns` 必须单调不减，且可在任意上下文调用（不可睡眠、不可分配）。
pub trait Clock: Send + Sync {
    /// 当前单调时间，单位纳秒。
    fn now_ns(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }
}

impl<C: Clock + ?Sized> Clock for alloc::sync::Arc<C> {
    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }
}

/// 以构造时刻为零点、基于 [`std::time::Instant`] 的单调时钟。
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl MonotonicClock {
    /// 以当前时刻为零点创建时钟。
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// 手动推进的时钟，用于测试或确定性启动流程。
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// 从 `start_ns` 开始计时。
    pub fn new(start_ns: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ns),
        }
    }

    /// 向前推进 `delta_ns`，返回推进后的时间。
    pub fn advance(&self, delta_ns: u64) -> u64 {
        self.now.fetch_add(delta_ns, Ordering::AcqRel) + delta_ns
    }

    /// 设定当前时间；早于当前值的设定会被忽略，以维持单调性。
    pub fn set(&self, now_ns: u64) {
        self.now.fetch_max(now_ns, Ordering::AcqRel);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}
