//! 同步原语切换层。
//!
//! 教案级说明：为了让 Loom 在模型检查阶段能够捕获原子操作与读写锁的所有调度交错，
//! 当启用 `--cfg loom`（或 `--cfg spark_loom`）时切换到 `loom::sync` 提供的类型；
//! 常规构建使用 `core::sync::atomic` 与 `spin::RwLock`，保证在调度器就绪前也能工作。
//! 其余模块一律从这里导入，避免 `cfg` 散落在业务逻辑中。

#[cfg(not(any(loom, spark_loom)))]
pub(crate) use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
#[cfg(any(loom, spark_loom))]
pub(crate) use loom::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[cfg(not(any(loom, spark_loom)))]
pub(crate) use spin::RwLock;

#[cfg(any(loom, spark_loom))]
pub(crate) use self::loom_rwlock::RwLock;

#[cfg(any(loom, spark_loom))]
mod loom_rwlock {
    /// 以 `spin::RwLock` 的签名包装 `loom::sync::RwLock`。
    ///
    /// Loom 的锁返回 `LockResult`；本 crate 在持锁期间不会 panic，因此毒化分支直接取回内部守卫，
    /// 与 `spin` 无毒化语义保持一致。
    pub(crate) struct RwLock<T> {
        inner: loom::sync::RwLock<T>,
    }

    impl<T> RwLock<T> {
        pub(crate) fn new(value: T) -> Self {
            Self {
                inner: loom::sync::RwLock::new(value),
            }
        }

        pub(crate) fn read(&self) -> loom::sync::RwLockReadGuard<'_, T> {
            self.inner
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }

        /// 占住升级位；Loom 的锁不区分升级意图，真正的独占在 [`UpgradableGuard::upgrade`] 中获取。
        pub(crate) fn upgradeable_read(&self) -> UpgradableGuard<'_, T> {
            UpgradableGuard { lock: self }
        }
    }

    pub(crate) struct UpgradableGuard<'a, T> {
        lock: &'a RwLock<T>,
    }

    impl<'a, T> UpgradableGuard<'a, T> {
        pub(crate) fn upgrade(self) -> loom::sync::RwLockWriteGuard<'a, T> {
            self.lock
                .inner
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
    }
}
