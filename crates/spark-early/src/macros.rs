//! 内部日志宏垫片。
//!
//! 启用 `tracing` 特性时转发到 `tracing`，否则展开为空，`no_std` 构建不引入任何日志依赖。
//! 这些宏只在交接与回放路径上使用：生产者热路径可能早于任何订阅者运行，绝不记录日志。

#[cfg(feature = "tracing")]
macro_rules! early_debug {
    ($($arg:tt)*) => {
        ::tracing::debug!(target: "spark_early", $($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! early_debug {
    ($($arg:tt)*) => {{}};
}

#[cfg(feature = "tracing")]
macro_rules! early_warn {
    ($($arg:tt)*) => {
        ::tracing::warn!(target: "spark_early", $($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! early_warn {
    ($($arg:tt)*) => {{}};
}

pub(crate) use {early_debug, early_warn};

/// 以 `format_args!` 语法向 [`EarlyTraceLog`](crate::EarlyTraceLog) 追加一条记录。
///
/// ```
/// use spark_early::{EarlyTraceLog, ManualClock, MemorySink, early_trace};
///
/// let log = EarlyTraceLog::with_capacity(1024, MemorySink::new(), ManualClock::new(0));
/// early_trace!(log, "mapped {} pages at {:#x}", 16, 0x8000_0000_u64);
/// log.drain();
/// assert_eq!(log.sink().records()[0].payload, "mapped 16 pages at 0x80000000");
/// ```
#[macro_export]
macro_rules! early_trace {
    ($log:expr, $($arg:tt)+) => {
        $log.record_fmt(::core::format_args!($($arg)+))
    };
}
