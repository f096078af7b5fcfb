use core::fmt;

use spark_early::Sink;

/// 固定的 `tracing` target，宿主可据此用 `EnvFilter` 单独调节早期事件的可见性。
pub const TARGET: &str = "spark_early";

/// 把早期事件转成 `tracing` INFO 事件的 Sink。
///
/// # 教案式说明
/// - **意图 (Why)**：交接之后，早期路径上的事件应该与系统其余日志出现在同一条管线里；
/// - **逻辑 (How)**：`emit`、`emit_fmt` 与 `replay` 都生成 INFO 事件，负载作为消息正文，
///   `timestamp_ns` 与 `replayed` 作为结构化字段，回放事件因此可以与直达事件区分；
/// - **契约 (What)**：不持有状态，可以在任意线程并发调用；事件落到调用时生效的 Subscriber。
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TracingSink {
    /// 创建 Sink；等价于 `TracingSink::default()`。
    pub fn new() -> Self {
        Self
    }
}

impl Sink for TracingSink {
    fn emit(&self, timestamp_ns: u64, payload: &str) {
        tracing::info!(target: TARGET, timestamp_ns, replayed = false, "{payload}");
    }

    fn emit_fmt(&self, timestamp_ns: u64, args: fmt::Arguments<'_>) {
        tracing::info!(target: TARGET, timestamp_ns, replayed = false, "{args}");
    }

    fn replay(&self, timestamp_ns: u64, payload: &str) {
        tracing::info!(target: TARGET, timestamp_ns, replayed = true, "{payload}");
    }

    fn begin_replay(&self, pending_bytes: usize) {
        tracing::debug!(target: TARGET, pending_bytes, "replaying early events");
    }
}
