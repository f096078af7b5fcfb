use core::fmt;

use crate::{
    buffer::{EarlyBuffer, EarlyBufferStats},
    clock::Clock,
    config::EarlyTraceConfig,
    drain::{self, DrainReport},
    error::{AppendError, ConfigError},
    gate::HandoverGate,
    sink::Sink,
    sync::{AtomicU64, Ordering},
};

/// 早期事件日志的统计快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EarlyTraceStats {
    /// 是否已经交接。
    pub retired: bool,
    /// 写入早期缓冲的事件数。
    pub buffered: u64,
    /// 交接前因空间不足或单条超限而丢弃的事件数。
    pub dropped: u64,
    /// 交接后直达 Sink 的事件数。
    pub forwarded: u64,
    /// 交接时回放到 Sink 的事件数。
    pub replayed: u64,
    /// 交接前的竞技场统计；交接后竞技场已释放，为 `None`。
    pub buffer: Option<EarlyBufferStats>,
}

/// 一次性交接的早期事件日志。
///
/// # 模块角色（Why）
/// - 以显式构造的实例取代进程级全局单例：由启动引导代码持有，以引用或 `Arc` 分发给生产者；
/// - 在完整的下游设施（Sink）就绪之前缓冲事件，就绪后一次性回放并永久切换到直达路径。
///
/// # 核心机制（How）
/// - `record*`：进入 [`HandoverGate`] 共享侧，`Active` 时写入 [`EarlyBuffer`]，
///   `Retired` 时出锁后直接调用 [`Sink::emit`]；
/// - [`drain`](Self::drain)：独占侧翻转状态并取走竞技场，出锁后按预留顺序回放，最后释放竞技场。
///
/// # 契约说明（What）
/// - `record*` 不睡眠、不分配、不返回错误；交接前写入失败的事件被丢弃并计入 `dropped`，
///   不会改投 Sink；
/// - 交接后的每次 `record*` 恰好对应一次 `Sink::emit`，不再触碰竞技场；
/// - `drain` 幂等：只有第一次调用回放，之后返回 [`DrainReport::already_drained`]。
///
/// # 风险提示（Trade-offs）
/// - 交接前 Sink 不会被调用，因此可以在尚未完全初始化的状态下构造；
/// - 回放期间新到达的直达事件可能与回放事件交错送达 Sink。
pub struct EarlyTraceLog<S, C> {
    gate: HandoverGate<EarlyBuffer>,
    sink: S,
    clock: C,
    dropped: AtomicU64,
    forwarded: AtomicU64,
    replayed: AtomicU64,
    buffered_at_handover: AtomicU64,
}

impl<S: Sink, C: Clock> EarlyTraceLog<S, C> {
    /// 按配置创建日志；配置非法时返回错误。
    pub fn new(config: EarlyTraceConfig, sink: S, clock: C) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_buffer(
            EarlyBuffer::with_capacity(config.effective_capacity()),
            sink,
            clock,
        ))
    }

    /// 以给定容量创建开启状态的日志。
    pub fn with_capacity(capacity_bytes: usize, sink: S, clock: C) -> Self {
        Self::from_buffer(EarlyBuffer::with_capacity(capacity_bytes), sink, clock)
    }

    /// 包装一个已经构造好的竞技场。
    pub fn from_buffer(buffer: EarlyBuffer, sink: S, clock: C) -> Self {
        Self {
            gate: HandoverGate::new(buffer),
            sink,
            clock,
            dropped: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
            replayed: AtomicU64::new(0),
            buffered_at_handover: AtomicU64::new(0),
        }
    }

    /// 以当前时钟时间记录一条事件。
    pub fn record(&self, message: &str) {
        self.record_at(self.clock.now_ns(), message);
    }

    /// 以调用方给定的时间戳记录一条事件。
    pub fn record_at(&self, timestamp_ns: u64, message: &str) {
        let appended = self
            .gate
            .with_active(|buffer| buffer.try_append(timestamp_ns, message));
        self.settle(appended, || self.sink.emit(timestamp_ns, message));
    }

    /// 记录一条格式化事件；交接前直接格式化进竞技场，交接后原样交给 [`Sink::emit_fmt`]，
    /// 自身路径上不分配堆内存。
    pub fn record_fmt(&self, args: fmt::Arguments<'_>) {
        let timestamp_ns = self.clock.now_ns();
        let appended = self
            .gate
            .with_active(|buffer| buffer.try_append_fmt(timestamp_ns, args));
        self.settle(appended, || self.sink.emit_fmt(timestamp_ns, args));
    }

    fn settle<R>(&self, appended: Option<Result<R, AppendError>>, forward: impl FnOnce()) {
        match appended {
            Some(Ok(_)) => {}
            Some(Err(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                forward();
                self.forwarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// 交接：翻转到直达路径，回放早期缓冲，然后释放竞技场。
    ///
    /// # 执行逻辑
    /// 1. 交接门独占侧内翻转状态并取走竞技场，O(1)；
    /// 2. 出锁后按预留顺序回放，前后调用 `Sink::begin_replay` / `end_replay`；
    /// 3. 竞技场在本函数返回前被丢弃。
    ///
    /// 重复调用是安全的无操作。
    pub fn drain(&self) -> DrainReport {
        let Some(buffer) = self.gate.retire() else {
            crate::early_debug!("early trace already drained, ignoring repeated handover");
            return DrainReport::already_drained();
        };

        let stats = buffer.stats();
        self.buffered_at_handover
            .store(stats.records, Ordering::Relaxed);
        crate::early_debug!(
            records = stats.records,
            committed = stats.committed,
            rejected = stats.rejected,
            wasted = stats.wasted,
            "early trace handover: replaying buffered events"
        );

        let report = drain::replay(&buffer, &self.sink);
        self.replayed.store(report.replayed, Ordering::Relaxed);
        drop(buffer);

        crate::early_debug!(
            replayed = report.replayed,
            incomplete = report.incomplete,
            corrupted = report.corrupted,
            "early trace handover complete, early buffer released"
        );
        report
    }

    /// 是否已经交接。
    pub fn is_retired(&self) -> bool {
        self.gate.is_retired()
    }

    /// 当前统计快照。
    pub fn stats(&self) -> EarlyTraceStats {
        let buffer = self.gate.with_active(EarlyBuffer::stats);
        let buffered = match &buffer {
            Some(stats) => stats.records,
            None => self.buffered_at_handover.load(Ordering::Relaxed),
        };
        EarlyTraceStats {
            retired: buffer.is_none(),
            buffered,
            dropped: self.dropped.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            buffer,
        }
    }

    /// 下游 Sink 的引用，便于宿主在交接后直接查询或转储。
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// 生成时间戳所用的时钟。
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<S, C> fmt::Debug for EarlyTraceLog<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EarlyTraceLog")
            .field("gate", &self.gate)
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .field("forwarded", &self.forwarded.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
