use alloc::{string::ToString, sync::Arc, vec::Vec};
use core::fmt;

use spin::Mutex;

use crate::{buffer::EventRecord, drain::DrainReport};

/// 下游事件消费者，即交接后接管一切事件的完整追踪/日志设施。
///
/// # 设计背景（Why）
/// - 早期路径只要求下游能接收 `(timestamp, payload)`；Sink 的具体形态（环形缓冲追踪器、
///   `tracing` 订阅者、串口等）与交接协议无关。
///
/// # 接口约束（What）
/// - `emit`：从交接开始起随时可能被任意线程调用，必须线程安全；
/// - `emit_fmt`：交接后格式化事件的入口，默认在 `Arguments` 不是字面量时格式化成字符串再调用
///   `emit`；能够直接消费 `fmt::Arguments` 的实现应覆写它，省去这次分配；
/// - `replay`：回放路径专用入口，默认转发到 `emit`；需要区分历史事件的实现可单独覆写；
/// - `begin_replay` / `end_replay`：包住回放过程的钩子，默认空实现。宿主可在此替换时间源，
///   让回放事件沿用记录中的历史时间戳，结束后再恢复；
/// - 回放与交接后新到达的直达事件可能并发到达，实现不得假设两者串行。
pub trait Sink: Send + Sync {
    /// 消费一条事件。
    fn emit(&self, timestamp_ns: u64, payload: &str);

    /// 消费一条尚未格式化的事件。
    fn emit_fmt(&self, timestamp_ns: u64, args: fmt::Arguments<'_>) {
        match args.as_str() {
            Some(literal) => self.emit(timestamp_ns, literal),
            None => self.emit(timestamp_ns, &args.to_string()),
        }
    }

    /// 消费一条从早期缓冲回放的事件。
    fn replay(&self, timestamp_ns: u64, payload: &str) {
        self.emit(timestamp_ns, payload);
    }

    /// 回放即将开始，`pending_bytes` 为待回放区间的字节数。
    fn begin_replay(&self, pending_bytes: usize) {
        let _ = pending_bytes;
    }

    /// 回放已经结束。
    fn end_replay(&self, report: &DrainReport) {
        let _ = report;
    }
}

impl<S: Sink + ?Sized> Sink for &S {
    fn emit(&self, timestamp_ns: u64, payload: &str) {
        (**self).emit(timestamp_ns, payload);
    }

    fn emit_fmt(&self, timestamp_ns: u64, args: fmt::Arguments<'_>) {
        (**self).emit_fmt(timestamp_ns, args);
    }

    fn replay(&self, timestamp_ns: u64, payload: &str) {
        (**self).replay(timestamp_ns, payload);
    }

    fn begin_replay(&self, pending_bytes: usize) {
        (**self).begin_replay(pending_bytes);
    }

    fn end_replay(&self, report: &DrainReport) {
        (**self).end_replay(report);
    }
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn emit(&self, timestamp_ns: u64, payload: &str) {
        (**self).emit(timestamp_ns, payload);
    }

    fn emit_fmt(&self, timestamp_ns: u64, args: fmt::Arguments<'_>) {
        (**self).emit_fmt(timestamp_ns, args);
    }

    fn replay(&self, timestamp_ns: u64, payload: &str) {
        (**self).replay(timestamp_ns, payload);
    }

    fn begin_replay(&self, pending_bytes: usize) {
        (**self).begin_replay(pending_bytes);
    }

    fn end_replay(&self, report: &DrainReport) {
        (**self).end_replay(report);
    }
}

/// 将闭包适配为 [`Sink`]。
pub struct FnSink<F>(pub F);

impl<F> Sink for FnSink<F>
where
    F: Fn(u64, &str) + Send + Sync,
{
    fn emit(&self, timestamp_ns: u64, payload: &str) {
        (self.0)(timestamp_ns, payload);
    }
}

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnSink")
    }
}

/// 收集到内存中的事件及其来源。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedEvent {
    /// 送达的事件。
    pub record: EventRecord,
    /// 是否经由回放（而非交接后的直达路径）送达。
    pub replayed: bool,
}

/// 基于内存的 Sink，便于测试断言与延迟转储。
///
/// 经由 [`Sink::replay`] 送达的事件标记为 `replayed`，事件按到达顺序保存。
#[derive(Debug, Default)]
pub struct MemorySink {
    inner: Mutex<MemorySinkState>,
}

#[derive(Debug, Default)]
struct MemorySinkState {
    events: Vec<CapturedEvent>,
    replays: Vec<DrainReport>,
}

impl MemorySink {
    /// 创建空的收集器。
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回当前已收集事件的副本。
    pub fn events(&self) -> Vec<CapturedEvent> {
        self.inner.lock().events.clone()
    }

    /// 仅返回事件记录，丢弃来源标记。
    pub fn records(&self) -> Vec<EventRecord> {
        self.inner
            .lock()
            .events
            .iter()
            .map(|event| event.record.clone())
            .collect()
    }

    /// 已完成的回放报告，按发生顺序排列。
    pub fn replays(&self) -> Vec<DrainReport> {
        self.inner.lock().replays.clone()
    }

    /// 已收集的事件数。
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    /// 是否尚未收到任何事件。
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 取走全部事件并清空内部缓冲。
    pub fn take(&self) -> Vec<CapturedEvent> {
        core::mem::take(&mut self.inner.lock().events)
    }

    fn capture(&self, timestamp_ns: u64, payload: &str, replayed: bool) {
        self.inner.lock().events.push(CapturedEvent {
            record: EventRecord {
                timestamp_ns,
                payload: payload.into(),
            },
            replayed,
        });
    }
}

impl Sink for MemorySink {
    fn emit(&self, timestamp_ns: u64, payload: &str) {
        self.capture(timestamp_ns, payload, false);
    }

    fn replay(&self, timestamp_ns: u64, payload: &str) {
        self.capture(timestamp_ns, payload, true);
    }

    fn end_replay(&self, report: &DrainReport) {
        self.inner.lock().replays.push(*report);
    }
}
