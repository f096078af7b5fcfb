use alloc::{boxed::Box, string::String, vec::Vec};
use core::fmt::{self, Write as _};

use crate::{
    error::{AppendError, ReplayError},
    layout::{
        self, HEADER_BYTES, Header, LengthCounter, MAX_CAPACITY_BYTES, WORD_BYTES, WordWriter,
    },
    sync::{AtomicU64, Ordering},
};

/// 一条已经发布的早期事件。
///
/// 回放时由竞技场解码得到；`payload` 为拥有所有权的副本，竞技场本身在交接完成后整体释放。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// 单调时钟纳秒。
    pub timestamp_ns: u64,
    /// 事件文本。
    pub payload: String,
}

/// 成功预留并写入的字节区间。
///
/// 并发调用得到的区间两两不相交；测试据此验证 fetch-and-add 的独占性。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reservation {
    /// 区间起点（字节偏移）。
    pub offset: usize,
    /// 区间长度，等于对齐后的记录大小。
    pub size: usize,
}

impl Reservation {
    /// 区间终点（不含）。
    pub fn end(&self) -> usize {
        self.offset + self.size
    }

    /// 两个区间是否有重叠字节。
    pub fn overlaps(&self, other: &Reservation) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// 竞技场的瞬时统计快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EarlyBufferStats {
    /// 竞技场容量（字节，已按对齐向下取整）。
    pub capacity: usize,
    /// 已预留字节数；竞争落败的越界预留会让它超过 `capacity`。
    pub allocated: usize,
    /// 已完整写入的字节数，恒满足 `committed <= capacity`。
    pub committed: usize,
    /// 成功写入的记录数。
    pub records: u64,
    /// 被拒绝的追加次数（空间不足或单条超限）。
    pub rejected: u64,
    /// 容量边界上竞争落败、被填充占据而无法再使用的字节数。
    pub wasted: usize,
}

impl EarlyBufferStats {
    /// 尚可预留的字节数。
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.allocated)
    }
}

/// `EarlyBuffer` 是固定容量、单次使用的无锁事件竞技场。
///
/// # 模块角色（Why）
/// - 在完整的追踪/日志设施就绪之前捕获诊断事件；调用点可能处于启动早期甚至中断上下文，
///   因此追加路径既不能睡眠，也不能无界自旋，更不能分配内存。
/// - 交接完成后整个竞技场作为一个块被释放，此后不再读写。
///
/// # 核心机制（How）
/// - `allocated` 以 fetch-and-add 充当碰撞指针：每次追加独占 `[prev, prev + size)`，
///   区间互不重叠由 RMW 的原子性构造性保证，写入本身无需任何同步；
/// - 负载写完后，以 `Release` 发布带 COMPLETE 标记的 meta 字，再累加 `committed`；
/// - 回放按偏移顺序遍历，跳过填充，遇到未完成的记录即停止（长度未知，无法越过）。
///
/// # 契约说明（What）
/// - **并发**：任意多个生产者可同时调用 [`try_append`](Self::try_append)，彼此写入的字节永不重叠；
/// - **容量**：`committed` 永远不超过 `capacity`；空间不足时返回错误而不是破坏内存或 panic；
/// - **顺序**：[`records`](Self::records) 以预留顺序（fetch-and-add 的胜出顺序）产出记录。
///
/// # 设计权衡（Trade-offs）
/// - 在容量边界上竞争落败的预留无法回收：`allocated` 越过 `capacity`，落败者在容量以内的那段
///   区间写成填充并计入 `wasted`；缓冲只用一次，这部分内部碎片有界且可接受；
/// - 计数器采用 64 位原子，即便大量失败预留叠加也不会回绕到合法区间。
pub struct EarlyBuffer {
    arena: Box<[AtomicU64]>,
    capacity: usize,
    allocated: AtomicU64,
    committed: AtomicU64,
    records: AtomicU64,
    rejected: AtomicU64,
    wasted: AtomicU64,
}

impl EarlyBuffer {
    /// 创建容量为 `capacity_bytes` 的竞技场。
    ///
    /// 容量按 8 字节对齐向下取整，并截断到 [`MAX_CAPACITY_BYTES`]。容量为 0 的缓冲合法：
    /// 所有追加都会以 `OversizedPayload` 失败，用于“早期追踪关闭”的配置。
    pub fn with_capacity(capacity_bytes: usize) -> Self {
        let capacity = capacity_bytes.min(MAX_CAPACITY_BYTES) & !(WORD_BYTES - 1);
        let arena = (0..capacity / WORD_BYTES)
            .map(|_| AtomicU64::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            arena,
            capacity,
            allocated: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            records: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            wasted: AtomicU64::new(0),
        }
    }

    /// 竞技场容量（字节）。
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 追加一条文本记录。
    ///
    /// # 执行逻辑
    /// 1. 计算对齐后的记录大小，单条超过总容量时返回 [`AppendError::OversizedPayload`]；
    /// 2. 快速检查：剩余空间不足时直接失败，不触碰计数器；
    /// 3. fetch-and-add 预留，若落败越界则记入 `wasted` 并返回 [`AppendError::BufferFull`]；
    /// 4. 写入时间戳与负载，以 `Release` 发布 meta 字，最后累加 `committed`。
    pub fn try_append(&self, timestamp_ns: u64, payload: &str) -> Result<Reservation, AppendError> {
        self.append_with(timestamp_ns, payload.len(), |writer| {
            // 写入独占区间不会失败；截断同样返回 Ok。
            let _ = writer.write_str(payload);
        })
    }

    /// 追加一条格式化记录，全程不分配堆内存。
    ///
    /// 第一遍以计数器测量长度，据此预留；第二遍直接格式化进竞技场。
    /// 若 `Display` 实现两次输出长度不同，多出的部分在 `char` 边界上截断。
    pub fn try_append_fmt(
        &self,
        timestamp_ns: u64,
        args: fmt::Arguments<'_>,
    ) -> Result<Reservation, AppendError> {
        if let Some(literal) = args.as_str() {
            return self.try_append(timestamp_ns, literal);
        }
        let mut counter = LengthCounter::default();
        let _ = counter.write_fmt(args);
        self.append_with(timestamp_ns, counter.len, |writer| {
            let _ = writer.write_fmt(args);
        })
    }

    fn append_with(
        &self,
        timestamp_ns: u64,
        payload_len: usize,
        write: impl FnOnce(&mut WordWriter<'_>),
    ) -> Result<Reservation, AppendError> {
        let size = match layout::record_size(payload_len) {
            Some(size) if size <= self.capacity => size,
            other => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                return Err(AppendError::OversizedPayload {
                    record_size: other.unwrap_or(usize::MAX),
                    capacity: self.capacity,
                });
            }
        };

        let capacity = self.capacity as u64;
        let current = self.allocated.load(Ordering::Relaxed);
        if current >= capacity || capacity - current < size as u64 {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(AppendError::BufferFull {
                requested: size,
                remaining: capacity.saturating_sub(current) as usize,
            });
        }

        let start = self.allocated.fetch_add(size as u64, Ordering::Relaxed);
        if start + size as u64 > capacity {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            if start < capacity {
                self.pad_tail(start as usize);
            }
            return Err(AppendError::BufferFull {
                requested: size,
                remaining: capacity.saturating_sub(start) as usize,
            });
        }

        let offset = start as usize;
        let first = offset / WORD_BYTES;
        let words = &self.arena[first..first + size / WORD_BYTES];
        words[1].store(timestamp_ns, Ordering::Relaxed);

        let mut writer = WordWriter::new(&words[2..], payload_len);
        write(&mut writer);
        let written = writer.finish();

        words[0].store(Header::record(size, written).encode(), Ordering::Release);
        self.committed.fetch_add(size as u64, Ordering::Release);
        self.records.fetch_add(1, Ordering::Relaxed);

        Ok(Reservation { offset, size })
    }

    /// 竞争落败、但起点仍在容量以内的预留：`[start, capacity)` 同样归本次调用独占，
    /// 在此发布一段填充，回放时整体跳过，而不是误判为未完成的记录。
    fn pad_tail(&self, start: usize) {
        let size = self.capacity - start;
        self.wasted.fetch_add(size as u64, Ordering::Relaxed);
        self.arena[start / WORD_BYTES].store(Header::padding(size).encode(), Ordering::Release);
    }

    /// 当前统计快照。各字段分别读取，并发写入期间不保证彼此一致。
    pub fn stats(&self) -> EarlyBufferStats {
        EarlyBufferStats {
            capacity: self.capacity,
            allocated: self.allocated.load(Ordering::Relaxed) as usize,
            committed: self.committed.load(Ordering::Acquire) as usize,
            records: self.records.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            wasted: self.wasted.load(Ordering::Relaxed) as usize,
        }
    }

    /// 回放水位：已预留字节数与容量的较小者。
    pub fn watermark(&self) -> usize {
        (self.allocated.load(Ordering::Acquire) as usize).min(self.capacity)
    }

    /// 以预留顺序遍历 `[0, watermark)` 内的记录。
    pub fn records(&self) -> Records<'_> {
        Records {
            buffer: self,
            cursor: 0,
            limit: self.watermark(),
            scratch: Vec::new(),
            halted: false,
        }
    }
}

impl fmt::Debug for EarlyBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EarlyBuffer")
            .field("stats", &self.stats())
            .finish()
    }
}

/// [`EarlyBuffer::records`] 返回的解码迭代器。
///
/// 产出 `Err` 后：若错误可恢复（负载非 UTF-8），迭代继续；否则迭代就此结束。
pub struct Records<'a> {
    buffer: &'a EarlyBuffer,
    cursor: usize,
    limit: usize,
    scratch: Vec<u8>,
    halted: bool,
}

impl Records<'_> {
    /// 下一条待解码记录的偏移。
    pub fn offset(&self) -> usize {
        self.cursor
    }

    fn halt(&mut self, error: ReplayError) -> Option<Result<EventRecord, ReplayError>> {
        self.halted = true;
        Some(Err(error))
    }
}

impl Iterator for Records<'_> {
    type Item = Result<EventRecord, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.halted || self.cursor >= self.limit {
                return None;
            }
            let offset = self.cursor;
            let first = offset / WORD_BYTES;
            let arena = &self.buffer.arena;

            let Some(header) = Header::decode(arena[first].load(Ordering::Acquire)) else {
                return self.halt(ReplayError::Incomplete { offset });
            };
            let size = header.record_size;
            if size < WORD_BYTES || size % WORD_BYTES != 0 {
                return self.halt(ReplayError::Corrupted {
                    offset,
                    reason: "slot size is not a whole number of aligned words",
                });
            }
            if size > self.limit - offset {
                return self.halt(ReplayError::Corrupted {
                    offset,
                    reason: "slot extends past the replay watermark",
                });
            }
            if header.padding {
                self.cursor = offset + size;
                continue;
            }
            if size < HEADER_BYTES || header.payload_len > size - HEADER_BYTES {
                return self.halt(ReplayError::Corrupted {
                    offset,
                    reason: "payload length exceeds the reserved record",
                });
            }

            self.cursor = offset + size;
            let words = &arena[first..first + size / WORD_BYTES];
            let timestamp_ns = words[1].load(Ordering::Relaxed);
            layout::read_payload(&words[2..], header.payload_len, &mut self.scratch);

            return match core::str::from_utf8(&self.scratch) {
                Ok(text) => Some(Ok(EventRecord {
                    timestamp_ns,
                    payload: String::from(text),
                })),
                Err(_) => Some(Err(ReplayError::InvalidUtf8 { offset })),
            };
        }
    }
}

#[cfg(all(test, not(any(loom, spark_loom))))]
mod tests {
    use super::*;
    use alloc::{vec, vec::Vec};

    fn drain_ok(buffer: &EarlyBuffer) -> Vec<EventRecord> {
        buffer
            .records()
            .collect::<Result<Vec<_>, _>>()
            .expect("串行写入的记录必须全部可解码")
    }

    #[test]
    fn sixty_four_byte_example_keeps_both_records() {
        let buffer = EarlyBuffer::with_capacity(64);
        let first = buffer.try_append(10, "A").expect("A 必须放得下");
        let second = buffer.try_append(20, "BB").expect("BB 必须放得下");
        assert_eq!(first, Reservation { offset: 0, size: 24 });
        assert_eq!(second, Reservation { offset: 24, size: 24 });

        let records = drain_ok(&buffer);
        assert_eq!(
            records,
            vec![
                EventRecord {
                    timestamp_ns: 10,
                    payload: "A".into()
                },
                EventRecord {
                    timestamp_ns: 20,
                    payload: "BB".into()
                },
            ]
        );
        assert_eq!(buffer.stats().committed, 48);
    }

    #[test]
    fn full_buffer_rejects_without_reserving() {
        let buffer = EarlyBuffer::with_capacity(48);
        buffer.try_append(1, "0123456789").expect("首条放得下");
        let err = buffer
            .try_append(2, "0123456789abcdef")
            .expect_err("第二条超出剩余空间");
        assert_eq!(
            err,
            AppendError::BufferFull {
                requested: 32,
                remaining: 16
            }
        );
        // 快速检查失败不推进 allocated，更小的记录仍可写入。
        buffer.try_append(3, "").expect("空负载恰好占满剩余 16 字节");

        let stats = buffer.stats();
        assert_eq!(stats.allocated, 48);
        assert_eq!(stats.committed, 48);
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.wasted, 0);
        assert_eq!(drain_ok(&buffer).len(), 2);
    }

    #[test]
    fn oversized_payload_is_rejected_even_when_empty() {
        let buffer = EarlyBuffer::with_capacity(32);
        let err = buffer
            .try_append(1, "this payload is far too long")
            .expect_err("单条超过总容量");
        assert!(matches!(err, AppendError::OversizedPayload { capacity: 32, .. }));
        assert_eq!(buffer.stats().allocated, 0);
    }

    #[test]
    fn zero_capacity_buffer_accepts_nothing() {
        let buffer = EarlyBuffer::with_capacity(0);
        assert!(buffer.try_append(1, "").is_err());
        assert_eq!(buffer.records().count(), 0);
    }

    #[test]
    fn capacity_is_rounded_down_to_word_alignment() {
        assert_eq!(EarlyBuffer::with_capacity(70).capacity(), 64);
    }

    #[test]
    fn formatted_records_are_written_in_place() {
        let buffer = EarlyBuffer::with_capacity(128);
        buffer
            .try_append_fmt(5, format_args!("cpu{} online after {}us", 3, 120))
            .expect("格式化记录放得下");
        let records = drain_ok(&buffer);
        assert_eq!(records[0].payload, "cpu3 online after 120us");
        assert_eq!(records[0].timestamp_ns, 5);
    }

    /// 第一次格式化输出较短、之后变长的 `Display`。
    struct Growing {
        calls: core::cell::Cell<u32>,
    }

    impl fmt::Display for Growing {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let calls = self.calls.get();
            self.calls.set(calls + 1);
            if calls == 0 {
                f.write_str("ab")
            } else {
                f.write_str("aé中")
            }
        }
    }

    #[test]
    fn formatted_output_growing_between_passes_is_truncated_on_char_boundary() {
        let buffer = EarlyBuffer::with_capacity(128);
        let growing = Growing {
            calls: core::cell::Cell::new(0),
        };
        let reservation = buffer
            .try_append_fmt(7, format_args!("{growing}"))
            .expect("按第一遍的长度预留");
        assert_eq!(reservation.size, 24);
        assert_eq!(growing.calls.get(), 2, "测量与写入各格式化一次");
        buffer.try_append(8, "next").expect("后续记录放得下");

        let records = drain_ok(&buffer);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, "a", "多出的输出在 char 边界上截断");
        assert_eq!(records[0].timestamp_ns, 7);
        assert_eq!(records[1].payload, "next");
    }

    #[test]
    fn lost_race_at_capacity_leaves_skippable_padding() {
        let buffer = EarlyBuffer::with_capacity(64);
        buffer.try_append(1, "first").expect("首条放得下");
        // 模拟另一写者已通过快速检查、随后在 fetch-and-add 中落败：直接推进到边界附近。
        buffer.allocated.fetch_add(16, Ordering::Relaxed);
        buffer.arena[3].store(Header::record(16, 0).encode(), Ordering::Release);
        let start = buffer.allocated.fetch_add(40, Ordering::Relaxed) as usize;
        assert_eq!(start, 40);
        buffer.pad_tail(start);

        let records = drain_ok(&buffer);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, "first");
        assert_eq!(records[1].payload, "");
        assert_eq!(buffer.stats().wasted, 24);
    }

    #[test]
    fn unpublished_record_halts_replay() {
        let buffer = EarlyBuffer::with_capacity(64);
        buffer.try_append(1, "done").expect("首条放得下");
        // 模拟一个已预留但尚未发布 meta 字的慢写者。
        buffer.allocated.fetch_add(24, Ordering::Relaxed);

        let mut records = buffer.records();
        assert!(matches!(records.next(), Some(Ok(_))));
        assert_eq!(
            records.next(),
            Some(Err(ReplayError::Incomplete { offset: 24 }))
        );
        assert_eq!(records.next(), None);
    }
}
