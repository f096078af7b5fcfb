use crate::{buffer::EarlyBuffer, error::ReplayError, sink::Sink};

/// 一次 `drain()` 的结果。
///
/// # 契约说明（What）
/// - `first`：本次调用是否真正完成了交接；重复调用返回 `false` 且其余字段为零；
/// - `watermark`：交接时观测到的回放上界（字节）；
/// - `replayed`：送达 Sink 的记录数；
/// - `incomplete`：遇到未发布完成标记的记录而提前停止的次数（0 或 1）；
/// - `corrupted`：头部损坏或负载非 UTF-8 而未送达的记录数。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// 本次调用是否真正完成了交接。
    pub first: bool,
    /// 回放上界（字节）。
    pub watermark: usize,
    /// 送达 Sink 的记录数。
    pub replayed: u64,
    /// 因未完成记录而提前停止的次数。
    pub incomplete: u64,
    /// 未能送达的损坏记录数。
    pub corrupted: u64,
}

impl DrainReport {
    /// 重复交接的空报告。
    pub fn already_drained() -> Self {
        Self::default()
    }

    /// 回放是否完整覆盖了水位以下的全部记录。
    pub fn is_clean(&self) -> bool {
        self.incomplete == 0 && self.corrupted == 0
    }
}

/// 将已退役的竞技场按预留顺序回放到 `sink`。
///
/// 调用方必须保证不再有写者：经由 [`HandoverGate::retire`](crate::HandoverGate::retire)
/// 取得所有权即满足这一点。遇到不可恢复的解码错误时停止，之后的区间不再送达。
// 未启用 `tracing` 时日志宏展开为空，错误里的诊断字段不再被读取。
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
pub fn replay(buffer: &EarlyBuffer, sink: &(impl Sink + ?Sized)) -> DrainReport {
    let mut report = DrainReport {
        first: true,
        watermark: buffer.watermark(),
        ..DrainReport::default()
    };

    sink.begin_replay(report.watermark);
    for item in buffer.records() {
        match item {
            Ok(record) => {
                sink.replay(record.timestamp_ns, &record.payload);
                report.replayed += 1;
            }
            Err(ReplayError::Incomplete { offset }) => {
                crate::early_warn!(
                    offset,
                    "early trace replay stopped at an unfinished record"
                );
                report.incomplete += 1;
            }
            Err(error) => {
                crate::early_warn!(
                    offset = error.offset(),
                    %error,
                    "early trace record dropped during replay"
                );
                report.corrupted += 1;
            }
        }
    }
    sink.end_replay(&report);
    report
}

#[cfg(all(test, not(any(loom, spark_loom))))]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use alloc::{vec, vec::Vec};

    #[test]
    fn replay_preserves_reservation_order() {
        let buffer = EarlyBuffer::with_capacity(256);
        for (ts, text) in [(3, "c"), (1, "a"), (2, "b")] {
            buffer.try_append(ts, text).expect("容量充足");
        }
        let sink = MemorySink::new();
        let report = replay(&buffer, &sink);

        let payloads: Vec<_> = sink.records().into_iter().map(|r| r.payload).collect();
        assert_eq!(payloads, ["c", "a", "b"], "顺序取决于预留先后，而非时间戳");
        assert_eq!(report.replayed, 3);
        assert!(report.is_clean());
        assert!(sink.events().iter().all(|event| event.replayed));
        assert_eq!(sink.replays(), vec![report]);
    }

    #[test]
    fn empty_buffer_replays_nothing_but_still_brackets() {
        let buffer = EarlyBuffer::with_capacity(64);
        let sink = MemorySink::new();
        let report = replay(&buffer, &sink);
        assert_eq!(report.replayed, 0);
        assert_eq!(report.watermark, 0);
        assert_eq!(sink.replays().len(), 1);
    }
}
