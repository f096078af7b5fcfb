#![cfg(any(loom, spark_loom))]

use loom::{model, sync::Arc, thread};
use spark_early::{DrainReport, EarlyBuffer, EarlyTraceLog, ManualClock, MemorySink};

#[test]
fn concurrent_appends_reserve_disjoint_ranges() {
    //
    // 教案级说明：穷举两个写者在碰撞指针上的全部交错。
    // - **Why**：fetch-and-add 之前的快速检查与之后的越界判定之间存在窗口，需要确认任何调度下都不会重叠；
    // - **How**：容量 40 字节只够放下一条 24 字节记录，迫使两个写者在边界上竞争；
    // - **What**：成功的预留互不重叠，回放只看到已发布的完整记录，越界落败者留下的尾部被当作填充跳过。
    model(|| {
        let buffer = Arc::new(EarlyBuffer::with_capacity(40));

        let writers: Vec<_> = ["a", "b"]
            .into_iter()
            .enumerate()
            .map(|(ts, payload)| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || buffer.try_append(ts as u64, payload).ok())
            })
            .collect();

        let reservations: Vec<_> = writers
            .into_iter()
            .filter_map(|handle| handle.join().expect("写者线程不应 panic"))
            .collect();

        if let [first, second] = reservations.as_slice() {
            assert!(!first.overlaps(second), "预留区间重叠: {first:?} / {second:?}");
        }

        let stats = buffer.stats();
        assert!(stats.committed <= stats.capacity);
        let replayed: Vec<_> = buffer
            .records()
            .collect::<Result<_, _>>()
            .expect("写者全部结束后不应存在未完成记录");
        assert_eq!(replayed.len(), reservations.len());
    });
}

#[test]
fn handover_racing_a_producer_delivers_exactly_once() {
    //
    // 教案级说明：验证交接门在任意调度下都不会让事件丢失或重复。
    // - **Why**：生产者与交接方同时运行时，事件要么落入竞技场随后被回放，要么在交接后直达 Sink；
    // - **How**：一个生产者写两条事件，主线程并发调用 `drain`，Loom 探索所有交错；
    // - **What**：Sink 恰好收到两条事件，`replayed + forwarded == 2`。
    model(|| {
        let log = Arc::new(EarlyTraceLog::with_capacity(
            256,
            MemorySink::new(),
            ManualClock::new(0),
        ));

        let producer = {
            let log = Arc::clone(&log);
            thread::spawn(move || {
                log.record_at(1, "first");
                log.record_at(2, "second");
            })
        };

        let report = log.drain();
        producer.join().expect("生产者线程不应 panic");

        // 回放与直达可能交错，按时间戳排序后比较集合。
        let mut records = log.sink().records();
        records.sort_by_key(|record| record.timestamp_ns);
        let payloads: Vec<_> = records.into_iter().map(|record| record.payload).collect();
        assert_eq!(payloads, ["first", "second"]);

        let stats = log.stats();
        assert_eq!(stats.replayed, report.replayed);
        assert_eq!(stats.replayed + stats.forwarded, 2);
        assert_eq!(stats.dropped, 0);
        assert_eq!(log.drain(), DrainReport::already_drained());
    });
}
