use core::fmt;

use crate::sync::{AtomicBool, Ordering, RwLock};

/// 交接门的两个状态：`Active` 持有早期路径的资源，`Retired` 为终态。
enum GateState<T> {
    Active(T),
    Retired,
}

/// `HandoverGate` 保证“写入早期缓冲”到“直达 Sink”的切换被所有生产者一致地观测到。
///
/// # 设计初衷（Why）
/// - 生产者不能横跨切换：要么整条记录写进早期缓冲，要么整条记录直接交给 Sink；
/// - 切换只发生一次且不可逆，交接者需要独占地取走早期资源（竞技场），以便回放后释放。
///
/// # 核心机制（How）
/// - 状态放在读写自旋锁内：生产者在整个追加期间持有共享侧，[`retire`](Self::retire)
///   先占住升级位再升级为独占侧，因此它一定等到所有在途追加完成后才翻转状态；
/// - 升级位一旦置上，新的共享侧请求就会自旋等待，交接的等待时间只取决于已经在途的生产者，
///   源源不断的新生产者无法让交接饿死；
/// - 写锁的释放充当内存屏障，回放线程随后读取到的一定是完整写入的数据；
/// - `retired` 是状态的无锁镜像，只用于 [`is_retired`](Self::is_retired) 这类查询，
///   路由决策始终以锁内状态为准。
///
/// # 契约说明（What）
/// - `Active -> Retired` 是唯一的转换，`Retired` 之后永不回退；
/// - `retire` 只会成功一次：首次返回 `Some(T)`，之后恒为 `None`；
/// - 锁为自旋锁，不依赖调度器；独占区只做 O(1) 的状态交换；
/// - 交接等待期间到达的生产者被挡在门外，交接完成后直接走直达路径。
///
/// # 设计权衡（Trade-offs）
/// - 与单个原子代际标志相比，读写锁多一次共享计数的 RMW，但免去了“检查标志后、写入前被交接”
///   这一窗口的额外协议，语义更直接。
pub struct HandoverGate<T> {
    state: RwLock<GateState<T>>,
    retired: AtomicBool,
}

impl<T> HandoverGate<T> {
    /// 以 `Active` 状态创建，持有早期路径资源 `active`。
    pub fn new(active: T) -> Self {
        Self {
            state: RwLock::new(GateState::Active(active)),
            retired: AtomicBool::new(false),
        }
    }

    /// 直接以 `Retired` 状态创建，所有调用方从一开始就走直达路径。
    pub fn retired() -> Self {
        Self {
            state: RwLock::new(GateState::Retired),
            retired: AtomicBool::new(true),
        }
    }

    /// 在共享侧内访问早期资源。
    ///
    /// `Active` 时在持锁期间执行 `f` 并返回 `Some`；`Retired` 时释放共享侧后返回 `None`，
    /// 调用方随后在锁外改走直达路径。
    pub fn with_active<R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let guard = self.state.read();
        match &*guard {
            GateState::Active(active) => Some(f(active)),
            GateState::Retired => None,
        }
    }

    /// 取独占侧翻转到 `Retired`，并交出早期资源。
    ///
    /// 先取升级侧：它与在途的共享侧兼容，但会拒绝新的共享侧请求；随后升级为独占侧。
    pub fn retire(&self) -> Option<T> {
        let previous = {
            let mut guard = self.state.upgradeable_read().upgrade();
            let previous = core::mem::replace(&mut *guard, GateState::Retired);
            self.retired.store(true, Ordering::Release);
            previous
        };
        match previous {
            GateState::Active(active) => Some(active),
            GateState::Retired => None,
        }
    }

    /// 是否已经交接。
    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }
}

impl<T> fmt::Debug for HandoverGate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoverGate")
            .field("retired", &self.is_retired())
            .finish()
    }
}

#[cfg(all(test, not(any(loom, spark_loom))))]
mod tests {
    use super::*;

    #[test]
    fn retire_hands_out_resource_exactly_once() {
        let gate = HandoverGate::new(7_u32);
        assert_eq!(gate.with_active(|v| *v + 1), Some(8));
        assert!(!gate.is_retired());

        assert_eq!(gate.retire(), Some(7));
        assert!(gate.is_retired());
        assert_eq!(gate.with_active(|v| *v), None);
        assert_eq!(gate.retire(), None, "第二次交接必须是无操作");
    }

    /// ## 等待中的交接不再放行新的共享侧
    ///
    /// - **意图 (Why)**：生产者一个接一个地重叠进入时，交接不能被无限推迟；
    /// - **逻辑 (How)**：第一个生产者停在共享侧内，交接线程随后开始等待；通过读者计数
    ///   （升级位计为一名读者）确认交接已占住升级位，再放出第二个生产者；
    /// - **契约 (What)**：第二个生产者在交接完成前不会被放行；第一个生产者离开后交接立即完成，
    ///   第二个生产者随后看到 `Retired`。
    #[test]
    fn waiting_retire_turns_away_new_producers() {
        use std::{
            sync::{Arc, mpsc},
            thread,
            time::{Duration, Instant},
        };

        let gate = Arc::new(HandoverGate::new(11_u32));
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let first = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || {
                gate.with_active(|value| {
                    entered_tx.send(()).expect("主线程仍在等待");
                    release_rx.recv().expect("主线程会放行");
                    *value
                })
            })
        };
        entered_rx.recv().expect("第一个生产者应进入共享侧");

        let (retired_tx, retired_rx) = mpsc::channel();
        let retirer = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || retired_tx.send(gate.retire()).expect("主线程仍在等待"))
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while gate.state.reader_count() < 2 {
            assert!(Instant::now() < deadline, "交接线程迟迟没有占住升级位");
            thread::yield_now();
        }

        let (late_tx, late_rx) = mpsc::channel();
        let late = {
            let gate = Arc::clone(&gate);
            thread::spawn(move || late_tx.send(gate.with_active(|value| *value)).expect("主线程仍在等待"))
        };
        assert!(
            late_rx.recv_timeout(Duration::from_millis(100)).is_err(),
            "交接等待期间新的生产者不应被放行"
        );

        release_tx.send(()).expect("第一个生产者仍在等待");
        assert_eq!(
            retired_rx.recv_timeout(Duration::from_secs(5)),
            Ok(Some(11)),
            "在途生产者离开后交接必须完成"
        );
        assert_eq!(late_rx.recv_timeout(Duration::from_secs(5)), Ok(None));

        assert_eq!(first.join().expect("生产者线程不应 panic"), Some(11));
        retirer.join().expect("交接线程不应 panic");
        late.join().expect("生产者线程不应 panic");
    }

    #[test]
    fn gate_created_retired_never_admits() {
        let gate: HandoverGate<u32> = HandoverGate::retired();
        assert!(gate.is_retired());
        assert_eq!(gate.with_active(|_| ()), None);
        assert_eq!(gate.retire(), None);
    }
}
