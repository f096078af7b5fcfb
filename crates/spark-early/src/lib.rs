#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![doc = "spark-early: 启动早期的无锁事件缓冲与一次性交接（drain-and-handover）。"]
#![doc = ""]
#![doc = "== 适用场景 =="]
#![doc = "完整的追踪/日志设施就绪之前（调度器、分配器乃至订阅者都可能尚未初始化），诊断事件先写入固定容量的竞技场；"]
#![doc = "下游 Sink 就绪后调用一次 `drain()`，按写入顺序回放全部事件并永久切换到直达路径。"]
#![doc = ""]
#![doc = "== 组件 =="]
#![doc = "1. `EarlyBuffer`：fetch-and-add 碰撞指针分配的无锁竞技场，多写者互不重叠；"]
#![doc = "2. `HandoverGate`：读写自旋锁守护的 `Active -> Retired` 单向门；"]
#![doc = "3. `drain`：交接者独占地翻转门、取走竞技场，出锁后回放并释放。"]
#![doc = ""]
#![doc = "== 内存分配依赖 =="]
#![doc = "竞技场以 `Box<[AtomicU64]>` 持有，因此需要分配器（`alloc`）；追加路径本身从不分配。"]

extern crate alloc;

mod macros;

pub(crate) use macros::{early_debug, early_warn};

mod sync;

pub mod buffer;
pub mod clock;
pub mod config;
pub mod drain;
pub mod error;
pub mod gate;
pub mod layout;
pub mod log;
pub mod sink;

pub use buffer::{EarlyBuffer, EarlyBufferStats, EventRecord, Records, Reservation};
#[cfg(feature = "std")]
pub use clock::MonotonicClock;
pub use clock::{Clock, ManualClock};
pub use config::{DEFAULT_CAPACITY_BYTES, EarlyTraceConfig};
pub use drain::DrainReport;
pub use error::{AppendError, ConfigError, ReplayError};
pub use gate::HandoverGate;
pub use layout::{HEADER_BYTES, MAX_CAPACITY_BYTES, WORD_BYTES};
pub use log::{EarlyTraceLog, EarlyTraceStats};
pub use sink::{CapturedEvent, FnSink, MemorySink, Sink};
