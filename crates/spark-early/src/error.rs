//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义早期事件缓冲的全部失败语义：预留失败、回放解码失败、配置解析失败；
//! - 这些错误都不是致命的：诊断设施绝不能因为缓冲压力而拖垮宿主。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`；`thiserror` 以 `default-features = false` 引入，
//!   因此在 `no_std` 轨道上同样实现 `core::error::Error`；
//! - 变体均为 `Clone + Eq`，便于测试直接断言。

use alloc::string::String;

use thiserror::Error;

/// 在竞技场中预留记录空间失败的原因。
///
/// # 教案式说明
/// - **意图 (Why)**：`record()` 本身没有错误返回，失败的事件会被静默丢弃并计数；
///   但直接使用 [`EarlyBuffer`](crate::EarlyBuffer) 的调用方需要知道“为什么”失败，以决定是否改走直达 Sink 的路径。
/// - **契约 (What)**：两个变体都保证竞技场内容未被破坏；`BufferFull` 可能伴随计入 `wasted` 的越界预留。
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AppendError {
    /// 剩余空间不足以容纳本条记录（含竞争中落败的越界预留）。
    #[error("early buffer full: record needs {requested} bytes, {remaining} bytes remain")]
    BufferFull { requested: usize, remaining: usize },

    /// 单条记录自身就超过了竞技场总容量，无论何时都无法写入。
    #[error("record of {record_size} bytes can never fit into a {capacity}-byte early buffer")]
    OversizedPayload { record_size: usize, capacity: usize },
}

impl AppendError {
    /// 返回本次尝试所需的记录字节数。
    pub fn requested(&self) -> usize {
        match *self {
            AppendError::BufferFull { requested, .. } => requested,
            AppendError::OversizedPayload { record_size, .. } => record_size,
        }
    }
}

/// 回放阶段解码单条记录失败的原因。
///
/// - `Incomplete`：该偏移处的记录尚未发布完成标记。记录长度未知，回放必须在此停止；
/// - `Corrupted`：头部自描述的尺寸不合法（越界、未对齐或小于头部），同样只能停止；
/// - `InvalidUtf8`：头部合法但负载不是 UTF-8，跳过该条后继续。
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ReplayError {
    #[error("record at offset {offset} was reserved but never completed")]
    Incomplete { offset: usize },

    #[error("record header at offset {offset} is corrupted: {reason}")]
    Corrupted { offset: usize, reason: &'static str },

    #[error("record payload at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },
}

impl ReplayError {
    /// 返回出错记录在竞技场中的字节偏移。
    pub fn offset(&self) -> usize {
        match *self {
            ReplayError::Incomplete { offset }
            | ReplayError::Corrupted { offset, .. }
            | ReplayError::InvalidUtf8 { offset } => offset,
        }
    }

    /// 该错误之后回放能否继续。
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ReplayError::InvalidUtf8 { .. })
    }
}

/// 解析或校验 [`EarlyTraceConfig`](crate::EarlyTraceConfig) 时的错误。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// `early_trace=` 的取值无法识别。
    #[error("unrecognised early_trace switch `{value}` (expected on/off)")]
    InvalidSwitch { value: String },

    /// `early_trace_size=` 的取值不是合法的字节数。
    #[error("invalid early_trace_size `{value}`")]
    InvalidSize { value: String },

    /// 请求的容量超过记录头可描述的上限。
    #[error("early buffer capacity {requested} exceeds the maximum of {max} bytes")]
    CapacityTooLarge { requested: usize, max: usize },
}
