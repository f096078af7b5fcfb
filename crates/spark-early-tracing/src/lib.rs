//! spark-early 与 `tracing` 生态的集成层。
//!
//! # 教案级导览
//!
//! - **Why**：早期缓冲只负责“先存下来”；真正的日志设施通常是进程级 `tracing` Subscriber，
//!   需要一个入口把“安装 Subscriber”与“交接早期缓冲”串成启动流程中的一步；
//! - **How**：[`install`] 组装 `fmt + EnvFilter` 并设为全局 Subscriber，[`install_and_drain`]
//!   在安装成功后立即调用 [`EarlyTraceLog::drain`]，早期事件经 [`TracingSink`] 变成 INFO 事件；
//! - **What**：安装只允许一次，外部已设置 Subscriber 时拒绝覆盖。

use std::sync::OnceLock;

use spark_early::{Clock, DrainReport, EarlyTraceLog, Sink};
use tracing::dispatcher;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

mod sink;

pub use sink::{TARGET, TracingSink};

/// 标记是否已由本 crate 完成安装。
static INSTALLED: OnceLock<()> = OnceLock::new();

/// 安装阶段可能出现的错误。
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `install` 被重复调用。
    #[error("spark-early-tracing 已完成安装，禁止重复调用 install")]
    AlreadyInstalled,
    /// 外部提前设置了全局 `tracing` Subscriber。
    #[error("全局 tracing Subscriber 已存在，spark-early-tracing 无法覆盖")]
    SubscriberAlreadySet,
    /// 设置全局 Subscriber 失败的底层错误。
    #[error("设置 tracing 全局 Subscriber 失败: {0}")]
    SetGlobalSubscriber(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

/// 安装全局 `tracing` Subscriber：`EnvFilter`（默认 `info`）+ `fmt` 输出。
///
/// # 契约说明（What）
/// - 多次调用返回 [`Error::AlreadyInstalled`]；
/// - 调用前若外部已设置 Subscriber，返回 [`Error::SubscriberAlreadySet`]。
pub fn install() -> Result<(), Error> {
    if INSTALLED.get().is_some() {
        return Err(Error::AlreadyInstalled);
    }
    if dispatcher::has_been_set() {
        return Err(Error::SubscriberAlreadySet);
    }

    let subscriber = tracing_subscriber::registry()
        .with(build_env_filter())
        .with(tracing_subscriber::fmt::layer());
    tracing::subscriber::set_global_default(subscriber)?;

    INSTALLED.set(()).map_err(|_| Error::AlreadyInstalled)
}

/// 安装全局 Subscriber，随后交接 `log`。
///
/// 安装失败时不会交接，早期缓冲保持原状，调用方可以换一种方式再调用 [`EarlyTraceLog::drain`]。
pub fn install_and_drain<S: Sink, C: Clock>(log: &EarlyTraceLog<S, C>) -> Result<DrainReport, Error> {
    install()?;
    let report = log.drain();
    tracing::info!(
        target: TARGET,
        replayed = report.replayed,
        incomplete = report.incomplete,
        corrupted = report.corrupted,
        "early trace buffer handed over to tracing"
    );
    Ok(report)
}

fn build_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
