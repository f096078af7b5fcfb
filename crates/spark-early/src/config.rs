use alloc::string::ToString;

use serde::Deserialize;

use crate::{error::ConfigError, layout::MAX_CAPACITY_BYTES};

/// 默认竞技场容量：64 KiB。
pub const DEFAULT_CAPACITY_BYTES: usize = 64 * 1024;

/// 早期事件缓冲的配置。
///
/// # 教案式说明
/// - **意图 (Why)**：容量与开关需要在任何子系统就绪之前确定，来源通常是启动命令行；
///   宿主若在更晚阶段才拿到结构化配置（TOML/JSON），同样可以反序列化得到。
/// - **契约 (What)**：
///   - `enabled = false` 时不分配竞技场，交接前的事件全部丢弃并计数，交接后照常直达 Sink；
///   - `capacity_bytes` 不得超过 [`MAX_CAPACITY_BYTES`]，实际容量按 8 字节向下取整；
///   - 缺省字段取默认值（开启、64 KiB）。
/// - **命令行语法 (How)**：以空白分隔的 `key=value`，识别 `early_trace=on|off`
///   与 `early_trace_size=<n>[K|M]`，其他参数原样忽略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EarlyTraceConfig {
    /// 是否启用早期缓冲。
    pub enabled: bool,
    /// 竞技场容量（字节）。
    pub capacity_bytes: usize,
}

impl Default for EarlyTraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
        }
    }
}

impl EarlyTraceConfig {
    /// 默认配置：开启，64 KiB。
    pub fn new() -> Self {
        Self::default()
    }

    /// 关闭早期缓冲的配置。
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// 覆盖竞技场容量。
    pub fn with_capacity(mut self, capacity_bytes: usize) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }

    /// 覆盖开关。
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// 校验容量上限。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity_bytes > MAX_CAPACITY_BYTES {
            return Err(ConfigError::CapacityTooLarge {
                requested: self.capacity_bytes,
                max: MAX_CAPACITY_BYTES,
            });
        }
        Ok(())
    }

    /// 实际会分配的竞技场容量；关闭时为 0。
    pub fn effective_capacity(&self) -> usize {
        if self.enabled {
            self.capacity_bytes.min(MAX_CAPACITY_BYTES)
        } else {
            0
        }
    }

    /// 从启动命令行解析配置，未出现的参数保持默认值。
    pub fn from_cmdline(cmdline: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for token in cmdline.split_whitespace() {
            let Some((key, value)) = token.split_once('=') else {
                continue;
            };
            match key {
                "early_trace" => config.enabled = parse_switch(value)?,
                "early_trace_size" => config.capacity_bytes = parse_size(value)?,
                _ => {}
            }
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_switch(value: &str) -> Result<bool, ConfigError> {
    match value {
        "on" | "1" | "y" | "yes" | "true" => Ok(true),
        "off" | "0" | "n" | "no" | "false" => Ok(false),
        _ => Err(ConfigError::InvalidSwitch {
            value: value.to_string(),
        }),
    }
}

fn parse_size(value: &str) -> Result<usize, ConfigError> {
    let invalid = || ConfigError::InvalidSize {
        value: value.to_string(),
    };
    let (digits, shift) = match value.as_bytes().last() {
        Some(b'k' | b'K') => (&value[..value.len() - 1], 10),
        Some(b'm' | b'M') => (&value[..value.len() - 1], 20),
        _ => (value, 0),
    };
    let base: usize = digits.parse().map_err(|_| invalid())?;
    base.checked_mul(1 << shift).ok_or_else(invalid)
}

#[cfg(all(test, not(any(loom, spark_loom))))]
mod tests {
    use super::*;

    #[test]
    fn cmdline_overrides_defaults_and_ignores_unrelated_params() {
        let config = EarlyTraceConfig::from_cmdline(
            "console=ttyS0 early_trace_size=128K quiet early_trace=on root=/dev/vda",
        )
        .expect("合法命令行");
        assert_eq!(config, EarlyTraceConfig::new().with_capacity(128 * 1024));
    }

    #[test]
    fn cmdline_can_disable_early_trace() {
        let config = EarlyTraceConfig::from_cmdline("early_trace=off").expect("合法命令行");
        assert!(!config.enabled);
        assert_eq!(config.effective_capacity(), 0);
    }

    #[test]
    fn malformed_values_are_reported() {
        assert_eq!(
            EarlyTraceConfig::from_cmdline("early_trace=maybe"),
            Err(ConfigError::InvalidSwitch {
                value: "maybe".into()
            })
        );
        assert_eq!(
            EarlyTraceConfig::from_cmdline("early_trace_size=12Q"),
            Err(ConfigError::InvalidSize {
                value: "12Q".into()
            })
        );
        assert!(matches!(
            EarlyTraceConfig::from_cmdline("early_trace_size=8192M"),
            Err(ConfigError::CapacityTooLarge { .. })
        ));
    }
}
