//! Telemetry - 日志初始化
//!
//! `RUST_LOG` 优先于配置中的日志级别

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

fn build_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},cadenza={}", config.level, config.level))
    })
}

/// 初始化全局 tracing 订阅者
///
/// 重复调用是安全的：已有全局订阅者时返回 `false`
pub fn init_tracing(config: &LogConfig) -> bool {
    let filter = build_filter(config);
    let result = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    };
    result.is_ok()
}
