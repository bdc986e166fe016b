//! 日志初始化

use crate::config::LoggingConfig;
use hdr_core::{HdrError, Result};
use tracing_subscriber::EnvFilter;

/// 构造日志过滤器，设置了 `RUST_LOG` 时以其为准
pub fn env_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| HdrError::Config(format!("日志级别 {} 无效: {}", level, e)))
}

/// 安装全局日志订阅器，日志写到标准错误，标准输出留给报告
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.level)?)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr);

    let result = if config.compact {
        builder.compact().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| HdrError::Config(format!("日志系统初始化失败: {}", e)))
}
