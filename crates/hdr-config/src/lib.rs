//! 剂量验证系统的配置与日志初始化

pub mod config;
pub mod logging;

pub use crate::config::{AnalysisConfig, ConfigValidator, LoggingConfig, QaConfig, SourceConfig};
pub use logging::init_logging;
