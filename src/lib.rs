//! # HDR QA
//!
//! 高剂量率(HDR)后装治疗计划的独立剂量验证工具集，汇总各子模块：
//! - `core`：错误定义、计划数据模型和几何工具
//! - `dicom`：RT Plan 读取与计划模型提取
//! - `dose`：TG-43 剂量计算引擎与点剂量比对
//! - `config`：配置加载与日志初始化

pub use hdr_config as config;
pub use hdr_core as core;
pub use hdr_dicom as dicom;
pub use hdr_dose as dose;
