//! 错误定义模块

use thiserror::Error;

/// 剂量验证系统统一错误类型
#[derive(Error, Debug)]
pub enum HdrError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("DICOM处理错误: {0}")]
    Dicom(String),

    /// 计划记录缺少必要的临床字段，或字段内容不合法
    #[error("治疗计划格式错误: {0}")]
    MalformedPlan(String),

    /// 参考数据表存在非数值单元格、行宽不一致或为空
    #[error("参考数据表格式错误: {0}")]
    TableFormat(String),

    /// 源与计算点重合 (r = 0)
    #[error("几何退化: {0}")]
    DegenerateGeometry(String),

    /// 参考剂量为零或负数，无法计算百分比偏差
    #[error("参考剂量无效: {0}")]
    InvalidReferenceDose(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 剂量验证系统统一结果类型
pub type Result<T> = std::result::Result<T, HdrError>;
