//! 配置管理
//!
//! 配置按以下顺序叠加：内置默认值、TOML 配置文件、`HDR_QA__` 前缀的环境变量

use config::{Config, Environment, File, FileFormat, Source};
use hdr_core::{HdrError, Result};
use hdr_dose::{AnalysisOptions, DifferenceBasis};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// 环境变量前缀，例如 `HDR_QA__ANALYSIS__TOLERANCE_PERCENT=2.0`
pub const ENV_PREFIX: &str = "HDR_QA";
const ENV_SEPARATOR: &str = "__";

/// 剂量验证完整配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// 放射源模型
    pub source: SourceConfig,
    /// 比对分析
    pub analysis: AnalysisConfig,
    /// 日志
    pub logging: LoggingConfig,
}

/// 放射源模型配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// 源型号
    pub name: String,
    /// 剂量率常数 Λ (cGy·h⁻¹·U⁻¹)
    pub dose_rate_constant: f64,
    /// 空气比释动能强度 Sk (U)；未配置时由计划中的源标定值做衰变校正
    pub air_kerma_strength: Option<f64>,
    /// 活性长度 L (cm)，0 表示点源
    pub active_length_cm: f64,
    /// 径向剂量函数数据表
    pub radial_dose_table: PathBuf,
    /// 各向异性函数数据表
    pub anisotropy_table: PathBuf,
    /// 径向剂量数据表的取值列，缺省为第二列
    pub radial_dose_column: Option<String>,
    /// 各向异性数据表的取值列，缺省为第三列
    pub anisotropy_column: Option<String>,
}

/// 比对分析配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// 允许的百分比偏差
    pub tolerance_percent: f64,
    pub difference_basis: DifferenceBasis,
    /// 参与计算的通道，缺省为全部
    pub channels: Option<Vec<u32>>,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别，`RUST_LOG` 优先
    pub level: String,
    /// 彩色输出
    pub ansi: bool,
    /// 紧凑格式
    pub compact: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            name: "mHDR-v2r".to_string(),
            dose_rate_constant: 1.109,
            air_kerma_strength: None,
            active_length_cm: 0.36,
            radial_dose_table: PathBuf::from("data/radial_dose.csv"),
            anisotropy_table: PathBuf::from("data/anisotropy.csv"),
            radial_dose_column: None,
            anisotropy_column: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tolerance_percent: 1.0,
            difference_basis: DifferenceBasis::Reference,
            channels: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
            compact: false,
        }
    }
}

impl QaConfig {
    /// 加载配置；`path` 指定的文件必须存在
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path.map(|p| File::from(p).format(FileFormat::Toml).required(true));
        let config = Self::build(file, true)?;
        match path {
            Some(p) => info!("配置加载成功: {}", p.display()),
            None => info!("未指定配置文件，使用默认配置与环境变量"),
        }
        Ok(config)
    }

    /// 从 TOML 文本加载，不读取环境变量
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Self::build(Some(File::from_str(text, FileFormat::Toml)), false)
    }

    fn build<S>(file: Option<S>, with_env: bool) -> Result<Self>
    where
        S: Source + Send + Sync + 'static,
    {
        let defaults = Config::try_from(&QaConfig::default())
            .map_err(|e| HdrError::Config(format!("默认配置序列化失败: {}", e)))?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(file) = file {
            builder = builder.add_source(file);
        }
        if with_env {
            builder = builder.add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator(ENV_SEPARATOR)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("analysis.channels"),
            );
        }

        let settings = builder
            .build()
            .map_err(|e| HdrError::Config(format!("配置读取失败: {}", e)))?;
        let config: QaConfig = settings
            .try_deserialize()
            .map_err(|e| HdrError::Config(format!("配置解析失败: {}", e)))?;

        ConfigValidator::new().validate(&config)?;
        debug!("生效配置: {:?}", config);
        Ok(config)
    }

    /// 导出为 TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| HdrError::Config(format!("配置导出失败: {}", e)))
    }

    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            tolerance_percent: self.analysis.tolerance_percent,
            difference_basis: self.analysis.difference_basis,
            channels: self.analysis.channels.clone(),
        }
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

#[derive(Debug)]
struct ValidationRule {
    field_path: &'static str,
    validator: fn(&QaConfig) -> std::result::Result<(), String>,
}

fn positive(value: f64) -> bool {
    value > 0.0 && value.is_finite()
}

impl ConfigValidator {
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "source.name",
                validator: |config| {
                    if config.source.name.trim().is_empty() {
                        Err("源型号不能为空".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "source.dose_rate_constant",
                validator: |config| {
                    if positive(config.source.dose_rate_constant) {
                        Ok(())
                    } else {
                        Err(format!("剂量率常数必须为正数，当前为 {}", config.source.dose_rate_constant))
                    }
                },
            },
            ValidationRule {
                field_path: "source.air_kerma_strength",
                validator: |config| match config.source.air_kerma_strength {
                    Some(sk) if !positive(sk) => Err(format!("空气比释动能强度必须为正数，当前为 {}", sk)),
                    _ => Ok(()),
                },
            },
            ValidationRule {
                field_path: "source.active_length_cm",
                validator: |config| {
                    let length = config.source.active_length_cm;
                    if length >= 0.0 && length.is_finite() {
                        Ok(())
                    } else {
                        Err(format!("活性长度不能为负数，当前为 {}", length))
                    }
                },
            },
            ValidationRule {
                field_path: "source.radial_dose_table",
                validator: |config| {
                    if config.source.radial_dose_table.as_os_str().is_empty() {
                        Err("未指定径向剂量数据表".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "source.anisotropy_table",
                validator: |config| {
                    if config.source.anisotropy_table.as_os_str().is_empty() {
                        Err("未指定各向异性数据表".to_string())
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "analysis.tolerance_percent",
                validator: |config| {
                    if positive(config.analysis.tolerance_percent) {
                        Ok(())
                    } else {
                        Err(format!("允许偏差必须为正数，当前为 {}", config.analysis.tolerance_percent))
                    }
                },
            },
            ValidationRule {
                field_path: "analysis.channels",
                validator: |config| match &config.analysis.channels {
                    Some(channels) if channels.is_empty() => Err("通道列表为空".to_string()),
                    _ => Ok(()),
                },
            },
            ValidationRule {
                field_path: "logging.level",
                validator: |config| {
                    tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                        .map(|_| ())
                        .map_err(|e| format!("日志级别 {} 无效: {}", config.logging.level, e))
                },
            },
        ];

        Self { validation_rules }
    }

    pub fn validate(&self, config: &QaConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("配置项 {} 验证失败: {}", rule.field_path, e);
                return Err(HdrError::Config(format!("{}: {}", rule.field_path, e)));
            }
        }

        debug!("配置验证通过");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
