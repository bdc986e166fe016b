//! # HDR Dose
//!
//! TG-43 剂量计算核心：
//! - 参考数据表：径向剂量函数 g(r) 与二维各向异性函数 F(r,θ) 的加载和插值
//! - 源列构建：按通道组织驻留位置
//! - 剂量引擎：几何函数、径向剂量函数、各向异性函数逐驻留位置求和
//! - 点剂量比对：与计划系统参考剂量计算百分比偏差
//! - 计划分析：按参考点并发计算并汇总报告

pub mod analysis;
pub mod comparison;
pub mod engine;
pub mod geometry;
pub mod source_train;
pub mod tables;

pub use analysis::{AnalysisOptions, AnalysisReport, PlanAnalysis, PointOutcome};
pub use comparison::{DifferenceBasis, PointComparison};
pub use engine::{DoseContribution, SourceGeometry, SourceModel, Tg43Engine};
pub use geometry::{line_source_geometry, reference_geometry};
pub use source_train::{make_source_trains, SourceDwell, SourceTrain, SourceTrains};
pub use tables::{AnisotropyTable, RadialDoseTable, ReferenceTable};
