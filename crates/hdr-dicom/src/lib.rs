//! # HDR DICOM模块
//!
//! 读取 DICOM RT Plan，并将其中的临床字段提取为强类型的 [`BrachyPlan`]。
//!
//! [`BrachyPlan`]: hdr_core::BrachyPlan

pub mod control_points;
pub mod parser;
pub mod tags;
pub mod validator;

pub use control_points::{derive_dwells, ControlPoint, DEFAULT_SOURCE_AXIS};
pub use parser::RtPlanParser;
pub use validator::{PlanValidator, ValidationResult};
