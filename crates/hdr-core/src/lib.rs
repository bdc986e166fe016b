//! # HDR Core
//!
//! 后装剂量验证系统的核心模块，提供计划数据模型、错误定义和三维几何工具。

pub mod error;
pub mod models;
pub mod utils;

pub use error::{HdrError, Result};
pub use models::*;
pub use utils::Vec3;
