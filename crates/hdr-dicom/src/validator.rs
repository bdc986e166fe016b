//! 治疗计划验证模块
//!
//! 在剂量计算之前检查提取出的计划是否满足临床一致性要求

use hdr_core::{BrachyPlan, PointPosition};
use std::collections::HashSet;
use tracing::{debug, info};

/// 驻留时间总和与通道总时间的允许偏差 (s)
const CHANNEL_TIME_TOLERANCE_S: f64 = 1e-3;

/// 治疗计划验证器
pub struct PlanValidator;

impl Default for PlanValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanValidator {
    pub fn new() -> Self {
        Self
    }

    /// 验证治疗计划的完整性和一致性
    pub fn validate_plan(&self, plan: &BrachyPlan) -> ValidationResult {
        let mut result = ValidationResult::new();

        info!("开始验证治疗计划: {} / {}", plan.patient_id(), plan.plan_name());

        self.validate_prescription(plan, &mut result);
        self.validate_channels(plan, &mut result);
        self.validate_points(plan, &mut result);
        self.validate_source(plan, &mut result);

        info!(
            "治疗计划验证完成: {} 个错误, {} 个警告",
            result.errors.len(),
            result.warnings.len()
        );

        result
    }

    fn validate_prescription(&self, plan: &BrachyPlan, result: &mut ValidationResult) {
        if plan.prescription() <= 0.0 {
            result.add_error(format!("处方剂量必须为正数: {}", plan.prescription()));
        }
    }

    /// 驻留时间非负，且每个通道的驻留时间总和等于通道总时间
    fn validate_channels(&self, plan: &BrachyPlan, result: &mut ValidationResult) {
        if plan.dwell_positions().is_empty() {
            result.add_error("计划中没有任何驻留位置".to_string());
        }

        for dwell in plan.dwell_positions() {
            if dwell.dwell_time < 0.0 {
                result.add_error(format!("通道 {} 存在负驻留时间: {}", dwell.channel, dwell.dwell_time));
            }
        }

        for channel in plan.channels() {
            let dwell_sum = plan.channel_dwell_time(channel.number);
            let used = plan.channel_numbers().contains(&channel.number);

            if used && (dwell_sum - channel.total_time).abs() > CHANNEL_TIME_TOLERANCE_S {
                result.add_error(format!(
                    "通道 {} 驻留时间总和 {:.3} s 与通道总时间 {:.3} s 不符",
                    channel.number, dwell_sum, channel.total_time
                ));
            } else if !used && channel.total_time > 0.0 {
                result.add_warning(format!(
                    "通道 {} 总时间为 {:.3} s 但没有驻留位置",
                    channel.number, channel.total_time
                ));
            } else {
                debug!("通道 {} 时间验证通过", channel.number);
            }
        }
    }

    fn validate_points(&self, plan: &BrachyPlan, result: &mut ValidationResult) {
        if plan.points().is_empty() {
            result.add_warning("计划中没有剂量参考点".to_string());
        }

        let mut names = HashSet::new();
        for point in plan.points() {
            if !names.insert(point.name.as_str()) {
                result.add_warning(format!("参考点名称重复: {}", point.name));
            }
            if point.dose <= 0.0 {
                result.add_warning(format!("参考点 {} 的参考剂量非正: {}", point.name, point.dose));
            }

            let position = PointPosition::from(point).as_vec3();
            let coincident = plan
                .dwell_positions()
                .iter()
                .any(|d| d.position.plan_mm_to_engine_cm().distance(&position) == 0.0);
            if coincident {
                result.add_error(format!("参考点 {} 与驻留位置重合", point.name));
            }
        }
    }

    fn validate_source(&self, plan: &BrachyPlan, result: &mut ValidationResult) {
        match plan.source() {
            Some(source) if source.reference_air_kerma_rate <= 0.0 => {
                result.add_error(format!("放射源参考空气比释动能率非正: {}", source.reference_air_kerma_rate));
            }
            Some(source) if source.reference_time.is_none() => {
                result.add_warning("放射源缺少标定时间，无法做衰变校正".to_string());
            }
            Some(_) => {}
            None => {
                result.add_warning("计划中没有放射源标定信息，需要在配置中提供源强度".to_string());
            }
        }
    }
}

/// 验证结果
#[derive(Debug, Clone)]
pub struct ValidationResult {
    /// 验证错误列表
    pub errors: Vec<String>,
    /// 验证警告列表
    pub warnings: Vec<String>,
    /// 是否通过验证
    pub is_valid: bool,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            is_valid: true,
        }
    }

    pub fn add_error(&mut self, error: String) {
        self.is_valid = false;
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// 获取验证报告摘要
    pub fn get_summary(&self) -> String {
        if self.is_valid {
            if self.has_warnings() {
                format!("验证通过，但有 {} 个警告", self.warnings.len())
            } else {
                "验证完全通过".to_string()
            }
        } else {
            format!("验证失败：{} 个错误，{} 个警告", self.errors.len(), self.warnings.len())
        }
    }

    /// 获取详细的验证报告
    pub fn get_detailed_report(&self) -> String {
        let mut report = String::new();

        if self.has_errors() {
            report.push_str("=== 验证错误 ===\n");
            for (i, error) in self.errors.iter().enumerate() {
                report.push_str(&format!("{}. {}\n", i + 1, error));
            }
            report.push('\n');
        }

        if self.has_warnings() {
            report.push_str("=== 验证警告 ===\n");
            for (i, warning) in self.warnings.iter().enumerate() {
                report.push_str(&format!("{}. {}\n", i + 1, warning));
            }
            report.push('\n');
        }

        report.push_str(&format!("=== 验证结果 ===\n{}\n", self.get_summary()));

        report
    }
}
