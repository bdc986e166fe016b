//! 点剂量比对

use hdr_core::{HdrError, Result};
use serde::{Deserialize, Serialize};

/// 百分比偏差的分母
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifferenceBasis {
    /// (参考 − 计算) / 参考 × 100
    #[default]
    Reference,
    /// (参考 − 计算) / 计算 × 100，与旧版比对报告一致
    Computed,
}

/// 单个参考点的比对结果
///
/// 百分比偏差为正表示独立计算的剂量低于计划系统剂量。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointComparison {
    pub point_name: String,
    /// 计划系统报告的剂量 (Gy)
    pub reference_dose: f64,
    /// TG-43 独立计算的剂量 (Gy)
    pub computed_dose: f64,
    pub percentage_difference: f64,
}

impl PointComparison {
    pub fn new(point_name: impl Into<String>, reference_dose: f64, computed_dose: f64) -> Result<Self> {
        Self::with_basis(point_name, reference_dose, computed_dose, DifferenceBasis::Reference)
    }

    pub fn with_basis(
        point_name: impl Into<String>,
        reference_dose: f64,
        computed_dose: f64,
        basis: DifferenceBasis,
    ) -> Result<Self> {
        let point_name = point_name.into();
        if !(reference_dose > 0.0 && reference_dose.is_finite()) {
            return Err(HdrError::InvalidReferenceDose(format!(
                "参考点 {} 的参考剂量为 {}",
                point_name, reference_dose
            )));
        }

        let denominator = match basis {
            DifferenceBasis::Reference => reference_dose,
            DifferenceBasis::Computed => computed_dose,
        };
        if !(denominator > 0.0 && denominator.is_finite()) {
            return Err(HdrError::InvalidReferenceDose(format!(
                "参考点 {} 的计算剂量为 {}，无法作为偏差分母",
                point_name, computed_dose
            )));
        }

        Ok(Self {
            percentage_difference: (reference_dose - computed_dose) / denominator * 100.0,
            point_name,
            reference_dose,
            computed_dose,
        })
    }

    pub fn within_tolerance(&self, tolerance_percent: f64) -> bool {
        self.percentage_difference.abs() <= tolerance_percent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_convention() {
        let c = PointComparison::new("A1", 10.0, 9.5).unwrap();
        assert!((c.percentage_difference - 5.0).abs() < 1e-12);

        let over = PointComparison::new("A1", 10.0, 10.5).unwrap();
        assert!(over.percentage_difference < 0.0);
    }

    #[test]
    fn test_computed_basis_reproduces_legacy_table() {
        let c = PointComparison::with_basis("A1", 7.157785, 7.204668479752138, DifferenceBasis::Computed).unwrap();
        assert!((c.percentage_difference - (-0.650737502827492)).abs() < 1e-9);

        let icru = PointComparison::with_basis("ICRU", 3.510379, 3.364742911392422, DifferenceBasis::Computed).unwrap();
        assert!((icru.percentage_difference - 4.32829765728846).abs() < 1e-9);
    }

    #[test]
    fn test_zero_reference_dose() {
        assert!(matches!(
            PointComparison::new("X", 0.0, 1.0),
            Err(HdrError::InvalidReferenceDose(_))
        ));
        assert!(PointComparison::new("X", -1.0, 1.0).is_err());
        assert!(PointComparison::with_basis("X", 1.0, 0.0, DifferenceBasis::Computed).is_err());
    }

    #[test]
    fn test_tolerance() {
        let c = PointComparison::new("A2", 7.042215, 7.0942845357605915).unwrap();
        assert!((c.percentage_difference - (-0.7393914522716477)).abs() < 1e-9);
        assert!(c.within_tolerance(1.0));
        assert!(!c.within_tolerance(0.5));
    }
}
