//! 线源几何函数
//!
//! G_L(r,θ) = β / (L·r·sinθ)，β 为计算点对源两端所张的角。
//! 利用 tan β = L·r·sinθ / (r² − L²/4) 直接以 atan2 求 β，对 θ 与 π−θ
//! 严格对称。源轴上 (sinθ = 0) 退化为 1 / (r² − L²/4)；L = 0 时为点源
//! 的平方反比 1/r²。

use hdr_core::{HdrError, Result};
use std::f64::consts::FRAC_PI_2;

/// 判定计算点位于源轴上的阈值 (cm)
const ON_AXIS_EPSILON: f64 = 1e-9;

/// 参考距离 r0 (cm)
pub const REFERENCE_DISTANCE_CM: f64 = 1.0;

/// 参考角度 θ0 (弧度)
pub const REFERENCE_ANGLE: f64 = FRAC_PI_2;

/// 线源 (或 L = 0 时点源) 几何函数
///
/// `r` 单位 cm，`theta` 为相对源长轴的极角 (弧度)，`length` 为有效长度 L (cm)。
pub fn line_source_geometry(r: f64, theta: f64, length: f64) -> Result<f64> {
    if r <= 0.0 || !r.is_finite() {
        return Err(HdrError::DegenerateGeometry(format!("源到计算点距离无效: r = {}", r)));
    }

    if length <= 0.0 {
        return Ok(1.0 / (r * r));
    }

    let half = length / 2.0;
    let transverse = r * theta.sin().abs();

    if transverse < ON_AXIS_EPSILON {
        let denominator = r * r - half * half;
        if denominator <= 0.0 {
            return Err(HdrError::DegenerateGeometry(format!(
                "计算点位于源的有效长度内: r = {} cm, L = {} cm",
                r, length
            )));
        }
        return Ok(1.0 / denominator);
    }

    let beta = (length * transverse).atan2(r * r - half * half);
    Ok(beta / (length * transverse))
}

/// 参考点 (r0 = 1 cm, θ0 = 90°) 处的几何函数，用于归一化
pub fn reference_geometry(length: f64) -> f64 {
    if length <= 0.0 {
        return 1.0 / (REFERENCE_DISTANCE_CM * REFERENCE_DISTANCE_CM);
    }
    let half = length / 2.0;
    2.0 * (half / REFERENCE_DISTANCE_CM).atan() / (length * REFERENCE_DISTANCE_CM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const L: f64 = 0.36;

    fn close(a: f64, b: f64, rel: f64) -> bool {
        ((a - b) / b).abs() < rel
    }

    #[test]
    fn test_reference_geometry_matches_general_form() {
        let g = line_source_geometry(REFERENCE_DISTANCE_CM, REFERENCE_ANGLE, L).unwrap();
        assert!(close(g, reference_geometry(L), 1e-12));
    }

    #[test]
    fn test_symmetry_about_source_midpoint() {
        for &r in &[0.25, 0.5, 1.0, 3.0, 10.0] {
            for &theta in &[0.01, 0.3, 1.0, 1.4, FRAC_PI_2] {
                let a = line_source_geometry(r, theta, L).unwrap();
                let b = line_source_geometry(r, PI - theta, L).unwrap();
                assert!(close(a, b, 1e-9), "r={} θ={}: {} vs {}", r, theta, a, b);
            }
        }
    }

    #[test]
    fn test_on_axis_special_case() {
        let r = 2.0;
        let expected = 1.0 / (r * r - L * L / 4.0);
        assert!(close(line_source_geometry(r, 0.0, L).unwrap(), expected, 1e-12));
        assert!(close(line_source_geometry(r, PI, L).unwrap(), expected, 1e-12));

        // 接近源轴时与轴上值连续
        let near = line_source_geometry(r, 1e-6, L).unwrap();
        assert!(close(near, expected, 1e-6));
    }

    #[test]
    fn test_point_source_limit() {
        let r = 3.0;
        assert_eq!(line_source_geometry(r, 0.7, 0.0).unwrap(), 1.0 / 9.0);
        assert_eq!(reference_geometry(0.0), 1.0);

        // 远处线源趋近平方反比
        let far = line_source_geometry(50.0, 0.7, L).unwrap();
        assert!(close(far, 1.0 / 2500.0, 1e-4));
    }

    #[test]
    fn test_degenerate_geometry() {
        assert!(matches!(line_source_geometry(0.0, 1.0, L), Err(HdrError::DegenerateGeometry(_))));
        assert!(matches!(line_source_geometry(0.1, 0.0, L), Err(HdrError::DegenerateGeometry(_))));
    }
}
