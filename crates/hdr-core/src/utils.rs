//! 三维向量与坐标约定工具

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// 每厘米对应的毫米数
pub const MM_PER_CM: f64 = 10.0;

/// 三维向量 (笛卡尔坐标)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vec3) -> Vec3 {
        Vec3::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(&self, other: &Vec3) -> f64 {
        (*self - *other).norm()
    }

    /// 单位化；零向量返回 `None`
    pub fn normalized(&self) -> Option<Vec3> {
        let n = self.norm();
        if n > 0.0 && n.is_finite() {
            Some(*self * (1.0 / n))
        } else {
            None
        }
    }

    /// 两向量夹角 (弧度, 0..=π)
    ///
    /// 使用 atan2(|a×b|, a·b)，在接近 0 和 π 时比 acos 数值更稳定。
    pub fn angle_between(&self, other: &Vec3) -> f64 {
        self.cross(other).norm().atan2(self.dot(other))
    }

    /// 从计划坐标轴顺序换到剂量引擎坐标轴顺序，不改变单位。
    ///
    /// 计划轴 (0, 1, 2) → 引擎 (左右, 头脚, 前后) = (计划0, 计划2, 计划1)。
    pub fn to_engine_axes(&self) -> Vec3 {
        Vec3::new(self.x, self.z, self.y)
    }

    /// 计划坐标 (mm) 转为引擎坐标 (cm)
    pub fn plan_mm_to_engine_cm(&self) -> Vec3 {
        Vec3::new(self.x / MM_PER_CM, self.z / MM_PER_CM, self.y / MM_PER_CM)
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(c: [f64; 3]) -> Self {
        Vec3::new(c[0], c[1], c[2])
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

impl Add for Vec3 {
    type Output = Vec3;
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;
    fn mul(self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vec3 {
    type Output = Vec3;
    fn neg(self) -> Vec3 {
        Vec3::new(-self.x, -self.y, -self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_plan_to_engine_conversion() {
        let v = Vec3::new(-26.263365, -6.806701, -94.109772);
        let e = v.plan_mm_to_engine_cm();
        assert_eq!(e.x, -26.263365 / 10.0);
        assert_eq!(e.y, -94.109772 / 10.0);
        assert_eq!(e.z, -6.806701 / 10.0);
    }

    #[test]
    fn test_axis_permutation_keeps_distances() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(-4.0, 0.5, 7.0);
        let d_plan = a.distance(&b);
        let d_engine = a.to_engine_axes().distance(&b.to_engine_axes());
        assert!((d_plan - d_engine).abs() < 1e-12);
    }

    #[test]
    fn test_angle_between() {
        let x = Vec3::new(1.0, 0.0, 0.0);
        let y = Vec3::new(0.0, 1.0, 0.0);
        assert!((x.angle_between(&y) - FRAC_PI_2).abs() < 1e-12);
        assert!((x.angle_between(&-x) - PI).abs() < 1e-12);
        assert_eq!(x.angle_between(&x), 0.0);
    }

    #[test]
    fn test_normalized_zero_vector() {
        assert!(Vec3::default().normalized().is_none());
        let n = Vec3::new(3.0, 0.0, 4.0).normalized().unwrap();
        assert!((n.norm() - 1.0).abs() < 1e-12);
    }
}
