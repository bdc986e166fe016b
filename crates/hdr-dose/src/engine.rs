//! TG-43 剂量引擎
//!
//! 单个驻留位置对计算点的剂量贡献：
//!
//! D = Sk · Λ · t · G(r,θ) / G(r0,θ0) · g(r) · F(r,θ)
//!
//! Sk 单位 U (cGy·cm²·h⁻¹)，Λ 单位 cGy·h⁻¹·U⁻¹，t 为驻留时间。结果换算
//! 为 Gy。总剂量为所有源列中全部驻留位置贡献之和。

use crate::geometry::{line_source_geometry, reference_geometry};
use crate::source_train::{SourceDwell, SourceTrains};
use crate::tables::{AnisotropyTable, RadialDoseTable};
use hdr_core::{BrachyPlan, HdrError, PointPosition, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

const SECONDS_PER_HOUR: f64 = 3600.0;
const CGY_PER_GY: f64 = 100.0;

/// 放射源模型：物理常数与参考数据表，会话内只读共享
#[derive(Debug, Clone)]
pub struct SourceModel {
    pub name: String,
    /// 剂量率常数 Λ (cGy·h⁻¹·U⁻¹)
    pub dose_rate_constant: f64,
    /// 空气比释动能强度 Sk (U)
    pub air_kerma_strength: f64,
    /// 有效长度 L (cm)，0 表示点源
    pub active_length: f64,
    pub radial_dose: RadialDoseTable,
    pub anisotropy: AnisotropyTable,
}

impl SourceModel {
    pub fn new(
        name: impl Into<String>,
        dose_rate_constant: f64,
        air_kerma_strength: f64,
        active_length: f64,
        radial_dose: RadialDoseTable,
        anisotropy: AnisotropyTable,
    ) -> Result<Self> {
        if !(dose_rate_constant > 0.0 && dose_rate_constant.is_finite()) {
            return Err(HdrError::Config(format!("剂量率常数必须为正数: {}", dose_rate_constant)));
        }
        if !(air_kerma_strength > 0.0 && air_kerma_strength.is_finite()) {
            return Err(HdrError::Config(format!("空气比释动能强度必须为正数: {}", air_kerma_strength)));
        }
        if !(active_length >= 0.0 && active_length.is_finite()) {
            return Err(HdrError::Config(format!("源有效长度不能为负: {}", active_length)));
        }

        Ok(Self {
            name: name.into(),
            dose_rate_constant,
            air_kerma_strength,
            active_length,
            radial_dose,
            anisotropy,
        })
    }

    /// 确定本次计算使用的 Sk
    ///
    /// 配置中给出时直接使用；否则取计划中的源标定值并衰变校正到计划时间。
    pub fn resolve_air_kerma_strength(configured: Option<f64>, plan: &BrachyPlan) -> Result<f64> {
        if let Some(sk) = configured {
            debug!("使用配置的空气比释动能强度: {} U", sk);
            return Ok(sk);
        }

        let source = plan
            .source()
            .ok_or_else(|| HdrError::Config("配置未给出源强度，计划中也没有源标定信息".to_string()))?;
        let sk = match plan.plan_datetime() {
            Some(at) => source.air_kerma_strength_at(at),
            None => {
                warn!("计划缺少日期时间，使用未经衰变校正的源强度");
                source.reference_air_kerma_rate
            }
        };
        info!("由计划源标定得到空气比释动能强度: {:.3} U", sk);
        Ok(sk)
    }
}

/// 驻留源相对计算点的几何关系
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceGeometry {
    /// 源中心到计算点距离 (cm)
    pub r: f64,
    /// 源长轴与源中心到计算点连线的夹角 (弧度)
    pub theta: f64,
}

impl SourceGeometry {
    pub fn between(dwell: &SourceDwell, point: &PointPosition) -> Result<Self> {
        let offset = point.as_vec3() - dwell.position;
        let r = offset.norm();
        if !r.is_finite() {
            return Err(HdrError::DegenerateGeometry(format!(
                "计算点 {:?} 与通道 {} 驻留位置的距离无效",
                point, dwell.channel
            )));
        }
        if r == 0.0 {
            return Err(HdrError::DegenerateGeometry(format!(
                "计算点与通道 {} 的驻留位置重合 ({:?})",
                dwell.channel, dwell.position
            )));
        }
        Ok(Self {
            r,
            theta: dwell.axis.angle_between(&offset),
        })
    }

    pub fn theta_degrees(&self) -> f64 {
        self.theta.to_degrees()
    }
}

/// 单个驻留位置的剂量贡献明细
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DoseContribution {
    pub channel: u32,
    pub dwell_index: usize,
    pub dwell_time: f64,
    pub r: f64,
    pub theta_deg: f64,
    pub geometry: f64,
    pub radial_dose: f64,
    pub anisotropy: f64,
    /// Gy
    pub dose: f64,
}

/// TG-43 剂量引擎
#[derive(Debug)]
pub struct Tg43Engine {
    model: SourceModel,
    reference_geometry: f64,
}

impl Tg43Engine {
    pub fn new(model: SourceModel) -> Self {
        let reference_geometry = reference_geometry(model.active_length);
        info!(
            "初始化TG-43剂量引擎: 源 {}, Λ = {}, Sk = {} U, L = {} cm",
            model.name, model.dose_rate_constant, model.air_kerma_strength, model.active_length
        );
        Self {
            model,
            reference_geometry,
        }
    }

    pub fn model(&self) -> &SourceModel {
        &self.model
    }

    /// 几何函数 G(r,θ)
    pub fn geometry_function(&self, dwell: &SourceDwell, point: &PointPosition) -> Result<f64> {
        let geometry = SourceGeometry::between(dwell, point)?;
        line_source_geometry(geometry.r, geometry.theta, self.model.active_length)
    }

    /// 径向剂量函数 g(r)
    pub fn radial_dose(&self, dwell: &SourceDwell, point: &PointPosition) -> Result<f64> {
        let geometry = SourceGeometry::between(dwell, point)?;
        Ok(self.model.radial_dose.value_at(geometry.r))
    }

    /// 各向异性函数 F(r,θ)
    pub fn anisotropy(&self, dwell: &SourceDwell, point: &PointPosition) -> Result<f64> {
        let geometry = SourceGeometry::between(dwell, point)?;
        Ok(self.model.anisotropy.value_at(geometry.r, geometry.theta_degrees()))
    }

    /// 单个驻留位置的剂量贡献
    pub fn dose_contribution(
        &self,
        dwell: &SourceDwell,
        dwell_index: usize,
        point: &PointPosition,
    ) -> Result<DoseContribution> {
        let geometry = SourceGeometry::between(dwell, point)?;
        let theta_deg = geometry.theta_degrees();

        let g_geometry = line_source_geometry(geometry.r, geometry.theta, self.model.active_length)?;
        let radial_dose = self.model.radial_dose.value_at(geometry.r);
        let anisotropy = self.model.anisotropy.value_at(geometry.r, theta_deg);

        let dose_rate_cgy_per_hour = self.model.air_kerma_strength
            * self.model.dose_rate_constant
            * (g_geometry / self.reference_geometry)
            * radial_dose
            * anisotropy;
        let dose = dose_rate_cgy_per_hour * (dwell.dwell_time / SECONDS_PER_HOUR) / CGY_PER_GY;

        Ok(DoseContribution {
            channel: dwell.channel,
            dwell_index,
            dwell_time: dwell.dwell_time,
            r: geometry.r,
            theta_deg,
            geometry: g_geometry,
            radial_dose,
            anisotropy,
            dose,
        })
    }

    /// 计算点处各驻留位置的剂量贡献明细，按源列和驻留顺序排列
    pub fn calculate_dose_breakdown(
        &self,
        trains: &SourceTrains,
        point: &PointPosition,
    ) -> Result<Vec<DoseContribution>> {
        let mut contributions = Vec::with_capacity(trains.dwell_count());
        for train in trains.iter() {
            for (index, dwell) in train.dwells().iter().enumerate() {
                contributions.push(self.dose_contribution(dwell, index, point)?);
            }
        }
        Ok(contributions)
    }

    /// 计算点处的总剂量 (Gy)
    pub fn calculate_dose(&self, trains: &SourceTrains, point: &PointPosition) -> Result<f64> {
        let mut total = 0.0;
        for train in trains.iter() {
            for (index, dwell) in train.dwells().iter().enumerate() {
                total += self.dose_contribution(dwell, index, point)?.dose;
            }
        }
        debug!("计算点 {:?} 总剂量: {:.6} Gy", point, total);
        Ok(total)
    }
}
