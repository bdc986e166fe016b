//! 后装治疗计划数据模型

use crate::error::{HdrError, Result};
use crate::utils::Vec3;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// 施源器通道
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub number: u32,
    /// 通道总治疗时间 (s)
    pub total_time: f64,
    /// 最终累积时间权重
    pub final_cumulative_weight: f64,
}

/// 驻留位置：坐标 (mm, 计划坐标系)、驻留时间 (s) 和所属通道
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DwellPosition {
    pub channel: u32,
    pub position: Vec3,
    pub dwell_time: f64,
    /// 源的长轴方向 (单位向量, 计划坐标系)，沿施源器走向
    pub axis: Vec3,
}

/// 剂量参考点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub name: String,
    /// 计划坐标 (mm)
    pub coords: [f64; 3],
    /// 计划系统给出的参考剂量 (Gy)
    pub dose: f64,
}

impl PointOfInterest {
    /// 转换为剂量引擎使用的计算点
    pub fn position(&self) -> PointPosition {
        PointPosition::from(self)
    }
}

/// 剂量引擎坐标系中的计算点 (cm)
///
/// 轴顺序为 (左右, 头脚, 前后)，由计划坐标 (x, y, z) mm 换算为
/// (x/10, z/10, y/10) cm。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointPosition {
    pub lateral: f64,
    pub sup_inf: f64,
    pub ant_post: f64,
}

impl PointPosition {
    pub fn new(lateral: f64, sup_inf: f64, ant_post: f64) -> Self {
        Self {
            lateral,
            sup_inf,
            ant_post,
        }
    }

    /// 由计划坐标 (mm) 构造
    pub fn from_plan_coords(coords: [f64; 3]) -> Self {
        let v = Vec3::from(coords).plan_mm_to_engine_cm();
        Self::new(v.x, v.y, v.z)
    }

    pub fn as_vec3(&self) -> Vec3 {
        Vec3::new(self.lateral, self.sup_inf, self.ant_post)
    }
}

impl From<&PointOfInterest> for PointPosition {
    fn from(poi: &PointOfInterest) -> Self {
        Self::from_plan_coords(poi.coords)
    }
}

/// 放射源强度标定信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCalibration {
    pub isotope: Option<String>,
    /// 参考空气比释动能率 (U = cGy·cm²·h⁻¹)
    pub reference_air_kerma_rate: f64,
    /// 半衰期 (天)
    pub half_life_days: f64,
    /// 标定时间
    pub reference_time: Option<NaiveDateTime>,
}

impl SourceCalibration {
    /// 衰变校正到指定时间的空气比释动能强度
    ///
    /// 缺少标定时间时返回标定值本身。
    pub fn air_kerma_strength_at(&self, at: NaiveDateTime) -> f64 {
        match self.reference_time {
            Some(reference) if self.half_life_days > 0.0 => {
                let elapsed_days = (at - reference).num_seconds() as f64 / 86_400.0;
                self.reference_air_kerma_rate * (-elapsed_days / self.half_life_days).exp2()
            }
            _ => self.reference_air_kerma_rate,
        }
    }
}

/// 后装治疗计划
///
/// 构造时校验：每个驻留位置所属通道都已声明。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrachyPlan {
    patient_id: String,
    plan_name: String,
    plan_datetime: Option<NaiveDateTime>,
    prescription: f64,
    channels: Vec<Channel>,
    channel_numbers: Vec<u32>,
    dwell_positions: Vec<DwellPosition>,
    points: Vec<PointOfInterest>,
    source: Option<SourceCalibration>,
}

impl BrachyPlan {
    pub fn new(
        patient_id: impl Into<String>,
        plan_name: impl Into<String>,
        prescription: f64,
        channels: Vec<Channel>,
        dwell_positions: Vec<DwellPosition>,
        points: Vec<PointOfInterest>,
    ) -> Result<Self> {
        let mut channel_numbers: Vec<u32> = Vec::new();
        for dwell in &dwell_positions {
            if !channels.iter().any(|c| c.number == dwell.channel) {
                return Err(HdrError::MalformedPlan(format!(
                    "驻留位置引用了未声明的通道 {}",
                    dwell.channel
                )));
            }
            if !channel_numbers.contains(&dwell.channel) {
                channel_numbers.push(dwell.channel);
            }
        }

        Ok(Self {
            patient_id: patient_id.into(),
            plan_name: plan_name.into(),
            plan_datetime: None,
            prescription,
            channels,
            channel_numbers,
            dwell_positions,
            points,
            source: None,
        })
    }

    pub fn with_plan_datetime(mut self, datetime: Option<NaiveDateTime>) -> Self {
        self.plan_datetime = datetime;
        self
    }

    pub fn with_source(mut self, source: Option<SourceCalibration>) -> Self {
        self.source = source;
        self
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn plan_name(&self) -> &str {
        &self.plan_name
    }

    pub fn plan_datetime(&self) -> Option<NaiveDateTime> {
        self.plan_datetime
    }

    /// 处方剂量 (Gy)
    pub fn prescription(&self) -> f64 {
        self.prescription
    }

    /// 实际有驻留位置的通道号，按首次出现顺序
    pub fn channel_numbers(&self) -> &[u32] {
        &self.channel_numbers
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn channel(&self, number: u32) -> Option<&Channel> {
        self.channels.iter().find(|c| c.number == number)
    }

    pub fn dwell_positions(&self) -> &[DwellPosition] {
        &self.dwell_positions
    }

    pub fn points(&self) -> &[PointOfInterest] {
        &self.points
    }

    pub fn source(&self) -> Option<&SourceCalibration> {
        self.source.as_ref()
    }

    /// 指定通道的驻留时间总和 (s)
    pub fn channel_dwell_time(&self, number: u32) -> f64 {
        self.dwell_positions
            .iter()
            .filter(|d| d.channel == number)
            .map(|d| d.dwell_time)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dwell(channel: u32, time: f64) -> DwellPosition {
        DwellPosition {
            channel,
            position: Vec3::new(0.0, 0.0, 0.0),
            dwell_time: time,
            axis: Vec3::new(0.0, 0.0, 1.0),
        }
    }

    fn channel(number: u32, total_time: f64) -> Channel {
        Channel {
            number,
            total_time,
            final_cumulative_weight: 1.0,
        }
    }

    #[test]
    fn test_point_position_axis_order() {
        let poi = PointOfInterest {
            name: "A1".to_string(),
            coords: [-26.263365, -6.806701, -94.109772],
            dose: 7.157785,
        };
        let p = poi.position();
        assert_eq!(p.lateral, -26.263365 / 10.0);
        assert_eq!(p.sup_inf, -94.109772 / 10.0);
        assert_eq!(p.ant_post, -6.806701 / 10.0);
    }

    #[test]
    fn test_channel_numbers_first_appearance() {
        let plan = BrachyPlan::new(
            "P1",
            "Plan",
            7.1,
            vec![channel(1, 10.0), channel(2, 0.0), channel(3, 5.0)],
            vec![dwell(3, 2.0), dwell(1, 4.0), dwell(3, 3.0), dwell(1, 6.0)],
            vec![],
        )
        .unwrap();

        assert_eq!(plan.channel_numbers(), &[3, 1]);
        assert_eq!(plan.channel_dwell_time(1), 10.0);
        assert_eq!(plan.channel_dwell_time(2), 0.0);
    }

    #[test]
    fn test_undeclared_channel_rejected() {
        let result = BrachyPlan::new("P1", "Plan", 7.1, vec![channel(1, 1.0)], vec![dwell(4, 1.0)], vec![]);
        assert!(matches!(result, Err(HdrError::MalformedPlan(_))));
    }

    #[test]
    fn test_source_decay_one_half_life() {
        let reference = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let source = SourceCalibration {
            isotope: Some("IR192".to_string()),
            reference_air_kerma_rate: 40_000.0,
            half_life_days: 73.83,
            reference_time: Some(reference),
        };

        let later = reference + chrono::Duration::seconds((73.83 * 86_400.0) as i64);
        let sk = source.air_kerma_strength_at(later);
        assert!((sk - 20_000.0).abs() < 1.0);
        assert_eq!(source.air_kerma_strength_at(reference), 40_000.0);
    }
}
