//! RT Plan 解析器
//!
//! 将通用的 DICOM 记录按字段名逐项提取为强类型的治疗计划模型，
//! 任何必需字段缺失都立即以 [`HdrError::MalformedPlan`] 失败。

use crate::control_points::{derive_dwells, ControlPoint};
use crate::tags;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use dicom::core::Tag;
use dicom::object::{open_file, DefaultDicomObject, InMemDicomObject};
use hdr_core::{BrachyPlan, Channel, DwellPosition, HdrError, PointOfInterest, Result, SourceCalibration, Vec3};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// RT Plan 解析器
pub struct RtPlanParser;

impl RtPlanParser {
    /// 读取 RT Plan 文件并提取治疗计划
    pub fn parse_file<P: AsRef<Path>>(file_path: P) -> Result<BrachyPlan> {
        let record = Self::open_record(file_path)?;
        Self::extract_plan(&record)
    }

    /// 读取 DICOM 文件为通用记录
    pub fn open_record<P: AsRef<Path>>(file_path: P) -> Result<DefaultDicomObject> {
        let file_path = file_path.as_ref();
        info!("开始读取RT Plan文件: {:?}", file_path);

        open_file(file_path).map_err(|e| {
            error!("DICOM文件解析失败: {:?}", e);
            HdrError::Dicom(format!("无法解析DICOM文件 {:?}: {}", file_path, e))
        })
    }

    /// 从通用记录中提取治疗计划
    pub fn extract_plan(record: &InMemDicomObject) -> Result<BrachyPlan> {
        let patient_id = required_str(record, tags::PATIENT_ID, "PatientID")?;
        let plan_name = required_str(record, tags::RT_PLAN_LABEL, "RTPlanLabel")?;
        let plan_datetime = parse_datetime(
            optional_str(record, tags::RT_PLAN_DATE),
            optional_str(record, tags::RT_PLAN_TIME),
        );

        let prescription = Self::extract_prescription(record)?;
        let points = Self::extract_points(record)?;
        let (channels, dwells) = Self::extract_channels(record)?;
        let source = Self::extract_source(record);

        let plan = BrachyPlan::new(patient_id, plan_name, prescription, channels, dwells, points)?
            .with_plan_datetime(plan_datetime)
            .with_source(source);

        info!(
            "成功提取治疗计划，患者ID: {}, 计划: {}, 通道: {:?}, 驻留位置: {}, 参考点: {}",
            plan.patient_id(),
            plan.plan_name(),
            plan.channel_numbers(),
            plan.dwell_positions().len(),
            plan.points().len()
        );

        Ok(plan)
    }

    /// 处方剂量：各施源器设置的剂量之和 (Gy)
    fn extract_prescription(record: &InMemDicomObject) -> Result<f64> {
        let fraction_groups = required_items(record, tags::FRACTION_GROUP_SEQUENCE, "FractionGroupSequence")?;
        let first_group = fraction_groups
            .first()
            .ok_or_else(|| HdrError::MalformedPlan("FractionGroupSequence 为空".to_string()))?;

        let setups = required_items(
            first_group,
            tags::REFERENCED_BRACHY_APPLICATION_SETUP_SEQUENCE,
            "ReferencedBrachyApplicationSetupSequence",
        )?;
        if setups.is_empty() {
            return Err(HdrError::MalformedPlan(
                "ReferencedBrachyApplicationSetupSequence 为空".to_string(),
            ));
        }

        let mut prescription = 0.0;
        for setup in setups {
            prescription += required_f64(setup, tags::BRACHY_APPLICATION_SETUP_DOSE, "BrachyApplicationSetupDose")?;
        }
        Ok(prescription)
    }

    /// 剂量参考点；没有坐标的参考项 (如体积参考) 不作为计算点
    fn extract_points(record: &InMemDicomObject) -> Result<Vec<PointOfInterest>> {
        let references = required_items(record, tags::DOSE_REFERENCE_SEQUENCE, "DoseReferenceSequence")?;

        let mut points = Vec::new();
        for (index, item) in references.iter().enumerate() {
            let coords = match optional_f64s(item, tags::DOSE_REFERENCE_POINT_COORDINATES, "DoseReferencePointCoordinates")? {
                Some(c) => c,
                None => {
                    debug!("剂量参考项 {} 无坐标，跳过", index);
                    continue;
                }
            };
            if coords.len() != 3 {
                return Err(HdrError::MalformedPlan(format!(
                    "剂量参考点坐标应为3个分量，实际为 {}",
                    coords.len()
                )));
            }

            let name = optional_str(item, tags::DOSE_REFERENCE_DESCRIPTION).unwrap_or_else(|| {
                let number = optional_str(item, tags::DOSE_REFERENCE_NUMBER).unwrap_or_else(|| (index + 1).to_string());
                format!("Point {}", number)
            });
            let dose = required_f64(item, tags::TARGET_PRESCRIPTION_DOSE, "TargetPrescriptionDose")?;

            points.push(PointOfInterest {
                name,
                coords: [coords[0], coords[1], coords[2]],
                dose,
            });
        }
        Ok(points)
    }

    /// 所有施源器设置下的通道及其驻留位置
    fn extract_channels(record: &InMemDicomObject) -> Result<(Vec<Channel>, Vec<DwellPosition>)> {
        let setups = required_items(record, tags::APPLICATION_SETUP_SEQUENCE, "ApplicationSetupSequence")?;

        let mut channels = Vec::new();
        let mut dwells = Vec::new();
        for setup in setups {
            let channel_items = required_items(setup, tags::CHANNEL_SEQUENCE, "ChannelSequence")?;
            for item in channel_items {
                let number = optional_int(item, tags::CHANNEL_NUMBER)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| HdrError::MalformedPlan("通道缺少有效的 ChannelNumber".to_string()))?;
                let total_time = optional_f64(item, tags::CHANNEL_TOTAL_TIME).ok_or_else(|| {
                    HdrError::MalformedPlan(format!("通道 {} 缺少 ChannelTotalTime", number))
                })?;
                let final_weight = optional_f64(item, tags::FINAL_CUMULATIVE_TIME_WEIGHT).ok_or_else(|| {
                    HdrError::MalformedPlan(format!("通道 {} 缺少 FinalCumulativeTimeWeight", number))
                })?;

                let control_points = match optional_items(item, tags::BRACHY_CONTROL_POINT_SEQUENCE) {
                    Some(cps) => cps
                        .iter()
                        .map(|cp| Self::extract_control_point(number, cp))
                        .collect::<Result<Vec<_>>>()?,
                    None => Vec::new(),
                };

                dwells.extend(derive_dwells(number, total_time, final_weight, &control_points)?);
                channels.push(Channel {
                    number,
                    total_time,
                    final_cumulative_weight: final_weight,
                });
            }
        }
        Ok((channels, dwells))
    }

    fn extract_control_point(channel: u32, item: &InMemDicomObject) -> Result<ControlPoint> {
        let position = optional_f64s(item, tags::CONTROL_POINT_3D_POSITION, "ControlPoint3DPosition")?
            .filter(|p| p.len() == 3)
            .ok_or_else(|| {
                HdrError::MalformedPlan(format!("通道 {} 的控制点缺少有效的 ControlPoint3DPosition", channel))
            })?;
        let cumulative_weight = optional_f64(item, tags::CUMULATIVE_TIME_WEIGHT).ok_or_else(|| {
            HdrError::MalformedPlan(format!("通道 {} 的控制点缺少 CumulativeTimeWeight", channel))
        })?;

        Ok(ControlPoint {
            position: Vec3::new(position[0], position[1], position[2]),
            cumulative_weight,
        })
    }

    /// 放射源标定信息；不完整时返回 `None`，由配置提供源强度
    fn extract_source(record: &InMemDicomObject) -> Option<SourceCalibration> {
        let source = optional_items(record, tags::SOURCE_SEQUENCE)?.first()?;

        let reference_air_kerma_rate = optional_f64(source, tags::REFERENCE_AIR_KERMA_RATE);
        let half_life_days = optional_f64(source, tags::SOURCE_ISOTOPE_HALF_LIFE);
        match (reference_air_kerma_rate, half_life_days) {
            (Some(reference_air_kerma_rate), Some(half_life_days)) => Some(SourceCalibration {
                isotope: optional_str(source, tags::SOURCE_ISOTOPE_NAME),
                reference_air_kerma_rate,
                half_life_days,
                reference_time: parse_datetime(
                    optional_str(source, tags::SOURCE_STRENGTH_REFERENCE_DATE),
                    optional_str(source, tags::SOURCE_STRENGTH_REFERENCE_TIME),
                ),
            }),
            _ => {
                warn!("SourceSequence 缺少源强度或半衰期，忽略计划中的源标定");
                None
            }
        }
    }
}

fn optional_items(obj: &InMemDicomObject, tag: Tag) -> Option<&[InMemDicomObject]> {
    obj.get(tag).and_then(|e| e.items())
}

fn required_items<'a>(obj: &'a InMemDicomObject, tag: Tag, name: &str) -> Result<&'a [InMemDicomObject]> {
    optional_items(obj, tag).ok_or_else(|| HdrError::MalformedPlan(format!("缺少 {}", name)))
}

fn optional_str(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    obj.get(tag)
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn required_str(obj: &InMemDicomObject, tag: Tag, name: &str) -> Result<String> {
    optional_str(obj, tag).ok_or_else(|| HdrError::MalformedPlan(format!("缺少 {}", name)))
}

fn optional_f64(obj: &InMemDicomObject, tag: Tag) -> Option<f64> {
    obj.get(tag).and_then(|e| e.to_float64().ok()).filter(|v| v.is_finite())
}

fn required_f64(obj: &InMemDicomObject, tag: Tag, name: &str) -> Result<f64> {
    optional_f64(obj, tag).ok_or_else(|| HdrError::MalformedPlan(format!("缺少或无效的 {}", name)))
}

/// 多值数值字段；缺失返回 `None`，存在但含非有限值时报错
fn optional_f64s(obj: &InMemDicomObject, tag: Tag, name: &str) -> Result<Option<Vec<f64>>> {
    let values = match obj.get(tag).and_then(|e| e.to_multi_float64().ok()) {
        Some(v) => v,
        None => return Ok(None),
    };
    if values.iter().any(|v| !v.is_finite()) {
        return Err(HdrError::MalformedPlan(format!("{} 含有非有限数值: {:?}", name, values)));
    }
    Ok(Some(values))
}

fn optional_int(obj: &InMemDicomObject, tag: Tag) -> Option<i64> {
    obj.get(tag).and_then(|e| e.to_int::<i64>().ok())
}

/// DICOM 日期 (YYYYMMDD) 与时间 (HH[MM[SS[.F]]]) 合并；无时间按零点
fn parse_datetime(date: Option<String>, time: Option<String>) -> Option<NaiveDateTime> {
    let date = NaiveDate::parse_from_str(date?.as_str(), "%Y%m%d").ok()?;
    let time = time.and_then(|t| parse_dicom_time(&t)).unwrap_or(NaiveTime::MIN);
    Some(date.and_time(time))
}

fn parse_dicom_time(time: &str) -> Option<NaiveTime> {
    let whole = time.split('.').next()?;
    if !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| whole.get(range).and_then(|s| s.parse::<u32>().ok());
    match whole.len() {
        2 => NaiveTime::from_hms_opt(field(0..2)?, 0, 0),
        4 => NaiveTime::from_hms_opt(field(0..2)?, field(2..4)?, 0),
        6 => NaiveTime::from_hms_opt(field(0..2)?, field(2..4)?, field(4..6)?),
        _ => None,
    }
}
