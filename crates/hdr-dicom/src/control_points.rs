//! 控制点序列到驻留位置的换算
//!
//! 同一位置上连续的控制点合并为一次驻留，驻留时间为该段累积权重增量
//! 占最终累积权重的比例乘以通道总时间。在两个不同位置之间累积的权重
//! 计入目标位置。

use hdr_core::{DwellPosition, HdrError, Result, Vec3};
use tracing::debug;

/// 位置相同的判定阈值 (mm)
const POSITION_TOLERANCE_MM: f64 = 1e-6;

/// 累积权重允许的舍入回退
const WEIGHT_TOLERANCE: f64 = 1e-9;

/// 通道只有一个位置时使用的默认源轴 (计划坐标系第 2 轴，即引擎头脚方向)
pub const DEFAULT_SOURCE_AXIS: Vec3 = Vec3::new(0.0, 0.0, 1.0);

/// 后装控制点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlPoint {
    /// 控制点三维位置 (mm, 计划坐标系)
    pub position: Vec3,
    pub cumulative_weight: f64,
}

struct Stop {
    position: Vec3,
    weight: f64,
}

/// 由一个通道的控制点序列推导驻留位置，保持计划原有顺序
///
/// 零时间的位置不作为驻留输出。
pub fn derive_dwells(
    channel: u32,
    total_time: f64,
    final_cumulative_weight: f64,
    control_points: &[ControlPoint],
) -> Result<Vec<DwellPosition>> {
    if control_points.is_empty() {
        return Ok(Vec::new());
    }

    if final_cumulative_weight <= 0.0 {
        if total_time > 0.0 {
            return Err(HdrError::MalformedPlan(format!(
                "通道 {} 总时间为 {} s，但最终累积权重为 {}",
                channel, total_time, final_cumulative_weight
            )));
        }
        debug!("通道 {} 无治疗时间，跳过", channel);
        return Ok(Vec::new());
    }

    let mut stops: Vec<Stop> = Vec::new();
    let mut previous_weight = control_points[0].cumulative_weight;
    for cp in control_points {
        let delta = cp.cumulative_weight - previous_weight;
        if delta < -WEIGHT_TOLERANCE {
            return Err(HdrError::MalformedPlan(format!(
                "通道 {} 累积时间权重递减: {} -> {}",
                channel, previous_weight, cp.cumulative_weight
            )));
        }
        let delta = delta.max(0.0);
        previous_weight = cp.cumulative_weight;

        match stops.last_mut() {
            Some(last) if last.position.distance(&cp.position) <= POSITION_TOLERANCE_MM => {
                last.weight += delta;
            }
            _ => stops.push(Stop {
                position: cp.position,
                weight: delta,
            }),
        }
    }

    let mut dwells = Vec::new();
    for (i, stop) in stops.iter().enumerate() {
        if stop.weight <= 0.0 {
            continue;
        }
        let axis = source_axis(&stops, i);
        let dwell_time = stop.weight / final_cumulative_weight * total_time;
        dwells.push(DwellPosition {
            channel,
            position: stop.position,
            dwell_time,
            axis,
        });
    }

    debug!("通道 {}: {} 个控制点, {} 个驻留位置", channel, control_points.len(), dwells.len());
    Ok(dwells)
}

/// 源轴取相邻不同位置的连线方向
fn source_axis(stops: &[Stop], i: usize) -> Vec3 {
    let here = stops[i].position;
    let before = i.checked_sub(1).map(|j| stops[j].position);
    let after = stops.get(i + 1).map(|s| s.position);

    let direction = match (before, after) {
        (Some(b), Some(a)) => a - b,
        (None, Some(a)) => a - here,
        (Some(b), None) => here - b,
        (None, None) => DEFAULT_SOURCE_AXIS,
    };
    direction.normalized().unwrap_or(DEFAULT_SOURCE_AXIS)
}
