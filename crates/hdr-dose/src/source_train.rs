//! 源列构建
//!
//! 按通道把驻留位置分组为源列，保留计划中的原始顺序。源列中的位置和
//! 源轴已换算到剂量引擎坐标系 (cm)。

use hdr_core::{BrachyPlan, DwellPosition, Vec3};
use serde::Serialize;
use std::ops::Index;
use tracing::debug;

/// 引擎坐标系中的一个驻留源
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SourceDwell {
    pub channel: u32,
    /// 源中心位置 (cm, 引擎坐标系)
    pub position: Vec3,
    /// 源长轴单位向量 (引擎坐标系)
    pub axis: Vec3,
    /// 驻留时间 (s)
    pub dwell_time: f64,
}

impl From<&DwellPosition> for SourceDwell {
    fn from(dwell: &DwellPosition) -> Self {
        Self {
            channel: dwell.channel,
            position: dwell.position.plan_mm_to_engine_cm(),
            axis: dwell.axis.to_engine_axes(),
            dwell_time: dwell.dwell_time,
        }
    }
}

/// 单个通道的源列
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceTrain {
    channel: u32,
    dwells: Vec<SourceDwell>,
}

impl SourceTrain {
    pub fn new(channel: u32, dwells: Vec<SourceDwell>) -> Self {
        Self { channel, dwells }
    }

    pub fn channel(&self) -> u32 {
        self.channel
    }

    pub fn dwells(&self) -> &[SourceDwell] {
        &self.dwells
    }

    pub fn len(&self) -> usize {
        self.dwells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dwells.is_empty()
    }

    /// 通道总驻留时间 (s)
    pub fn total_time(&self) -> f64 {
        self.dwells.iter().map(|d| d.dwell_time).sum()
    }
}

/// 计划中所有源列，按通道首次出现顺序排列
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceTrains {
    trains: Vec<SourceTrain>,
}

impl SourceTrains {
    pub fn new(trains: Vec<SourceTrain>) -> Self {
        Self { trains }
    }

    pub fn get(&self, channel: u32) -> Option<&SourceTrain> {
        self.trains.iter().find(|t| t.channel == channel)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceTrain> {
        self.trains.iter()
    }

    pub fn len(&self) -> usize {
        self.trains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }

    pub fn channels(&self) -> Vec<u32> {
        self.trains.iter().map(|t| t.channel).collect()
    }

    pub fn dwell_count(&self) -> usize {
        self.trains.iter().map(SourceTrain::len).sum()
    }

    /// 只保留指定通道的源列
    pub fn restricted_to(&self, channels: &[u32]) -> SourceTrains {
        SourceTrains::new(
            self.trains
                .iter()
                .filter(|t| channels.contains(&t.channel))
                .cloned()
                .collect(),
        )
    }
}

impl Index<usize> for SourceTrains {
    type Output = SourceTrain;

    fn index(&self, index: usize) -> &SourceTrain {
        &self.trains[index]
    }
}

/// 由治疗计划构建源列；对同一计划多次调用结果相同
pub fn make_source_trains(plan: &BrachyPlan) -> SourceTrains {
    let trains: Vec<SourceTrain> = plan
        .channel_numbers()
        .iter()
        .map(|&channel| {
            let dwells = plan
                .dwell_positions()
                .iter()
                .filter(|d| d.channel == channel)
                .map(SourceDwell::from)
                .collect();
            SourceTrain::new(channel, dwells)
        })
        .collect();

    debug!(
        "构建源列: {} 个通道, {} 个驻留位置",
        trains.len(),
        trains.iter().map(SourceTrain::len).sum::<usize>()
    );
    SourceTrains::new(trains)
}
