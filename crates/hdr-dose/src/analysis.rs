//! 计划剂量分析
//!
//! 每个参考点的剂量只依赖源列和只读的参考数据表，各点作为独立任务
//! 并发计算。单个点失败只记录在报告中，不影响其他点。

use crate::comparison::{DifferenceBasis, PointComparison};
use crate::engine::Tg43Engine;
use crate::source_train::{make_source_trains, SourceTrains};
use chrono::{DateTime, Utc};
use hdr_core::{BrachyPlan, HdrError, PointOfInterest, Result};
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

/// 分析选项
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOptions {
    /// 允许的百分比偏差绝对值
    pub tolerance_percent: f64,
    pub difference_basis: DifferenceBasis,
    /// 参与计算的通道；`None` 表示全部
    pub channels: Option<Vec<u32>>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            tolerance_percent: 1.0,
            difference_basis: DifferenceBasis::Reference,
            channels: None,
        }
    }
}

/// 单个参考点的计算结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PointOutcome {
    Compared {
        #[serde(flatten)]
        comparison: PointComparison,
        within_tolerance: bool,
    },
    Failed {
        point_name: String,
        reference_dose: f64,
        error: String,
    },
}

impl PointOutcome {
    pub fn point_name(&self) -> &str {
        match self {
            PointOutcome::Compared { comparison, .. } => &comparison.point_name,
            PointOutcome::Failed { point_name, .. } => point_name,
        }
    }

    pub fn comparison(&self) -> Option<&PointComparison> {
        match self {
            PointOutcome::Compared { comparison, .. } => Some(comparison),
            PointOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, PointOutcome::Failed { .. })
    }
}

/// 整个计划的比对报告，参考点按计划顺序排列
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub analysis_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub patient_id: String,
    pub plan_name: String,
    pub prescription: f64,
    pub channel_numbers: Vec<u32>,
    pub source_name: String,
    pub air_kerma_strength: f64,
    pub radial_dose_digest: Option<String>,
    pub anisotropy_digest: Option<String>,
    pub tolerance_percent: f64,
    pub difference_basis: DifferenceBasis,
    pub outcomes: Vec<PointOutcome>,
}

impl AnalysisReport {
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    /// 所有参考点都计算成功且在容差范围内
    pub fn all_within_tolerance(&self) -> bool {
        self.outcomes.iter().all(|o| {
            matches!(
                o,
                PointOutcome::Compared {
                    within_tolerance: true,
                    ..
                }
            )
        })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// 固定宽度文本表格
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "患者ID: {}  计划: {}  处方: {:.3} Gy", self.patient_id, self.plan_name, self.prescription);
        let _ = writeln!(
            out,
            "放射源: {}  Sk: {:.3} U  通道: {:?}  容差: ±{}%",
            self.source_name, self.air_kerma_strength, self.channel_numbers, self.tolerance_percent
        );
        let _ = writeln!(
            out,
            "{:<16} {:>15} {:>15} {:>10}  {}",
            "Point", "Reference (Gy)", "Computed (Gy)", "Diff (%)", "Status"
        );
        let _ = writeln!(out, "{}", "-".repeat(68));

        for outcome in &self.outcomes {
            match outcome {
                PointOutcome::Compared {
                    comparison,
                    within_tolerance,
                } => {
                    let _ = writeln!(
                        out,
                        "{:<16} {:>15.6} {:>15.6} {:>10.3}  {}",
                        comparison.point_name,
                        comparison.reference_dose,
                        comparison.computed_dose,
                        comparison.percentage_difference,
                        if *within_tolerance { "OK" } else { "OUT" }
                    );
                }
                PointOutcome::Failed {
                    point_name,
                    reference_dose,
                    error,
                } => {
                    let _ = writeln!(
                        out,
                        "{:<16} {:>15.6} {:>15} {:>10}  FAILED: {}",
                        point_name, reference_dose, "-", "-", error
                    );
                }
            }
        }
        out
    }
}

/// 计划剂量分析器
pub struct PlanAnalysis {
    engine: Arc<Tg43Engine>,
    options: AnalysisOptions,
}

impl PlanAnalysis {
    pub fn new(engine: Arc<Tg43Engine>, options: AnalysisOptions) -> Self {
        Self { engine, options }
    }

    pub fn engine(&self) -> &Tg43Engine {
        &self.engine
    }

    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// 构建本次分析使用的源列
    pub fn source_trains(&self, plan: &BrachyPlan) -> Result<SourceTrains> {
        let trains = make_source_trains(plan);
        let trains = match &self.options.channels {
            Some(channels) => trains.restricted_to(channels),
            None => trains,
        };
        if trains.is_empty() {
            return Err(HdrError::MalformedPlan("没有可用于剂量计算的源列".to_string()));
        }
        Ok(trains)
    }

    /// 并发计算所有参考点并生成报告
    pub async fn run(&self, plan: &BrachyPlan) -> Result<AnalysisReport> {
        let trains = Arc::new(self.source_trains(plan)?);
        let points = plan.points();
        info!(
            "开始剂量分析: {} 个参考点, {} 条源列, {} 个驻留位置",
            points.len(),
            trains.len(),
            trains.dwell_count()
        );

        let mut tasks = JoinSet::new();
        for (index, poi) in points.iter().cloned().enumerate() {
            let engine = Arc::clone(&self.engine);
            let trains = Arc::clone(&trains);
            let options = self.options.clone();
            tasks.spawn_blocking(move || (index, evaluate_point(&engine, &trains, &poi, &options)));
        }

        let mut slots: Vec<Option<PointOutcome>> = (0..points.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => error!("参考点计算任务异常终止: {}", e),
            }
        }

        let outcomes: Vec<PointOutcome> = slots
            .into_iter()
            .zip(points)
            .map(|(slot, poi)| {
                slot.unwrap_or_else(|| PointOutcome::Failed {
                    point_name: poi.name.clone(),
                    reference_dose: poi.dose,
                    error: "计算任务异常终止".to_string(),
                })
            })
            .collect();

        let model = self.engine.model();
        let report = AnalysisReport {
            analysis_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            patient_id: plan.patient_id().to_string(),
            plan_name: plan.plan_name().to_string(),
            prescription: plan.prescription(),
            channel_numbers: trains.channels(),
            source_name: model.name.clone(),
            air_kerma_strength: model.air_kerma_strength,
            radial_dose_digest: model.radial_dose.table().digest().map(str::to_string),
            anisotropy_digest: model.anisotropy.table().digest().map(str::to_string),
            tolerance_percent: self.options.tolerance_percent,
            difference_basis: self.options.difference_basis,
            outcomes,
        };

        info!(
            "剂量分析完成: {} 个参考点, {} 个失败, 全部在容差内: {}",
            report.outcomes.len(),
            report.failure_count(),
            report.all_within_tolerance()
        );
        Ok(report)
    }
}

/// 计算单个参考点并与参考剂量比对
pub fn evaluate_point(
    engine: &Tg43Engine,
    trains: &SourceTrains,
    poi: &PointOfInterest,
    options: &AnalysisOptions,
) -> PointOutcome {
    let result = engine
        .calculate_dose(trains, &poi.position())
        .and_then(|dose| PointComparison::with_basis(&poi.name, poi.dose, dose, options.difference_basis));

    match result {
        Ok(comparison) => {
            let within_tolerance = comparison.within_tolerance(options.tolerance_percent);
            if !within_tolerance {
                warn!(
                    "参考点 {} 偏差 {:.3}% 超出容差 ±{}%",
                    comparison.point_name, comparison.percentage_difference, options.tolerance_percent
                );
            }
            PointOutcome::Compared {
                comparison,
                within_tolerance,
            }
        }
        Err(e) => {
            warn!("参考点 {} 计算失败: {}", poi.name, e);
            PointOutcome::Failed {
                point_name: poi.name.clone(),
                reference_dose: poi.dose,
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SourceModel;
    use crate::tables::{AnisotropyTable, RadialDoseTable, ReferenceTable};
    use hdr_core::{Channel, DwellPosition, Vec3};

    fn engine() -> Arc<Tg43Engine> {
        let radial = RadialDoseTable::from_table(ReferenceTable::parse_str("r,g\n0.1,1.0\n10,1.0\n").unwrap(), None).unwrap();
        let anisotropy = AnisotropyTable::from_table(
            ReferenceTable::parse_str("r,theta,F\n0.1,0,1\n0.1,180,1\n10,0,1\n10,180,1\n").unwrap(),
            None,
        )
        .unwrap();
        let model = SourceModel::new("flat", 1.1, 40_000.0, 0.0, radial, anisotropy).unwrap();
        Arc::new(Tg43Engine::new(model))
    }

    fn plan() -> BrachyPlan {
        let channels = vec![Channel { number: 1, total_time: 36.0, final_cumulative_weight: 1.0 }];
        let dwells = vec![DwellPosition {
            channel: 1,
            position: Vec3::new(0.0, 0.0, 0.0),
            dwell_time: 36.0,
            axis: Vec3::new(0.0, 0.0, 1.0),
        }];
        let points = vec![
            PointOfInterest { name: "Near".to_string(), coords: [20.0, 0.0, 0.0], dose: 1.1 },
            PointOfInterest { name: "Source".to_string(), coords: [0.0, 0.0, 0.0], dose: 5.0 },
            PointOfInterest { name: "Far".to_string(), coords: [0.0, 40.0, 0.0], dose: 0.3 },
            PointOfInterest { name: "Zero".to_string(), coords: [0.0, 0.0, 30.0], dose: 0.0 },
        ];
        BrachyPlan::new("P", "Plan", 7.1, channels, dwells, points).unwrap()
    }

    #[tokio::test]
    async fn test_run_keeps_plan_order_and_isolates_failures() {
        let analysis = PlanAnalysis::new(engine(), AnalysisOptions::default());
        let report = analysis.run(&plan()).await.unwrap();

        let names: Vec<&str> = report.outcomes.iter().map(|o| o.point_name()).collect();
        assert_eq!(names, vec!["Near", "Source", "Far", "Zero"]);

        let near = report.outcomes[0].comparison().unwrap();
        assert!((near.computed_dose - 1.1).abs() < 1e-12);
        assert!(near.percentage_difference.abs() < 1e-9);

        assert!(report.outcomes[1].is_failed());
        // 1.1 × (2/4)² = 0.275 Gy，比参考剂量 0.3 低 8.33%
        let far = report.outcomes[2].comparison().unwrap();
        assert!((far.computed_dose - 0.275).abs() < 1e-12);
        assert!((far.percentage_difference - 25.0 / 3.0).abs() < 1e-9);
        assert!(report.outcomes[3].is_failed());

        assert_eq!(report.failure_count(), 2);
        assert!(!report.all_within_tolerance());
    }

    #[tokio::test]
    async fn test_channel_restriction_without_trains() {
        let options = AnalysisOptions {
            channels: Some(vec![9]),
            ..AnalysisOptions::default()
        };
        let result = PlanAnalysis::new(engine(), options).run(&plan()).await;
        assert!(matches!(result, Err(HdrError::MalformedPlan(_))));
    }

    #[tokio::test]
    async fn test_report_rendering() {
        let analysis = PlanAnalysis::new(engine(), AnalysisOptions::default());
        let report = analysis.run(&plan()).await.unwrap();

        let table = report.render_table();
        assert!(table.contains("Near"));
        assert!(table.contains("FAILED"));

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["outcomes"][0]["status"], "compared");
        assert_eq!(json["outcomes"][0]["point_name"], "Near");
        assert_eq!(json["outcomes"][1]["status"], "failed");
        assert_eq!(json["difference_basis"], "reference");
    }
}
