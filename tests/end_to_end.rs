//! 从 DICOM 记录到比对报告的完整流程

use dicom::core::value::DataSetSequence;
use dicom::core::{dicom_value, DataElement, PrimitiveValue, Tag, VR};
use dicom::object::InMemDicomObject;
use hdr_qa::core::{BrachyPlan, HdrError};
use hdr_qa::dicom::{tags, PlanValidator, RtPlanParser};
use hdr_qa::dose::{
    AnalysisOptions, AnisotropyTable, DifferenceBasis, PlanAnalysis, PointOutcome, RadialDoseTable, SourceModel,
    Tg43Engine,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("crates/hdr-dose/tests/fixtures")
        .join(name)
}

fn put_str(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) {
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(value)));
}

fn put_f64(obj: &mut InMemDicomObject, tag: Tag, value: f64) {
    obj.put(DataElement::new(tag, VR::DS, PrimitiveValue::from(value)));
}

fn put_seq(obj: &mut InMemDicomObject, tag: Tag, items: Vec<InMemDicomObject>) {
    obj.put(DataElement::new(tag, VR::SQ, DataSetSequence::from(items)));
}

fn control_point(x: f64, y: f64, z: f64, weight: f64) -> InMemDicomObject {
    let mut cp = InMemDicomObject::new_empty();
    cp.put(DataElement::new(tags::CONTROL_POINT_3D_POSITION, VR::DS, dicom_value!(F64, [x, y, z])));
    put_f64(&mut cp, tags::CUMULATIVE_TIME_WEIGHT, weight);
    cp
}

/// 等权重驻留：每个位置一对控制点
fn channel(number: &str, total_time: f64, positions: &[(f64, f64, f64)]) -> InMemDicomObject {
    let step = 1.0 / positions.len() as f64;
    let mut cps = Vec::new();
    for (i, &(x, y, z)) in positions.iter().enumerate() {
        cps.push(control_point(x, y, z, i as f64 * step));
        cps.push(control_point(x, y, z, (i + 1) as f64 * step));
    }

    let mut ch = InMemDicomObject::new_empty();
    put_str(&mut ch, tags::CHANNEL_NUMBER, VR::IS, number);
    put_f64(&mut ch, tags::CHANNEL_TOTAL_TIME, total_time);
    put_f64(&mut ch, tags::FINAL_CUMULATIVE_TIME_WEIGHT, 1.0);
    put_seq(&mut ch, tags::BRACHY_CONTROL_POINT_SEQUENCE, cps);
    ch
}

fn dose_point(name: &str, coords: [f64; 3], dose: f64) -> InMemDicomObject {
    let mut item = InMemDicomObject::new_empty();
    put_str(&mut item, tags::DOSE_REFERENCE_DESCRIPTION, VR::LO, name);
    item.put(DataElement::new(
        tags::DOSE_REFERENCE_POINT_COORDINATES,
        VR::DS,
        dicom_value!(F64, [coords[0], coords[1], coords[2]]),
    ));
    put_f64(&mut item, tags::TARGET_PRESCRIPTION_DOSE, dose);
    item
}

fn plan_record() -> InMemDicomObject {
    let mut record = InMemDicomObject::new_empty();
    put_str(&mut record, tags::PATIENT_ID, VR::LO, "QA-0001");
    put_str(&mut record, tags::RT_PLAN_LABEL, VR::SH, "Tandem Ovoid");
    put_str(&mut record, tags::RT_PLAN_DATE, VR::DA, "20240315");

    let mut setup_ref = InMemDicomObject::new_empty();
    put_f64(&mut setup_ref, tags::BRACHY_APPLICATION_SETUP_DOSE, 7.0);
    let mut fraction_group = InMemDicomObject::new_empty();
    put_seq(&mut fraction_group, tags::REFERENCED_BRACHY_APPLICATION_SETUP_SEQUENCE, vec![setup_ref]);
    put_seq(&mut record, tags::FRACTION_GROUP_SEQUENCE, vec![fraction_group]);

    put_seq(
        &mut record,
        tags::DOSE_REFERENCE_SEQUENCE,
        vec![
            dose_point("A1", [-26.263365, -6.806701, -94.109772], 7.157785),
            dose_point("A2", [26.0, -6.8, -94.1], 7.042215),
            dose_point("Bladder", [0.0, 25.0, -100.0], 3.872681),
            dose_point("Zero", [0.0, 30.0, -60.0], 0.0),
        ],
    );

    let tandem: Vec<(f64, f64, f64)> = (0..8).map(|i| (0.0, -7.0, -90.0 + i as f64 * 5.0)).collect();
    let ovoid: Vec<(f64, f64, f64)> = (0..4).map(|i| (15.0, -4.0, -96.0 + i as f64 * 2.5)).collect();
    let mut setup = InMemDicomObject::new_empty();
    put_seq(
        &mut setup,
        tags::CHANNEL_SEQUENCE,
        vec![channel("1", 200.0, &tandem), channel("3", 48.0, &ovoid)],
    );
    put_seq(&mut record, tags::APPLICATION_SETUP_SEQUENCE, vec![setup]);

    record
}

fn engine() -> Arc<Tg43Engine> {
    let radial = RadialDoseTable::load(fixture("radial_dose.csv"), Some("gL")).unwrap();
    let anisotropy = AnisotropyTable::load(fixture("anisotropy.csv"), Some("F")).unwrap();
    let model = SourceModel::new("mHDR-v2r", 1.109, 40_700.0, 0.36, radial, anisotropy).unwrap();
    Arc::new(Tg43Engine::new(model))
}

fn plan() -> BrachyPlan {
    RtPlanParser::extract_plan(&plan_record()).unwrap()
}

#[test]
fn test_plan_extraction() {
    let plan = plan();
    assert_eq!(plan.channel_numbers(), &[1, 3]);
    assert_eq!(plan.dwell_positions().len(), 12);
    assert!((plan.channel_dwell_time(1) - 200.0).abs() < 1e-9);
    assert!((plan.channel_dwell_time(3) - 48.0).abs() < 1e-9);
    assert!((plan.dwell_positions()[0].dwell_time - 25.0).abs() < 1e-9);

    let validation = PlanValidator::new().validate_plan(&plan);
    assert!(!validation.has_errors(), "{}", validation.get_detailed_report());
    assert!(validation.has_warnings());
}

#[tokio::test]
async fn test_report_follows_plan_order() {
    let plan = plan();
    let engine = engine();
    let analysis = PlanAnalysis::new(Arc::clone(&engine), AnalysisOptions::default());
    let report = analysis.run(&plan).await.unwrap();

    let names: Vec<&str> = report.outcomes.iter().map(|o| o.point_name()).collect();
    assert_eq!(names, vec!["A1", "A2", "Bladder", "Zero"]);
    assert_eq!(report.channel_numbers, vec![1, 3]);
    assert_eq!(report.patient_id, "QA-0001");
    assert_eq!(report.failure_count(), 1);
    assert!(!report.all_within_tolerance());

    match &report.outcomes[3] {
        PointOutcome::Failed { error, .. } => assert!(error.contains("参考剂量无效")),
        other => panic!("Zero 应计算失败: {:?}", other),
    }
}

#[tokio::test]
async fn test_computed_dose_matches_engine() {
    let plan = plan();
    let engine = engine();
    let analysis = PlanAnalysis::new(Arc::clone(&engine), AnalysisOptions::default());
    let report = analysis.run(&plan).await.unwrap();
    let trains = analysis.source_trains(&plan).unwrap();

    for (outcome, poi) in report.outcomes.iter().zip(plan.points()).take(3) {
        let comparison = outcome.comparison().unwrap();
        let direct = engine.calculate_dose(&trains, &poi.position()).unwrap();
        let breakdown: f64 = engine
            .calculate_dose_breakdown(&trains, &poi.position())
            .unwrap()
            .iter()
            .map(|c| c.dose)
            .sum();

        assert_eq!(comparison.computed_dose, direct);
        assert!(((breakdown - direct) / direct).abs() < 1e-12);
        let expected = (poi.dose - direct) / poi.dose * 100.0;
        assert!((comparison.percentage_difference - expected).abs() < 1e-9);
    }

    let a1 = report.outcomes[0].comparison().unwrap().computed_dose;
    let bladder = report.outcomes[2].comparison().unwrap().computed_dose;
    assert!(a1 > 1.0 && a1 < 20.0, "A1 = {}", a1);
    assert!(bladder < a1);
}

#[tokio::test]
async fn test_channel_restriction_and_basis() {
    let plan = plan();
    let engine = engine();

    let all = PlanAnalysis::new(Arc::clone(&engine), AnalysisOptions::default())
        .run(&plan)
        .await
        .unwrap();
    let tandem_only = PlanAnalysis::new(
        Arc::clone(&engine),
        AnalysisOptions {
            channels: Some(vec![1]),
            difference_basis: DifferenceBasis::Computed,
            ..AnalysisOptions::default()
        },
    )
    .run(&plan)
    .await
    .unwrap();

    assert_eq!(tandem_only.channel_numbers, vec![1]);
    let full = all.outcomes[0].comparison().unwrap();
    let partial = tandem_only.outcomes[0].comparison().unwrap();
    assert!(partial.computed_dose < full.computed_dose);

    let expected = (partial.reference_dose - partial.computed_dose) / partial.computed_dose * 100.0;
    assert!((partial.percentage_difference - expected).abs() < 1e-9);
}

#[tokio::test]
async fn test_report_json() {
    let plan = plan();
    let report = PlanAnalysis::new(engine(), AnalysisOptions::default()).run(&plan).await.unwrap();
    let json = report.to_json().unwrap();

    assert!(json.contains("\"status\": \"compared\""));
    assert!(json.contains("\"status\": \"failed\""));
    assert!(json.contains("\"difference_basis\": \"reference\""));
    let digest = report.radial_dose_digest.as_deref().unwrap();
    assert_eq!(digest.len(), 64);
    assert!(json.contains(digest));

    let table = report.render_table();
    assert!(table.contains("QA-0001"));
    assert!(table.contains("FAILED"));
}

#[test]
fn test_non_dicom_file_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "not a dicom file").unwrap();
    let result = RtPlanParser::parse_file(file.path());
    assert!(matches!(result, Err(HdrError::Dicom(_))));
}
