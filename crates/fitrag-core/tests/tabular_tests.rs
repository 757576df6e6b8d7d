use fitrag_core::tabular::{map_to_schema, Cell, Column, FitnessRecord, TabularRecord, SCHEMA};
use fitrag_core::traits::FeatureTransform;
use fitrag_core::transform::{CategoricalEncoder, FittedPipeline, NumericEncoder};
use fitrag_core::types::{Measurements, QueryInput, UserProfile};
use fitrag_core::Error;

fn sample_rows() -> Vec<FitnessRecord> {
    serde_json::from_str(
        r#"[
            {"age": 25, "height_cm": 160, "weight_kg": 55, "bmi": 21.5, "situp_reps": 20, "reach_cm": 5.0, "vo2max": 35.0, "sex": "F", "prescription_text": "A"},
            {"age": 45, "height_cm": 175, "weight_kg": 80, "bmi": 26.1, "situp_reps": 15, "reach_cm": 1.0, "vo2max": 31.0, "sex": "M", "prescription_text": "B"},
            {"age": 35, "height_cm": null, "weight_kg": 70, "bmi": 24.0, "situp_reps": 30, "reach_cm": 10.0, "sex": "M", "prescription_text": "C"}
        ]"#,
    )
    .unwrap()
}

#[test]
fn empty_request_maps_to_fully_null_record() {
    let record = map_to_schema(&UserProfile::default(), &Measurements::default());
    assert!(record.is_all_null());
    let parsed: QueryInput = serde_json::from_str("{}").unwrap();
    assert!(map_to_schema(&parsed.user, &parsed.measurements).is_all_null());
}

#[test]
fn request_fields_land_in_their_columns() {
    let input: QueryInput = serde_json::from_str(
        r#"{"user": {"name": "x", "sex": "F", "age": 25, "height_cm": 160, "weight_kg": 55, "bmi": 21.5},
            "measurements": {"situp_reps": 20, "reach_cm": 5.0, "step_vo2max": null, "step_bpm": 98}}"#,
    )
    .unwrap();
    let record = map_to_schema(&input.user, &input.measurements);
    assert_eq!(record.get(Column::Age), &Cell::Number(25.0));
    assert_eq!(record.get(Column::HeightCm), &Cell::Number(160.0));
    assert_eq!(record.get(Column::WeightKg), &Cell::Number(55.0));
    assert_eq!(record.get(Column::Bmi), &Cell::Number(21.5));
    assert_eq!(record.get(Column::SitupReps), &Cell::Number(20.0));
    assert_eq!(record.get(Column::ReachCm), &Cell::Number(5.0));
    assert_eq!(record.get(Column::Vo2max), &Cell::Null);
    assert_eq!(record.get(Column::Sex), &Cell::Text("F".to_string()));
}

#[test]
fn unsourced_columns_stay_null_even_with_full_input() {
    let user = UserProfile { sex: Some("M".into()), age: Some(40.0), height_cm: Some(180.0), weight_kg: Some(90.0), bmi: Some(27.8), ..Default::default() };
    let meas = Measurements { situp_reps: Some(10.0), reach_cm: Some(2.0), step_vo2max: Some(40.0), ..Default::default() };
    let record = map_to_schema(&user, &meas);
    for column in [Column::WaistCm, Column::AgeBracket, Column::Certification] {
        assert_eq!(record.get(column), &Cell::Null, "{:?}", column);
    }
    let sourced = record.iter().filter(|(_, c)| !c.is_null()).count();
    assert_eq!(sourced, SCHEMA.len() - 3);
}

#[test]
fn fitted_pipeline_encodes_with_fixed_width() {
    let records: Vec<TabularRecord> = sample_rows().iter().map(FitnessRecord::to_record).collect();
    let pipeline = FittedPipeline::fit(&records);
    // 8 numeric columns + sex {F, M}; age bracket and certification have no categories
    assert_eq!(pipeline.output_dim(), 10);
    for record in &records {
        assert_eq!(pipeline.transform(record).unwrap().len(), 10);
    }
    let empty = pipeline.transform(&TabularRecord::default()).unwrap();
    assert_eq!(empty.len(), 10);
    // sex imputed with the most frequent category
    assert_eq!(&empty[8..], &[0.0, 1.0]);
}

#[test]
fn numeric_columns_are_standardized_with_median_imputation() {
    let records: Vec<TabularRecord> = sample_rows().iter().map(FitnessRecord::to_record).collect();
    let pipeline = FittedPipeline::fit(&records);
    let height = &pipeline.numeric[1];
    assert_eq!(height.column, Column::HeightCm.header());
    assert!((height.fill - 167.5).abs() < 1e-9);
    let ages: Vec<f32> = records.iter().map(|r| pipeline.transform(r).unwrap()[0]).collect();
    let mean: f32 = ages.iter().sum::<f32>() / 3.0;
    assert!(mean.abs() < 1e-5);
    assert!(ages[0] < ages[2] && ages[2] < ages[1]);
}

#[test]
fn unknown_category_encodes_as_zeros() {
    let records: Vec<TabularRecord> = sample_rows().iter().map(FitnessRecord::to_record).collect();
    let pipeline = FittedPipeline::fit(&records);
    let mut record = TabularRecord::default();
    record.set(Column::Sex, Cell::Text("X".into()));
    let v = pipeline.transform(&record).unwrap();
    assert_eq!(&v[8..], &[0.0, 0.0]);
}

#[test]
fn transform_fitted_on_other_columns_is_a_schema_mismatch() {
    let pipeline = FittedPipeline {
        numeric: vec![NumericEncoder { column: "grip_strength".into(), fill: 0.0, mean: 0.0, scale: 1.0 }],
        categorical: vec![],
    };
    let err = pipeline.transform(&TabularRecord::default()).unwrap_err();
    assert!(matches!(err, Error::SchemaMismatch(_)));
}

#[test]
fn text_in_numeric_column_is_a_schema_mismatch() {
    let pipeline = FittedPipeline {
        numeric: vec![NumericEncoder { column: Column::Sex.header().into(), fill: 0.0, mean: 0.0, scale: 1.0 }],
        categorical: vec![CategoricalEncoder { column: Column::Sex.header().into(), fill: None, categories: vec!["F".into()] }],
    };
    let mut record = TabularRecord::default();
    record.set(Column::Sex, Cell::Text("F".into()));
    assert!(matches!(pipeline.transform(&record), Err(Error::SchemaMismatch(_))));
}

#[test]
fn pipeline_survives_json_round_trip() {
    let records: Vec<TabularRecord> = sample_rows().iter().map(FitnessRecord::to_record).collect();
    let pipeline = FittedPipeline::fit(&records);
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("transform.json");
    std::fs::write(&path, pipeline.to_json().unwrap()).unwrap();
    let restored = FittedPipeline::load(&path).unwrap();
    assert_eq!(restored.output_dim(), pipeline.output_dim());
    for record in &records {
        let a = pipeline.transform(record).unwrap();
        let b = restored.transform(record).unwrap();
        assert!(a.iter().zip(&b).all(|(x, y)| (x - y).abs() < 1e-5));
    }
}
