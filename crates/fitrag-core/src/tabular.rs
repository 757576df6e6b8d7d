//! Fixed tabular schema for fitness records and the request → record mapping.
//!
//! Column headers are the ones of the source fitness-record table; a fitted
//! transform refers to columns by header. Three columns (waist circumference,
//! age bracket, certification) have no counterpart in the request payload and are
//! always null for request-derived records.
use serde::{Deserialize, Serialize};

use crate::types::{Measurements, StructuredDoc, UserProfile, DEFAULT_STRUCTURED_SOURCE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Age,
    HeightCm,
    WeightKg,
    WaistCm,
    Bmi,
    SitupReps,
    ReachCm,
    Vo2max,
    Sex,
    AgeBracket,
    Certification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

pub const COLUMN_COUNT: usize = 11;

impl Column {
    pub const ALL: [Column; COLUMN_COUNT] = [
        Column::Age,
        Column::HeightCm,
        Column::WeightKg,
        Column::WaistCm,
        Column::Bmi,
        Column::SitupReps,
        Column::ReachCm,
        Column::Vo2max,
        Column::Sex,
        Column::AgeBracket,
        Column::Certification,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Column::Age => "측정연령수",
            Column::HeightCm => "측정항목_1값 : 신장(cm)",
            Column::WeightKg => "측정항목_2값 : 체중(kg)",
            Column::WaistCm => "측정항목_4값 : 허리둘레(cm)",
            Column::Bmi => "측정항목_18값 : BMI(kg/㎡)",
            Column::SitupReps => "측정항목_9값 : 윗몸말아올리기(회)",
            Column::ReachCm => "측정항목_12값 : 앉아윗몸앞으로굽히기(cm)",
            Column::Vo2max => "VO₂max",
            Column::Sex => "성별구분코드",
            Column::AgeBracket => "연령대구분명",
            Column::Certification => "인증구분명",
        }
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            Column::Sex | Column::AgeBracket | Column::Certification => ColumnKind::Categorical,
            _ => ColumnKind::Numeric,
        }
    }

    pub fn from_header(header: &str) -> Option<Column> {
        Column::ALL.into_iter().find(|c| c.header() == header)
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// Where a schema column is read from in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceField {
    UserAge,
    UserHeightCm,
    UserWeightKg,
    UserBmi,
    UserSex,
    SitupReps,
    ReachCm,
    StepVo2max,
    /// Not supplied by the request payload; always null.
    Unsourced,
}

/// Request → record mapping, one entry per column in `Column::ALL` order.
pub const SCHEMA: [(Column, SourceField); COLUMN_COUNT] = [
    (Column::Age, SourceField::UserAge),
    (Column::HeightCm, SourceField::UserHeightCm),
    (Column::WeightKg, SourceField::UserWeightKg),
    (Column::WaistCm, SourceField::Unsourced),
    (Column::Bmi, SourceField::UserBmi),
    (Column::SitupReps, SourceField::SitupReps),
    (Column::ReachCm, SourceField::ReachCm),
    (Column::Vo2max, SourceField::StepVo2max),
    (Column::Sex, SourceField::UserSex),
    (Column::AgeBracket, SourceField::Unsourced),
    (Column::Certification, SourceField::Unsourced),
];

const _: () = {
    let mut i = 0;
    while i < COLUMN_COUNT {
        assert!(SCHEMA[i].0 as usize == i, "SCHEMA must list columns in declaration order");
        i += 1;
    }
};

impl SourceField {
    fn read(self, user: &UserProfile, measurements: &Measurements) -> Cell {
        match self {
            SourceField::UserAge => Cell::from(user.age),
            SourceField::UserHeightCm => Cell::from(user.height_cm),
            SourceField::UserWeightKg => Cell::from(user.weight_kg),
            SourceField::UserBmi => Cell::from(user.bmi),
            SourceField::UserSex => Cell::from(user.sex.clone()),
            SourceField::SitupReps => Cell::from(measurements.situp_reps),
            SourceField::ReachCm => Cell::from(measurements.reach_cm),
            SourceField::StepVo2max => Cell::from(measurements.step_vo2max),
            SourceField::Unsourced => Cell::Null,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        match v {
            Some(n) if n.is_finite() => Cell::Number(n),
            _ => Cell::Null,
        }
    }
}

impl From<Option<String>> for Cell {
    fn from(v: Option<String>) -> Self {
        match v {
            Some(s) if !s.trim().is_empty() => Cell::Text(s.trim().to_string()),
            _ => Cell::Null,
        }
    }
}

/// One row in the fixed schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularRecord {
    cells: [Cell; COLUMN_COUNT],
}

impl TabularRecord {
    pub fn get(&self, column: Column) -> &Cell {
        &self.cells[column.index()]
    }

    pub fn set(&mut self, column: Column, cell: Cell) {
        self.cells[column.index()] = cell;
    }

    pub fn is_all_null(&self) -> bool {
        self.cells.iter().all(Cell::is_null)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Column, &Cell)> {
        Column::ALL.into_iter().zip(self.cells.iter())
    }
}

/// Map a request onto the record schema. Absent inputs become nulls, never errors.
pub fn map_to_schema(user: &UserProfile, measurements: &Measurements) -> TabularRecord {
    let mut record = TabularRecord::default();
    for (column, source) in SCHEMA {
        record.set(column, source.read(user, measurements));
    }
    record
}

/// A row of the structured source table. Fields accept either the snake_case column
/// name or the table's original header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessRecord {
    #[serde(default)]
    pub row_id: Option<u64>,
    #[serde(default, alias = "측정연령수")]
    pub age: Option<f64>,
    #[serde(default, alias = "측정항목_1값 : 신장(cm)")]
    pub height_cm: Option<f64>,
    #[serde(default, alias = "측정항목_2값 : 체중(kg)")]
    pub weight_kg: Option<f64>,
    #[serde(default, alias = "측정항목_4값 : 허리둘레(cm)")]
    pub waist_cm: Option<f64>,
    #[serde(default, alias = "측정항목_18값 : BMI(kg/㎡)")]
    pub bmi: Option<f64>,
    #[serde(default, alias = "측정항목_9값 : 윗몸말아올리기(회)")]
    pub situp_reps: Option<f64>,
    #[serde(default, alias = "측정항목_12값 : 앉아윗몸앞으로굽히기(cm)")]
    pub reach_cm: Option<f64>,
    #[serde(default, alias = "VO₂max")]
    pub vo2max: Option<f64>,
    #[serde(default, alias = "성별구분코드")]
    pub sex: Option<String>,
    #[serde(default, alias = "연령대구분명")]
    pub age_bracket: Option<String>,
    #[serde(default, alias = "인증구분명")]
    pub certification: Option<String>,
    #[serde(default)]
    pub prescription_text: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl FitnessRecord {
    pub fn to_record(&self) -> TabularRecord {
        let mut record = TabularRecord::default();
        record.set(Column::Age, Cell::from(self.age));
        record.set(Column::HeightCm, Cell::from(self.height_cm));
        record.set(Column::WeightKg, Cell::from(self.weight_kg));
        record.set(Column::WaistCm, Cell::from(self.waist_cm));
        record.set(Column::Bmi, Cell::from(self.bmi));
        record.set(Column::SitupReps, Cell::from(self.situp_reps));
        record.set(Column::ReachCm, Cell::from(self.reach_cm));
        record.set(Column::Vo2max, Cell::from(self.vo2max));
        record.set(Column::Sex, Cell::from(self.sex.clone()));
        record.set(Column::AgeBracket, Cell::from(self.age_bracket.clone()));
        record.set(Column::Certification, Cell::from(self.certification.clone()));
        record
    }

    /// Metadata for the index row at `position`; `row_id` defaults to the position.
    pub fn to_doc(&self, position: usize) -> StructuredDoc {
        StructuredDoc {
            row_id: self.row_id.unwrap_or(position as u64),
            sex: self.sex.clone(),
            age: self.age,
            bmi: self.bmi,
            situp_reps: self.situp_reps,
            reach_cm: self.reach_cm,
            vo2max: self.vo2max,
            prescription_text: self.prescription_text.clone(),
            source: self.source.clone().unwrap_or_else(|| DEFAULT_STRUCTURED_SOURCE.to_string()),
        }
    }
}
