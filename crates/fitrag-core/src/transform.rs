//! Fitted record encoder persisted as JSON.
//!
//! Numeric columns: median imputation then standard scaling. Categorical columns:
//! most-frequent imputation then one-hot over the fitted categories; categories not
//! seen at fit time encode as all zeros. Output layout is all numeric columns in fit
//! order followed by each categorical column's one-hot block.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::tabular::{Cell, Column, ColumnKind, TabularRecord};
use crate::traits::FeatureTransform;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericEncoder {
    pub column: String,
    pub fill: f64,
    pub mean: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoder {
    pub column: String,
    pub fill: Option<String>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    pub numeric: Vec<NumericEncoder>,
    pub categorical: Vec<CategoricalEncoder>,
}

impl FittedPipeline {
    /// Fit encoders for every schema column on `records`.
    pub fn fit(records: &[TabularRecord]) -> Self {
        let mut numeric = Vec::new();
        let mut categorical = Vec::new();
        for column in Column::ALL {
            match column.kind() {
                ColumnKind::Numeric => numeric.push(fit_numeric(column, records)),
                ColumnKind::Categorical => categorical.push(fit_categorical(column, records)),
            }
        }
        Self { numeric, categorical }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn resolve_column(header: &str) -> Result<Column> {
    Column::from_header(header)
        .ok_or_else(|| Error::SchemaMismatch(format!("transform expects column '{}' which the record schema lacks", header)))
}

fn numeric_value(cell: &Cell, header: &str) -> Result<Option<f64>> {
    match cell {
        Cell::Null => Ok(None),
        Cell::Number(n) => Ok(Some(*n)),
        Cell::Text(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| Error::SchemaMismatch(format!("column '{}' is numeric but holds '{}'", header, s))),
    }
}

fn category_value(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Null => None,
        Cell::Number(n) => Some(n.to_string()),
        Cell::Text(s) => Some(s.clone()),
    }
}

fn fit_numeric(column: Column, records: &[TabularRecord]) -> NumericEncoder {
    let mut present: Vec<f64> = records
        .iter()
        .filter_map(|r| numeric_value(r.get(column), column.header()).ok().flatten())
        .collect();
    present.sort_by(f64::total_cmp);
    let fill = median(&present).unwrap_or(0.0);
    let filled: Vec<f64> = records
        .iter()
        .map(|r| numeric_value(r.get(column), column.header()).ok().flatten().unwrap_or(fill))
        .collect();
    let (mean, std) = mean_std(&filled);
    NumericEncoder { column: column.header().to_string(), fill, mean, scale: if std > 0.0 { std } else { 1.0 } }
}

fn fit_categorical(column: Column, records: &[TabularRecord]) -> CategoricalEncoder {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for value in records.iter().filter_map(|r| category_value(r.get(column))) {
        *counts.entry(value).or_default() += 1;
    }
    // BTreeMap order makes ties resolve to the smallest category.
    let fill = counts
        .iter()
        .fold(None::<(&String, usize)>, |best, (value, &n)| match best {
            Some((_, best_n)) if best_n >= n => best,
            _ => Some((value, n)),
        })
        .map(|(value, _)| value.clone());
    CategoricalEncoder { column: column.header().to_string(), fill, categories: counts.into_keys().collect() }
}

fn median(sorted: &[f64]) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 { (sorted[mid - 1] + sorted[mid]) / 2.0 } else { sorted[mid] })
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

impl FeatureTransform for FittedPipeline {
    fn output_dim(&self) -> usize {
        self.numeric.len() + self.categorical.iter().map(|c| c.categories.len()).sum::<usize>()
    }

    fn transform(&self, record: &TabularRecord) -> Result<Vec<f32>> {
        let mut out = Vec::with_capacity(self.output_dim());
        for enc in &self.numeric {
            let column = resolve_column(&enc.column)?;
            let v = numeric_value(record.get(column), &enc.column)?.unwrap_or(enc.fill);
            out.push(((v - enc.mean) / enc.scale) as f32);
        }
        for enc in &self.categorical {
            let column = resolve_column(&enc.column)?;
            let value = category_value(record.get(column)).or_else(|| enc.fill.clone());
            out.extend(enc.categories.iter().map(|c| if Some(c) == value.as_ref() { 1.0 } else { 0.0 }));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_and_std_follow_population_definitions() {
        assert_eq!(median(&[1.0, 2.0, 3.0, 10.0]), Some(2.5));
        assert_eq!(median(&[]), None);
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-12);
        assert!((std - 2.0).abs() < 1e-12);
    }
}
