//! Patient tables as polars frames, ingested from CSV or built from records.
//!
//! Every frame leaving this module has one column per schema field, in schema
//! order: numeric fields as `Float64`, categorical fields as `Utf8` labels.

use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::records::StrokeRecord;
use crate::schema::{FeatureSchema, Field, FieldKind};

/// Feature frame plus the binary outcome of each row.
#[derive(Debug, Clone)]
pub struct LabeledTable {
    pub features: DataFrame,
    pub labels: Vec<u8>,
}

impl LabeledTable {
    pub fn new(features: DataFrame, labels: Vec<u8>) -> Result<Self> {
        if features.height() != labels.len() {
            return Err(Error::schema(
                crate::schema::LABEL_COLUMN,
                format!("{} labels for {} rows", labels.len(), features.height()),
            ));
        }
        Ok(LabeledTable { features, labels })
    }

    pub fn height(&self) -> usize {
        self.labels.len()
    }

    pub fn take(&self, rows: &[usize]) -> Result<LabeledTable> {
        Ok(LabeledTable {
            features: self.features.take(&row_index(rows))?,
            labels: rows.iter().map(|&r| self.labels[r]).collect(),
        })
    }

    pub fn class_counts(&self) -> [usize; 2] {
        class_counts(&self.labels)
    }
}

pub fn row_index(rows: &[usize]) -> IdxCa {
    IdxCa::from_vec("row", rows.iter().map(|&r| r as IdxSize).collect())
}

pub fn class_counts(labels: &[u8]) -> [usize; 2] {
    let positive = labels.iter().filter(|&&y| y == 1).count();
    [labels.len() - positive, positive]
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestOptions {
    /// Cell contents read as missing values.
    pub null_values: Vec<String>,
    /// Columns present in the file that are dropped on purpose, e.g. a row id.
    pub ignored_columns: Vec<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        IngestOptions {
            null_values: vec!["N/A".to_string(), "NA".to_string(), "".to_string()],
            ignored_columns: Vec::new(),
        }
    }
}

pub fn read_csv<P: AsRef<Path>>(
    path: P,
    schema: &FeatureSchema,
    options: &IngestOptions,
) -> Result<LabeledTable> {
    /* Read the labeled training file and validate it against the schema */
    let path = path.as_ref();
    let file = File::open(path)?;

    let df = CsvReader::new(file)
        .has_header(true)
        .with_null_values(Some(NullValues::AllColumns(options.null_values.clone())))
        .finish()?;

    info!(path = %path.display(), rows = df.height(), columns = df.width(), "read training table");
    from_frame(&df, schema, options)
}

pub fn from_frame(
    df: &DataFrame,
    schema: &FeatureSchema,
    options: &IngestOptions,
) -> Result<LabeledTable> {
    for name in df.get_column_names() {
        let declared = schema.field(name).is_some() || name == schema.label();
        let ignored = options.ignored_columns.iter().any(|c| c.as_str() == name);
        if !declared && !ignored {
            return Err(Error::schema(name, "column is not declared in the schema"));
        }
    }

    let mut columns = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let series = df
            .column(field.name)
            .map_err(|_| Error::schema(field.name, "required column is missing"))?;
        let column = match field.kind {
            FieldKind::Numeric { min } => numeric_column(series, field, min)?,
            FieldKind::Categorical { .. } => categorical_column(series, field)?,
        };
        debug!(column = field.name, missing = column.null_count(), "ingested column");
        columns.push(column);
    }

    let label = df
        .column(schema.label())
        .map_err(|_| Error::schema(schema.label(), "required label column is missing"))?;
    let labels = label_values(label, schema.label())?;

    LabeledTable::new(DataFrame::new(columns)?, labels)
}

/// One row per record, shaped like an ingested frame. Categories given as
/// integer codes or padded labels resolve the way ingestion resolves them;
/// anything else is kept verbatim and left to the encoder's unseen-category
/// handling.
pub fn records_frame(records: &[StrokeRecord], schema: &FeatureSchema) -> Result<DataFrame> {
    let mut columns = Vec::with_capacity(schema.fields().len());
    for field in schema.fields() {
        let column = match field.kind {
            FieldKind::Numeric { .. } => {
                let values = records
                    .iter()
                    .map(|r| r.numeric(field.name))
                    .collect::<Result<Vec<Option<f64>>>>()?;
                Series::new(field.name, values)
            }
            FieldKind::Categorical { .. } => {
                let values = records
                    .iter()
                    .map(|r| {
                        r.category(field.name).map(|value| {
                            value.map(|v| {
                                field
                                    .resolve_category(v)
                                    .map(str::to_string)
                                    .unwrap_or_else(|| v.to_string())
                            })
                        })
                    })
                    .collect::<Result<Vec<Option<String>>>>()?;
                Series::new(field.name, values)
            }
        };
        columns.push(column);
    }
    Ok(DataFrame::new(columns)?)
}

fn all_null(series: &Series) -> bool {
    series.null_count() == series.len()
}

fn numeric_column(series: &Series, field: &Field, min: f64) -> Result<Series> {
    if all_null(series) {
        return Ok(Series::full_null(field.name, series.len(), &DataType::Float64));
    }
    if !series.dtype().is_numeric() {
        return Err(Error::schema(
            field.name,
            format!("expected numeric values, found {}", series.dtype()),
        ));
    }

    let cast = series.cast(&DataType::Float64)?;
    for (row, value) in cast.f64()?.into_iter().enumerate() {
        if let Some(v) = value {
            if !v.is_finite() || v < min {
                return Err(Error::schema(
                    field.name,
                    format!("row {row}: value {v} is outside the domain (>= {min})"),
                ));
            }
        }
    }
    Ok(cast)
}

fn categorical_column(series: &Series, field: &Field) -> Result<Series> {
    let out_of_domain = |row: usize, raw: &dyn std::fmt::Display| {
        Error::schema(
            field.name,
            format!("row {row}: category {raw} is outside the declared domain"),
        )
    };

    if all_null(series) {
        return Ok(Series::full_null(field.name, series.len(), &DataType::Utf8));
    }

    let labels: Vec<Option<&str>> = match series.dtype() {
        DataType::Utf8 => series
            .utf8()?
            .into_iter()
            .enumerate()
            .map(|(row, raw)| match raw {
                None => Ok(None),
                Some(raw) => field
                    .resolve_category(raw)
                    .map(Some)
                    .ok_or_else(|| out_of_domain(row, &format!("{raw:?}"))),
            })
            .collect::<Result<_>>()?,
        dtype if dtype.is_numeric() => {
            let cast = series.cast(&DataType::Int64)?;
            let codes = cast.i64()?;
            codes
                .into_iter()
                .enumerate()
                .map(|(row, code)| match code {
                    None => Ok(None),
                    Some(code) => field
                        .category_for_code(code)
                        .map(Some)
                        .ok_or_else(|| out_of_domain(row, &code)),
                })
                .collect::<Result<_>>()?
        }
        dtype => {
            return Err(Error::schema(
                field.name,
                format!("expected category labels or codes, found {dtype}"),
            ))
        }
    };
    Ok(Series::new(field.name, labels))
}

fn label_values(series: &Series, name: &str) -> Result<Vec<u8>> {
    if !series.dtype().is_numeric() {
        return Err(Error::schema(
            name,
            format!("expected 0/1 labels, found {}", series.dtype()),
        ));
    }
    let cast = series.cast(&DataType::Int64)?;
    let labels = cast.i64()?;
    labels
        .into_iter()
        .enumerate()
        .map(|(row, y)| match y {
            Some(0) => Ok(0),
            Some(1) => Ok(1),
            Some(other) => Err(Error::schema(name, format!("row {row}: label {other} is not 0 or 1"))),
            None => Err(Error::schema(name, format!("row {row}: label is missing"))),
        })
        .collect()
}
