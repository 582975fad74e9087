//! Column-wise imputation of missing values.
//!
//! Statistics are learned once from the training partition and reused
//! unchanged on every table transformed afterwards.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Fill {
    Mean(f64),
    Mode(String),
}

impl Fill {
    fn expr(&self, column: &str) -> Expr {
        match self {
            Fill::Mean(mean) => col(column).fill_null(lit(*mean)),
            Fill::Mode(mode) => col(column).fill_null(lit(mode.as_str())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFill {
    pub column: String,
    pub fill: Fill,
}

/// Per-column fill values, in the column order of the fitted frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImputationStatistics {
    fills: Vec<ColumnFill>,
}

impl ImputationStatistics {
    pub fn fill_for(&self, column: &str) -> Option<&Fill> {
        self.fills.iter().find(|f| f.column == column).map(|f| &f.fill)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fills.iter().map(|f| f.column.as_str())
    }
}

pub struct Imputer;

impl Imputer {
    /// Mean of observed values for numeric columns, most frequent value for
    /// text columns. Ties between categories go to the lexicographically
    /// smallest.
    pub fn fit(frame: &DataFrame) -> Result<ImputationStatistics> {
        let fills = frame
            .get_columns()
            .iter()
            .map(|series| {
                let name = series.name();
                let fill = match series.dtype() {
                    DataType::Utf8 => Fill::Mode(mode(series)?),
                    dtype if dtype.is_numeric() => Fill::Mean(
                        series
                            .mean()
                            .ok_or_else(|| Error::schema(name, "no observed values to compute a mean"))?,
                    ),
                    dtype => return Err(Error::schema(name, format!("cannot impute a {dtype} column"))),
                };
                debug!(column = name, fill = ?fill, "fitted imputation statistic");
                Ok(ColumnFill {
                    column: name.to_string(),
                    fill,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ImputationStatistics { fills })
    }

    /// Returns a copy of `frame` without missing values, columns in fitted
    /// order. The frame must carry exactly the fitted columns; a missing or
    /// undeclared column is a schema mismatch.
    pub fn transform(frame: &DataFrame, stats: &ImputationStatistics) -> Result<DataFrame> {
        for name in frame.get_column_names() {
            if stats.fill_for(name).is_none() {
                return Err(Error::schema(name, "column was not seen during fit"));
            }
        }

        let mut exprs = Vec::with_capacity(stats.fills.len());
        for ColumnFill { column: name, fill } in &stats.fills {
            let series = frame
                .column(name)
                .map_err(|_| Error::schema(name, "required column is missing"))?;
            match (series.dtype(), fill) {
                (DataType::Utf8, Fill::Mean(_)) => {
                    return Err(Error::schema(name, "categorical column was fitted as numeric"))
                }
                (dtype, Fill::Mode(_)) if dtype.is_numeric() => {
                    return Err(Error::schema(name, "numeric column was fitted as categorical"))
                }
                _ => exprs.push(fill.expr(name)),
            }
        }

        let imputed = frame.clone().lazy().with_columns(exprs).collect()?;
        Ok(imputed.select(stats.columns())?)
    }

    pub fn fit_transform(frame: &DataFrame) -> Result<(ImputationStatistics, DataFrame)> {
        let stats = Imputer::fit(frame)?;
        let imputed = Imputer::transform(frame, &stats)?;
        Ok((stats, imputed))
    }
}

fn mode(series: &Series) -> Result<String> {
    let name = series.name();
    if series.null_count() == series.len() {
        return Err(Error::schema(name, "no observed values to compute a mode"));
    }
    let counts = series.drop_nulls().value_counts(false, false)?;
    let columns = counts.get_columns();
    let values = columns[0].utf8()?;
    let hits = columns[1].cast(&DataType::UInt64)?;

    let mut best: Option<(&str, u64)> = None;
    for (value, n) in values.into_iter().zip(hits.u64()?.into_iter()) {
        let (Some(value), Some(n)) = (value, n) else {
            continue;
        };
        if best.map_or(true, |(b, m)| n > m || (n == m && value < b)) {
            best = Some((value, n));
        }
    }
    best.map(|(value, _)| value.to_string())
        .ok_or_else(|| Error::schema(name, "no observed values to compute a mode"))
}
