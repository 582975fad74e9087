//! Fixed-width numeric encoding of an imputed frame.
//!
//! Numeric columns pass through. Each categorical column becomes a one-hot
//! block over its observed categories, sorted, with the first category
//! dropped as the reference. Values outside the fitted categories encode
//! like the reference: an all-zero block.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBlock {
    pub column: String,
    /// Sorted categories seen at fit time; `categories[0]` is the reference.
    pub categories: Vec<String>,
}

impl CategoryBlock {
    pub fn width(&self) -> usize {
        self.categories.len().saturating_sub(1)
    }

    pub fn reference(&self) -> Option<&str> {
        self.categories.first().map(String::as_str)
    }

    fn encode_into(&self, value: Option<&str>, out: &mut Vec<f64>) {
        let start = out.len();
        out.resize(start + self.width(), 0.0);
        let position = value.and_then(|v| self.categories.iter().position(|c| c == v));
        if let Some(index) = position.filter(|&i| i > 0) {
            out[start + index - 1] = 1.0;
        }
    }
}

/// Fitted encoding: the frozen feature layout shared by training and serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingModel {
    numeric: Vec<String>,
    blocks: Vec<CategoryBlock>,
    feature_names: Vec<String>,
}

impl EncodingModel {
    pub fn width(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn numeric_columns(&self) -> &[String] {
        &self.numeric
    }

    pub fn blocks(&self) -> &[CategoryBlock] {
        &self.blocks
    }

    /// Offset and width of a categorical column's block in the feature vector.
    pub fn block_range(&self, column: &str) -> Option<std::ops::Range<usize>> {
        let mut start = self.numeric.len();
        for block in &self.blocks {
            if block.column == column {
                return Some(start..start + block.width());
            }
            start += block.width();
        }
        None
    }

    fn expects(&self, column: &str) -> bool {
        self.numeric.iter().any(|c| c == column) || self.blocks.iter().any(|b| b.column == column)
    }
}

pub struct Encoder;

impl Encoder {
    /// `Float64`-castable columns pass through, `Utf8` columns become blocks.
    pub fn fit(frame: &DataFrame) -> Result<EncodingModel> {
        let mut numeric = Vec::new();
        let mut blocks = Vec::new();

        for series in frame.get_columns() {
            match series.dtype() {
                DataType::Utf8 => {
                    let unique = series.unique()?;
                    let mut categories: Vec<String> = unique
                        .utf8()?
                        .into_iter()
                        .flatten()
                        .map(str::to_string)
                        .collect();
                    categories.sort();
                    blocks.push(CategoryBlock {
                        column: series.name().to_string(),
                        categories,
                    });
                }
                dtype if dtype.is_numeric() => numeric.push(series.name().to_string()),
                dtype => {
                    return Err(Error::schema(
                        series.name(),
                        format!("cannot encode a {dtype} column"),
                    ))
                }
            }
        }

        let mut feature_names = numeric.clone();
        for block in &blocks {
            feature_names.extend(
                block
                    .categories
                    .iter()
                    .skip(1)
                    .map(|c| format!("{}_{}", block.column, c)),
            );
        }

        debug!(width = feature_names.len(), features = ?feature_names, "fitted encoder");
        Ok(EncodingModel {
            numeric,
            blocks,
            feature_names,
        })
    }

    /// One feature vector per row, laid out as `model.feature_names()`.
    pub fn transform(frame: &DataFrame, model: &EncodingModel) -> Result<Vec<Vec<f64>>> {
        for name in frame.get_column_names() {
            if !model.expects(name) {
                return Err(Error::schema(name, "column was not seen during fit"));
            }
        }

        let mut rows: Vec<Vec<f64>> = (0..frame.height())
            .map(|_| Vec::with_capacity(model.width()))
            .collect();

        for name in &model.numeric {
            let series = frame
                .column(name)
                .map_err(|_| Error::schema(name, "required column is missing"))?;
            if !series.dtype().is_numeric() {
                return Err(Error::schema(name, "expected numeric values, found categories"));
            }
            let values = series.cast(&DataType::Float64)?;
            for (row, (value, out)) in values.f64()?.into_iter().zip(rows.iter_mut()).enumerate() {
                let value = value.ok_or_else(|| {
                    Error::schema(name, format!("row {row}: missing value reached the encoder"))
                })?;
                out.push(value);
            }
        }

        for block in &model.blocks {
            let series = frame
                .column(&block.column)
                .map_err(|_| Error::schema(&block.column, "required column is missing"))?;
            if series.dtype() != &DataType::Utf8 {
                return Err(Error::schema(
                    &block.column,
                    "expected categories, found numeric values",
                ));
            }
            for (value, out) in series.utf8()?.into_iter().zip(rows.iter_mut()) {
                block.encode_into(value, out);
            }
        }

        Ok(rows)
    }

    pub fn fit_transform(frame: &DataFrame) -> Result<(EncodingModel, Vec<Vec<f64>>)> {
        let model = Encoder::fit(frame)?;
        let encoded = Encoder::transform(frame, &model)?;
        Ok((model, encoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::row_index;

    fn training() -> DataFrame {
        df!(
            "age" => &[67.0, 5.0, 40.0],
            "work_type" => &["Private", "Child", "Self-Employed"],
            "Residence_type" => &["Urban", "Rural", "Urban"],
        )
        .unwrap()
    }

    #[test]
    fn layout_is_numeric_then_drop_first_blocks() {
        let model = Encoder::fit(&training()).unwrap();
        assert_eq!(
            model.feature_names(),
            [
                "age",
                "work_type_Private",
                "work_type_Self-Employed",
                "Residence_type_Urban"
            ]
        );
        assert_eq!(model.block_range("work_type"), Some(1..3));
        assert_eq!(model.block_range("Residence_type"), Some(3..4));
        assert_eq!(model.blocks()[0].reference(), Some("Child"));
    }

    #[test]
    fn rows_encode_with_reference_as_zeros() {
        let (_, encoded) = Encoder::fit_transform(&training()).unwrap();
        assert_eq!(
            encoded,
            vec![
                vec![67.0, 1.0, 0.0, 1.0],
                vec![5.0, 0.0, 0.0, 0.0],
                vec![40.0, 0.0, 1.0, 1.0],
            ]
        );
    }

    #[test]
    fn unseen_category_encodes_as_reference() {
        let model = Encoder::fit(&training()).unwrap();
        let serving = df!(
            "age" => &[30.0],
            "work_type" => &["Never worked"],
            "Residence_type" => &["Rural"],
        )
        .unwrap();
        let encoded = Encoder::transform(&serving, &model).unwrap();
        assert_eq!(encoded, vec![vec![30.0, 0.0, 0.0, 0.0]]);
    }

    #[test]
    fn layout_does_not_depend_on_row_order() {
        let frame = training();
        let reversed = frame.take(&row_index(&[2, 1, 0])).unwrap();
        let a = Encoder::fit(&frame).unwrap();
        let b = Encoder::fit(&reversed).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_numeric_value_is_rejected() {
        let model = Encoder::fit(&training()).unwrap();
        let serving = df!(
            "age" => &[None::<f64>],
            "work_type" => &["Private"],
            "Residence_type" => &["Rural"],
        )
        .unwrap();
        assert!(matches!(
            Encoder::transform(&serving, &model),
            Err(Error::SchemaMismatch { ref column, .. }) if column == "age"
        ));
    }

    #[test]
    fn single_category_contributes_no_width() {
        let frame = df!("gender" => &["Female", "Female"]).unwrap();
        let (model, encoded) = Encoder::fit_transform(&frame).unwrap();
        assert_eq!(model.width(), 0);
        assert_eq!(encoded, vec![Vec::<f64>::new(), Vec::new()]);
    }
}
