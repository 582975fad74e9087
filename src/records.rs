use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// One patient as submitted for scoring. Any field may be missing.
///
/// Categorical values are kept as text: the serving path accepts labels that
/// were never seen during training and encodes them as the reference category.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrokeRecord {
    pub age: Option<f64>,
    pub avg_glucose_level: Option<f64>,
    pub bmi: Option<f64>,
    pub gender: Option<String>,
    pub hypertension: Option<String>,
    pub heart_disease: Option<String>,
    pub work_type: Option<String>,
    #[serde(rename = "Residence_type")]
    pub residence_type: Option<String>,
    pub smoking_status: Option<String>,
}

pub type RawRecord = StrokeRecord;

impl StrokeRecord {
    /// Parses one record from a JSON object.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn numeric(&self, column: &str) -> Result<Option<f64>> {
        match column {
            "age" => Ok(self.age),
            "avg_glucose_level" => Ok(self.avg_glucose_level),
            "bmi" => Ok(self.bmi),
            _ => Err(Error::schema(column, "not a numeric field of the record")),
        }
    }

    pub fn category(&self, column: &str) -> Result<Option<&str>> {
        let value = match column {
            "gender" => &self.gender,
            "hypertension" => &self.hypertension,
            "heart_disease" => &self.heart_disease,
            "work_type" => &self.work_type,
            "Residence_type" => &self.residence_type,
            "smoking_status" => &self.smoking_status,
            _ => return Err(Error::schema(column, "not a categorical field of the record")),
        };
        Ok(value.as_deref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    High,
    Low,
}

impl Verdict {
    /// `High` iff `probability >= threshold`.
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            Verdict::High
        } else {
            Verdict::Low
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::High => write!(f, "High Stroke Risk"),
            Verdict::Low => write!(f, "Low Stroke Risk"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub probability: f64,
    pub verdict: Verdict,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_inclusive() {
        assert_eq!(Verdict::from_probability(0.3, 0.3), Verdict::High);
        assert_eq!(Verdict::from_probability(0.299_999, 0.3), Verdict::Low);
        assert_eq!(Verdict::from_probability(1.0, 0.3), Verdict::High);
    }

    #[test]
    fn record_parses_with_missing_fields() {
        let record: StrokeRecord = serde_json::from_str(
            r#"{"age": 67, "Residence_type": "Urban", "smoking_status": "Formerly Smokes"}"#,
        )
        .unwrap();
        assert_eq!(record.age, Some(67.0));
        assert_eq!(record.bmi, None);
        assert_eq!(record.category("Residence_type").unwrap(), Some("Urban"));
        assert_eq!(record.category("gender").unwrap(), None);
    }

    #[test]
    fn record_rejects_unknown_fields() {
        let parsed = StrokeRecord::from_json(r#"{"age": 50, "stroke": 1}"#);
        assert!(matches!(parsed, Err(Error::Json(_))));
    }

    #[test]
    fn malformed_record_is_a_json_error() {
        let err = StrokeRecord::from_json(r#"{"age": "#).unwrap_err();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().starts_with("invalid JSON"));
    }

    #[test]
    fn unknown_accessor_is_a_schema_mismatch() {
        let record = StrokeRecord::default();
        assert!(matches!(
            record.numeric("ever_married"),
            Err(Error::SchemaMismatch { .. })
        ));
        assert!(record.category("age").is_err());
    }

    #[test]
    fn prediction_serializes_lowercase_verdict() {
        let json = serde_json::to_string(&Prediction {
            probability: 0.5,
            verdict: Verdict::High,
        })
        .unwrap();
        assert_eq!(json, r#"{"probability":0.5,"verdict":"high"}"#);
    }
}
