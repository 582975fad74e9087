//! Static declaration of the stroke dataset's fields.
//!
//! Field order here is the order of the encoded feature vector: numeric
//! fields first, then one one-hot block per categorical field.

use lazy_static::lazy_static;

pub const LABEL_COLUMN: &str = "stroke";

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Continuous value, passed through unchanged.
    Numeric { min: f64 },
    /// Closed label domain. Integer code `i` maps to `categories[i]`.
    Categorical { categories: &'static [&'static str] },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl Field {
    const fn numeric(name: &'static str) -> Self {
        Field {
            name,
            kind: FieldKind::Numeric { min: 0.0 },
        }
    }

    const fn categorical(name: &'static str, categories: &'static [&'static str]) -> Self {
        Field {
            name,
            kind: FieldKind::Categorical { categories },
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self.kind, FieldKind::Numeric { .. })
    }

    /// Resolve a raw categorical value, given either as a label or as an
    /// integer code, to its canonical label. `None` for numeric fields and
    /// for values outside the domain.
    pub fn resolve_category(&self, raw: &str) -> Option<&'static str> {
        let FieldKind::Categorical { categories } = self.kind else {
            return None;
        };
        let raw = raw.trim();
        if let Some(label) = categories.iter().copied().find(|label| *label == raw) {
            return Some(label);
        }
        raw.parse::<usize>()
            .ok()
            .and_then(|code| categories.get(code).copied())
    }

    pub fn category_for_code(&self, code: i64) -> Option<&'static str> {
        match self.kind {
            FieldKind::Categorical { categories } => usize::try_from(code)
                .ok()
                .and_then(|code| categories.get(code).copied()),
            FieldKind::Numeric { .. } => None,
        }
    }
}

pub const GENDER: &[&str] = &["Male", "Female"];
pub const YES_NO: &[&str] = &["No", "Yes"];
pub const WORK_TYPE: &[&str] = &[
    "Child",
    "Never worked",
    "Self-Employed",
    "Private",
    "Government employed",
];
pub const RESIDENCE_TYPE: &[&str] = &["Urban", "Rural"];
pub const SMOKING_STATUS: &[&str] = &["Never Smokes", "Formerly Smokes", "Smokes", "Unknown"];

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    fields: Vec<Field>,
    label: &'static str,
}

impl FeatureSchema {
    pub fn new(fields: Vec<Field>, label: &'static str) -> Self {
        FeatureSchema { fields, label }
    }

    pub fn stroke() -> Self {
        FeatureSchema::new(
            vec![
                Field::numeric("age"),
                Field::numeric("avg_glucose_level"),
                Field::numeric("bmi"),
                Field::categorical("gender", GENDER),
                Field::categorical("work_type", WORK_TYPE),
                Field::categorical("Residence_type", RESIDENCE_TYPE),
                Field::categorical("smoking_status", SMOKING_STATUS),
                Field::categorical("hypertension", YES_NO),
                Field::categorical("heart_disease", YES_NO),
            ],
            LABEL_COLUMN,
        )
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn numeric_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.is_numeric())
    }

    pub fn categorical_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.is_numeric())
    }
}

lazy_static! {
    pub static ref STROKE_SCHEMA: FeatureSchema = FeatureSchema::stroke();
}
