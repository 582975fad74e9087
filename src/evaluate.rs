//! Held-out evaluation of a fitted classifier.

use serde::Serialize;
use smartcore::metrics::{accuracy, roc_auc_score};
use std::fmt;
use tracing::warn;

use crate::table::class_counts;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassReport {
    pub label: u8,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub accuracy: f64,
    /// `None` when the held-out rows carry a single class.
    pub roc_auc: Option<f64>,
    pub classes: Vec<ClassReport>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn class_report(label: u8, y_true: &[u8], y_pred: &[u8]) -> ClassReport {
    let mut tp = 0;
    let mut fp = 0;
    let mut fn_ = 0;
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t == label, p == label) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    ClassReport {
        label,
        precision,
        recall,
        f1,
        support: tp + fn_,
    }
}

/// Scores `probabilities` against `y_true`. Class predictions are taken at
/// the 0.5 cut, as the classifier's own `predict` does.
pub fn evaluate(y_true: &[u8], probabilities: &[f64]) -> EvaluationReport {
    let y_pred: Vec<u8> = probabilities.iter().map(|&p| u8::from(p >= 0.5)).collect();

    let truth: Vec<i32> = y_true.iter().map(|&y| i32::from(y)).collect();
    let predicted: Vec<i32> = y_pred.iter().map(|&y| i32::from(y)).collect();

    EvaluationReport {
        accuracy: accuracy(&truth, &predicted),
        roc_auc: ranking_auc(y_true, probabilities),
        classes: vec![
            class_report(0, y_true, &y_pred),
            class_report(1, y_true, &y_pred),
        ],
    }
}

fn ranking_auc(y_true: &[u8], probabilities: &[f64]) -> Option<f64> {
    let [negative, positive] = class_counts(y_true);
    if negative == 0 || positive == 0 {
        warn!(negative, positive, "held-out rows contain a single class, ROC-AUC is undefined");
        return None;
    }

    // roc_auc_score only averages ranks over ties that sit next to each other
    // in its input, so the scores go in sorted.
    let mut pairs: Vec<(f64, f64)> = probabilities
        .iter()
        .zip(y_true)
        .map(|(&p, &y)| (p, f64::from(y)))
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (scores, truth): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
    Some(roc_auc_score(&truth, &scores))
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Accuracy: {:.4}", self.accuracy)?;
        match self.roc_auc {
            Some(auc) => writeln!(f, "ROC-AUC: {auc:.4}")?,
            None => writeln!(f, "ROC-AUC: unavailable (single class in held-out rows)")?,
        }
        writeln!(f, "Classification Report:")?;
        writeln!(f, "{:>8} {:>10} {:>10} {:>10} {:>10}", "", "precision", "recall", "f1-score", "support")?;
        for class in &self.classes {
            writeln!(
                f,
                "{:>8} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                class.label, class.precision, class.recall, class.f1, class.support
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_ranking() {
        let report = evaluate(&[0, 0, 1, 1], &[0.1, 0.2, 0.8, 0.9]);
        assert_eq!(report.accuracy, 1.0);
        assert!((report.roc_auc.unwrap() - 1.0).abs() < 1e-12);
        assert!(report.classes.iter().all(|c| c.precision == 1.0 && c.recall == 1.0));
    }

    #[test]
    fn tied_scores_share_their_rank() {
        let report = evaluate(&[0, 1, 0, 1], &[0.5, 0.9, 0.2, 0.5]);
        assert!((report.roc_auc.unwrap() - 0.875).abs() < 1e-12);

        let all_tied = evaluate(&[1, 0, 1, 0], &[0.4; 4]);
        assert!((all_tied.roc_auc.unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn single_class_has_no_auc() {
        let report = evaluate(&[0, 0, 0], &[0.1, 0.2, 0.7]);
        assert_eq!(report.roc_auc, None);
        assert!((report.accuracy - 2.0 / 3.0).abs() < 1e-12);
        assert!(report.to_string().contains("ROC-AUC: unavailable"));
    }

    #[test]
    fn per_class_counts() {
        // predictions: 0, 1, 1, 1
        let report = evaluate(&[0, 0, 1, 1], &[0.1, 0.6, 0.7, 0.9]);
        assert_eq!(report.accuracy, 0.75);
        let negative = &report.classes[0];
        assert_eq!(negative.support, 2);
        assert_eq!(negative.precision, 1.0);
        assert_eq!(negative.recall, 0.5);
        let positive = &report.classes[1];
        assert!((positive.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(positive.recall, 1.0);
        assert!((positive.f1 - 0.8).abs() < 1e-12);
    }

    #[test]
    fn report_renders_both_classes() {
        let text = evaluate(&[0, 1], &[0.2, 0.7]).to_string();
        assert!(text.contains("Accuracy: 1.0000"));
        assert!(text.contains("precision"));
        assert_eq!(text.lines().count(), 6);
    }
}
