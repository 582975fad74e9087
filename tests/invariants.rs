use polars::df;
use polars::prelude::NamedFrom;
use proptest::prelude::*;

use stroke_risk::balance::Smote;
use stroke_risk::encode::Encoder;
use stroke_risk::impute::{Fill, Imputer};
use stroke_risk::table::class_counts;

const CATEGORIES: &[&str] = &["Child", "Private", "Self-Employed", "Government employed"];

proptest! {
    #[test]
    fn one_hot_block_has_k_minus_one_columns(codes in prop::collection::vec(0usize..4, 1..60)) {
        let values: Vec<Option<&str>> = codes.iter().map(|&c| Some(CATEGORIES[c])).collect();
        let frame = df!("work_type" => values).unwrap();
        let (model, encoded) = Encoder::fit_transform(&frame).unwrap();

        let mut distinct = codes.clone();
        distinct.sort();
        distinct.dedup();
        prop_assert_eq!(model.width(), distinct.len() - 1);

        for row in &encoded {
            prop_assert_eq!(row.len(), distinct.len() - 1);
            let ones = row.iter().filter(|&&v| v == 1.0).count();
            let zeros = row.iter().filter(|&&v| v == 0.0).count();
            prop_assert!(ones <= 1);
            prop_assert_eq!(ones + zeros, row.len());
        }
    }

    #[test]
    fn balancing_equalises_without_dropping_majority(
        majority in 5usize..40,
        minority in 2usize..5,
        seed in any::<u64>(),
    ) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..majority {
            x.push(vec![i as f64, 1.0]);
            y.push(0u8);
        }
        for i in 0..minority {
            x.push(vec![-(i as f64), 2.0]);
            y.push(1u8);
        }

        let (xb, yb) = Smote::new(5, seed).fit_resample(&x, &y).unwrap();
        prop_assert_eq!(class_counts(&yb), [majority, majority]);
        prop_assert_eq!(xb.len(), 2 * majority);
        prop_assert_eq!(&xb[..x.len()], &x[..]);
    }
}

#[test]
fn imputed_mean_is_exact() {
    let frame = df!("bmi" => [Some(1.0), Some(3.0), None, Some(5.0)]).unwrap();
    let (stats, imputed) = Imputer::fit_transform(&frame).unwrap();
    assert_eq!(stats.fill_for("bmi"), Some(&Fill::Mean(3.0)));
    let bmi: Vec<Option<f64>> = imputed.column("bmi").unwrap().f64().unwrap().into_iter().collect();
    assert_eq!(bmi, vec![Some(1.0), Some(3.0), Some(3.0), Some(5.0)]);
}
