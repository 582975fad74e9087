//! Synthetic minority oversampling for the training partition.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smartcore::algorithm::neighbour::linear_search::LinearKNNSearch;
use smartcore::metrics::distance::euclidian::Euclidian;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::table::class_counts;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smote {
    pub k_neighbors: usize,
    pub seed: u64,
}

impl Default for Smote {
    fn default() -> Self {
        Smote {
            k_neighbors: 5,
            seed: 42,
        }
    }
}

impl Smote {
    pub fn new(k_neighbors: usize, seed: u64) -> Self {
        Smote { k_neighbors, seed }
    }

    /// Appends interpolated minority rows until both classes are the same
    /// size. Input rows are returned first and unchanged.
    pub fn fit_resample(&self, x: &[Vec<f64>], y: &[u8]) -> Result<(Vec<Vec<f64>>, Vec<u8>)> {
        let counts = class_counts(y);
        let (minority_class, majority_class) = if counts[1] <= counts[0] { (1u8, 0u8) } else { (0, 1) };
        let n_minority = counts[usize::from(minority_class)];
        let n_majority = counts[usize::from(majority_class)];

        if n_minority < 2 {
            return Err(Error::InsufficientSamples {
                minority: n_minority,
                required: 2,
            });
        }

        let mut x_out = x.to_vec();
        let mut y_out = y.to_vec();
        let n_synthetic = n_majority - n_minority;
        if n_synthetic == 0 {
            return Ok((x_out, y_out));
        }

        let k = if self.k_neighbors >= n_minority {
            warn!(
                requested = self.k_neighbors,
                minority = n_minority,
                "reducing neighbour count to fit the minority class"
            );
            n_minority - 1
        } else {
            self.k_neighbors
        };
        if k == 0 {
            return Err(Error::InsufficientSamples {
                minority: n_minority,
                required: 2,
            });
        }

        let minority: Vec<Vec<f64>> = x
            .iter()
            .zip(y)
            .filter(|(_, label)| **label == minority_class)
            .map(|(row, _)| row.clone())
            .collect();
        let neighbors = nearest_neighbors(&minority, k)?;

        let mut rng = StdRng::seed_from_u64(self.seed);
        x_out.reserve(n_synthetic);
        y_out.reserve(n_synthetic);
        for _ in 0..n_synthetic {
            let sample = rng.random_range(0..minority.len());
            let neighbor = neighbors[sample][rng.random_range(0..k)];
            let gap: f64 = rng.random();
            let base = &minority[sample];
            let other = &minority[neighbor];
            x_out.push(
                base.iter()
                    .zip(other)
                    .map(|(a, b)| a + gap * (b - a))
                    .collect(),
            );
            y_out.push(minority_class);
        }

        info!(
            before = x.len(),
            after = x_out.len(),
            synthetic = n_synthetic,
            neighbors = k,
            "balanced training partition"
        );
        Ok((x_out, y_out))
    }
}

/// For each row, the indices of its `k` closest other rows by Euclidean
/// distance. Ties keep the lower index first.
fn nearest_neighbors(rows: &[Vec<f64>], k: usize) -> Result<Vec<Vec<usize>>> {
    let search = LinearKNNSearch::new(rows.to_vec(), Euclidian::<f64>::new())?;
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            // k + 1 so the row's own zero-distance match can be dropped
            let mut found: Vec<(usize, f64)> = search
                .find(row, k + 1)?
                .into_iter()
                .filter(|&(j, _, _)| j != i)
                .map(|(j, distance, _)| (j, distance))
                .collect();
            found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
            found.truncate(k);
            Ok(found.into_iter().map(|(j, _)| j).collect())
        })
        .collect()
}
