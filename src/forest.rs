//! Random forest of CART trees for binary classification.
//!
//! Every tree is grown on a bootstrap sample of the rows and draws a random
//! subset of features at each split. A leaf stores the fraction of positive
//! rows that reached it; the forest probability is the mean over trees.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    /// floor(sqrt(n_features)), at least one.
    Sqrt,
    All,
    Fixed(usize),
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Fixed(n) => n,
        };
        n.clamp(1, n_features.max(1))
    }
}

/// Tree-growing knobs. The forest seed is not one of them; it is passed to
/// [`RandomForest::fit`] so one training seed drives every random source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_trees: 100,
            max_depth: Some(10),
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        positive: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Positive-class fraction of the leaf `row` falls into.
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { positive } => return *positive,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct Split {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

fn gini(positive: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positive as f64 / n as f64;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [u8],
    params: &'a ForestParams,
    n_features: usize,
    mtry: usize,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn leaf(&mut self, positive: f64) -> usize {
        self.nodes.push(Node::Leaf { positive });
        self.nodes.len() - 1
    }

    fn build(&mut self, rows: &mut [usize], depth: usize, rng: &mut StdRng) -> usize {
        let n = rows.len();
        let positive = rows.iter().filter(|&&r| self.y[r] == 1).count();
        let fraction = positive as f64 / n as f64;

        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if depth_reached || n < self.params.min_samples_split || positive == 0 || positive == n {
            return self.leaf(fraction);
        }

        let Some(split) = self.best_split(rows, positive, rng) else {
            return self.leaf(fraction);
        };

        let mut mid = 0;
        for i in 0..rows.len() {
            if self.x[rows[i]][split.feature] <= split.threshold {
                rows.swap(i, mid);
                mid += 1;
            }
        }

        let index = self.leaf(fraction);
        let (left_rows, right_rows) = rows.split_at_mut(mid);
        let left = self.build(left_rows, depth + 1, rng);
        let right = self.build(right_rows, depth + 1, rng);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    /// Examines `mtry` random features, and keeps drawing past that while no
    /// feature has produced a usable split.
    fn best_split(&self, rows: &[usize], positive: usize, rng: &mut StdRng) -> Option<Split> {
        let mut features: Vec<usize> = (0..self.n_features).collect();
        features.shuffle(rng);

        let parent = gini(positive, rows.len());
        let mut best: Option<Split> = None;
        for (visited, &feature) in features.iter().enumerate() {
            if visited >= self.mtry && best.is_some() {
                break;
            }
            if let Some(candidate) = self.best_threshold(rows, feature, positive) {
                if best.as_ref().map_or(true, |b| candidate.impurity < b.impurity) {
                    best = Some(candidate);
                }
            }
        }
        best.filter(|s| s.impurity < parent - 1e-12)
    }

    fn best_threshold(&self, rows: &[usize], feature: usize, positive: usize) -> Option<Split> {
        let mut pairs: Vec<(f64, u8)> = rows.iter().map(|&r| (self.x[r][feature], self.y[r])).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = pairs.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let mut left_positive = 0;
        let mut best: Option<Split> = None;

        for i in 0..n - 1 {
            left_positive += usize::from(pairs[i].1);
            let (low, high) = (pairs[i].0, pairs[i + 1].0);
            if low == high {
                continue;
            }
            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < min_leaf || n_right < min_leaf {
                continue;
            }
            let impurity = (n_left as f64 * gini(left_positive, n_left)
                + n_right as f64 * gini(positive - left_positive, n_right))
                / n as f64;
            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                let mid = low + (high - low) / 2.0;
                best = Some(Split {
                    feature,
                    threshold: if mid < high { mid } else { low },
                    impurity,
                });
            }
        }
        best
    }
}

fn grow_tree(x: &[Vec<f64>], y: &[u8], params: &ForestParams, n_features: usize, seed: u64) -> DecisionTree {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = x.len();
    let mut rows: Vec<usize> = if params.bootstrap {
        (0..n).map(|_| rng.random_range(0..n)).collect()
    } else {
        (0..n).collect()
    };

    let mut builder = TreeBuilder {
        x,
        y,
        params,
        n_features,
        mtry: params.max_features.resolve(n_features),
        nodes: Vec::new(),
    };
    builder.build(&mut rows, 0, &mut rng);
    DecisionTree {
        nodes: builder.nodes,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    seed: u64,
    n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: &ForestParams, seed: u64) -> Result<RandomForest> {
        if x.is_empty() {
            return Err(Error::InsufficientSamples {
                minority: 0,
                required: 1,
            });
        }
        if x.len() != y.len() {
            return Err(Error::schema(
                crate::schema::LABEL_COLUMN,
                format!("{} labels for {} rows", y.len(), x.len()),
            ));
        }
        let n_features = x[0].len();
        if let Some(bad) = x.iter().find(|row| row.len() != n_features) {
            return Err(Error::FeatureWidth {
                expected: n_features,
                found: bad.len(),
            });
        }

        // Seeds are drawn up front so the forest does not depend on how rayon
        // schedules the trees.
        let mut rng = StdRng::seed_from_u64(seed);
        let seeds: Vec<u64> = (0..params.n_trees).map(|_| rng.random()).collect();

        let trees: Vec<DecisionTree> = seeds
            .par_iter()
            .map(|&seed| grow_tree(x, y, params, n_features, seed))
            .collect();

        let nodes: usize = trees.iter().map(DecisionTree::n_nodes).sum();
        info!(
            trees = trees.len(),
            rows = x.len(),
            features = n_features,
            nodes,
            "fitted random forest"
        );
        debug!(max_depth = trees.iter().map(DecisionTree::depth).max().unwrap_or(0), "tree depth");

        Ok(RandomForest {
            params: params.clone(),
            seed,
            n_features,
            trees,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean positive-class fraction over all trees, in `[0, 1]`.
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        if row.len() != self.n_features {
            return Err(Error::FeatureWidth {
                expected: self.n_features,
                found: row.len(),
            });
        }
        if self.trees.is_empty() {
            return Ok(0.0);
        }
        let total: f64 = self.trees.iter().map(|t| t.predict_proba(row)).sum();
        Ok(total / self.trees.len() as f64)
    }

    pub fn predict_proba_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.par_iter().map(|row| self.predict_proba(row)).collect()
    }

    /// Class labels at the 0.5 cut.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<u8>> {
        Ok(self
            .predict_proba_batch(rows)?
            .into_iter()
            .map(|p| u8::from(p >= 0.5))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: u64 = 42;

    fn separable() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut x = Vec::new();
        let mut y = Vec::new();
        for i in 0..40 {
            let v = i as f64;
            x.push(vec![v, (i % 3) as f64]);
            y.push(u8::from(v >= 20.0));
        }
        (x, y)
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_trees: 15,
            ..ForestParams::default()
        }
    }

    #[test]
    fn learns_a_threshold() {
        let (x, y) = separable();
        let forest = RandomForest::fit(&x, &y, &small_params(), SEED).unwrap();
        assert!(forest.predict_proba(&[2.0, 0.0]).unwrap() < 0.3);
        assert!(forest.predict_proba(&[37.0, 1.0]).unwrap() > 0.7);
        let wrong = forest
            .predict(&x)
            .unwrap()
            .iter()
            .zip(&y)
            .filter(|(p, t)| p != t)
            .count();
        assert!(wrong <= 2, "{wrong} training rows misclassified");
    }

    #[test]
    fn probabilities_stay_in_unit_interval() {
        let (x, y) = separable();
        let forest = RandomForest::fit(&x, &y, &small_params(), SEED).unwrap();
        for p in forest.predict_proba_batch(&x).unwrap() {
            assert!((0.0..=1.0).contains(&p));
        }
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = separable();
        let a = RandomForest::fit(&x, &y, &small_params(), SEED).unwrap();
        let b = RandomForest::fit(&x, &y, &small_params(), SEED).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_seeds_grow_different_forests() {
        let (x, y) = separable();
        let a = RandomForest::fit(&x, &y, &small_params(), 1).unwrap();
        let b = RandomForest::fit(&x, &y, &small_params(), 2).unwrap();
        assert_eq!(a.seed(), 1);
        assert_ne!(a.trees(), b.trees());
    }

    #[test]
    fn depth_limit_is_respected() {
        let x: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64]).collect();
        let y: Vec<u8> = (0..64).map(|i| (i % 2) as u8).collect();
        let params = ForestParams {
            n_trees: 3,
            max_depth: Some(2),
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&x, &y, &params, SEED).unwrap();
        assert!(forest.trees().iter().all(|t| t.depth() <= 2));
    }

    #[test]
    fn pure_labels_give_a_single_leaf() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0]];
        let forest = RandomForest::fit(&x, &[1, 1, 1], &small_params(), SEED).unwrap();
        assert!(forest.trees().iter().all(|t| t.n_nodes() == 1));
        assert_eq!(forest.predict_proba(&[9.0]).unwrap(), 1.0);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let (x, y) = separable();
        let forest = RandomForest::fit(&x, &y, &small_params(), SEED).unwrap();
        assert!(matches!(
            forest.predict_proba(&[1.0]),
            Err(Error::FeatureWidth { expected: 2, found: 1 })
        ));
    }

    #[test]
    fn ragged_training_rows_are_rejected() {
        let x = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            RandomForest::fit(&x, &[0, 1], &small_params(), SEED),
            Err(Error::FeatureWidth { .. })
        ));
    }

    #[test]
    fn max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(17), 4);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::All.resolve(5), 5);
        assert_eq!(MaxFeatures::Fixed(10).resolve(5), 5);
        assert_eq!(MaxFeatures::Fixed(0).resolve(5), 1);
    }

    #[test]
    fn thresholds_split_between_distinct_values() {
        let x = vec![vec![1.0], vec![1.0], vec![3.0], vec![3.0]];
        let y = vec![0, 0, 1, 1];
        let params = ForestParams {
            n_trees: 1,
            bootstrap: false,
            ..ForestParams::default()
        };
        let forest = RandomForest::fit(&x, &y, &params, SEED).unwrap();
        assert_eq!(forest.trees()[0].nodes[0], Node::Split { feature: 0, threshold: 2.0, left: 1, right: 2 });
    }
}
