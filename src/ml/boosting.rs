use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{
    check_binary_labels, check_prediction_input, check_training_data, ensure_finite, sigmoid, Estimator,
    ProbabilisticClassifier,
};
use super::tree::{Criterion, DecisionTree};
use crate::error::{PipelineError, Result};

/// Gradient boosted regression trees.
///
/// Regression minimises squared error starting from the target mean.
/// Classification minimises binary log loss on the logit scale; each new
/// tree is fitted to the residuals `y - p` and its leaves are replaced by a
/// single Newton step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub random_state: u64,
    is_classification: bool,
    init: f64,
    trees: Vec<DecisionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl GradientBoosting {
    pub fn new_regressor(n_estimators: usize, learning_rate: f64) -> Self {
        Self::new(n_estimators, learning_rate, false)
    }

    pub fn new_classifier(n_estimators: usize, learning_rate: f64) -> Self {
        Self::new(n_estimators, learning_rate, true)
    }

    fn new(n_estimators: usize, learning_rate: f64, is_classification: bool) -> Self {
        Self {
            n_estimators,
            learning_rate,
            max_depth: 3,
            random_state: 42,
            is_classification,
            init: 0.0,
            trees: Vec::new(),
            n_features: 0,
            feature_importances: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Raw additive score: target scale for regression, logit for classification.
    fn raw_score(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut score = Array1::from_elem(x.nrows(), self.init);
        for tree in &self.trees {
            score.scaled_add(self.learning_rate, &tree.predict(x));
        }
        score
    }

    fn newton_leaves(tree: &mut DecisionTree, x: &Array2<f64>, residual: &Array1<f64>, proba: &Array1<f64>) {
        use std::collections::BTreeMap;

        let mut sums: BTreeMap<usize, (f64, f64)> = BTreeMap::new();
        for (i, row) in x.rows().into_iter().enumerate() {
            let entry = sums.entry(tree.apply(row)).or_insert((0.0, 0.0));
            entry.0 += residual[i];
            entry.1 += proba[i] * (1.0 - proba[i]);
        }
        for (leaf, (numerator, denominator)) in sums {
            let value = if denominator.abs() < 1e-150 { 0.0 } else { numerator / denominator };
            tree.set_leaf_value(leaf, value);
        }
    }
}

impl Estimator for GradientBoosting {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let name = "gradient_boosting";
        check_training_data(name, x, y)?;
        if self.is_classification {
            check_binary_labels(name, y)?;
        }
        if self.learning_rate <= 0.0 || self.n_estimators == 0 {
            return Err(PipelineError::model_fit(name, "learning_rate and n_estimators must be positive"));
        }

        let n = x.nrows();
        let rows: Vec<usize> = (0..n).collect();
        let mean = y.sum() / n as f64;
        self.init = if self.is_classification { (mean / (1.0 - mean)).ln() } else { mean };

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut score = Array1::from_elem(n, self.init);
        let mut trees = Vec::with_capacity(self.n_estimators);

        for stage in 0..self.n_estimators {
            let proba = if self.is_classification { Some(score.mapv(sigmoid)) } else { None };
            let residual = match &proba {
                Some(p) => y - p,
                None => y - &score,
            };

            let mut tree = DecisionTree::new(Criterion::Mse).with_max_depth(self.max_depth);
            tree.fit_rows(x, &residual, &rows, &mut rng);
            if let Some(p) = &proba {
                Self::newton_leaves(&mut tree, x, &residual, p);
            }

            score.scaled_add(self.learning_rate, &tree.predict(x));
            trees.push(tree);

            if (stage + 1) % 25 == 0 {
                let loss = if self.is_classification {
                    log_loss(y, &score)
                } else {
                    (y - &score).mapv(|r| r * r).mean().unwrap_or(0.0)
                };
                debug!("gradient_boosting stage {}: training loss {:.5}", stage + 1, loss);
            }
        }
        ensure_finite(name, score.iter())?;

        let mut importances = vec![0.0; x.ncols()];
        for tree in trees.iter().filter(|t| t.has_splits()) {
            for (total, v) in importances.iter_mut().zip(tree.importances()) {
                *total += v;
            }
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            importances.iter_mut().for_each(|v| *v /= sum);
        }

        self.trees = trees;
        self.n_features = x.ncols();
        self.feature_importances = importances;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_input("gradient_boosting", x, self.n_features)?;
        let score = self.raw_score(x);
        if self.is_classification {
            Ok(score.mapv(|s| if s > 0.0 { 1.0 } else { 0.0 }))
        } else {
            Ok(score)
        }
    }

    fn feature_importances(&self) -> Option<&[f64]> {
        if self.feature_importances.is_empty() {
            None
        } else {
            Some(&self.feature_importances)
        }
    }

    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        if self.is_classification {
            Some(self)
        } else {
            None
        }
    }
}

impl ProbabilisticClassifier for GradientBoosting {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_input("gradient_boosting", x, self.n_features)?;
        Ok(self.raw_score(x).mapv(sigmoid))
    }
}

fn log_loss(y: &Array1<f64>, score: &Array1<f64>) -> f64 {
    let total: f64 = y
        .iter()
        .zip(score.iter())
        .map(|(t, s)| {
            let softplus = if *s > 0.0 { s + (-s).exp().ln_1p() } else { s.exp().ln_1p() };
            softplus - t * s
        })
        .sum();
    total / y.len().max(1) as f64
}
