use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{
    check_binary_labels, check_prediction_input, check_training_data, Estimator, ProbabilisticClassifier,
};
use super::tree::{Criterion, DecisionTree};
use crate::error::{PipelineError, Result};

/// Strategy for the number of features tried per split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// Square root of n_features (classification default)
    Sqrt,
    /// All features (regression default)
    All,
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        match self {
            MaxFeatures::Sqrt => ((n_features as f64).sqrt().floor() as usize).max(1),
            MaxFeatures::All => n_features,
        }
    }
}

/// Bagged CART ensemble. Each tree gets its own seed so the result does not
/// depend on how rayon schedules the work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
    pub random_state: u64,
    is_classification: bool,
    trees: Vec<DecisionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

impl RandomForest {
    pub fn new_regressor(n_estimators: usize) -> Self {
        Self::new(n_estimators, false, MaxFeatures::All)
    }

    pub fn new_classifier(n_estimators: usize) -> Self {
        Self::new(n_estimators, true, MaxFeatures::Sqrt)
    }

    fn new(n_estimators: usize, is_classification: bool, max_features: MaxFeatures) -> Self {
        Self {
            n_estimators,
            max_depth: None,
            max_features,
            random_state: 42,
            is_classification,
            trees: Vec::new(),
            n_features: 0,
            feature_importances: Vec::new(),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    #[cfg(test)]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean of the per-tree leaf values (class-1 frequency for classifiers).
    fn average(&self, x: &Array2<f64>) -> Array1<f64> {
        let mut total = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            total += &tree.predict(x);
        }
        total / self.trees.len().max(1) as f64
    }
}

impl Estimator for RandomForest {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let name = "random_forest";
        check_training_data(name, x, y)?;
        if self.is_classification {
            check_binary_labels(name, y)?;
        }
        if self.n_estimators == 0 {
            return Err(PipelineError::model_fit(name, "n_estimators must be positive"));
        }

        let n_samples = x.nrows();
        let max_features = self.max_features.resolve(x.ncols());
        let criterion = if self.is_classification { Criterion::Gini } else { Criterion::Mse };
        let base_seed = self.random_state;
        let max_depth = self.max_depth;

        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let sample: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();

                let mut tree = DecisionTree::new(criterion).with_max_features(max_features);
                tree.max_depth = max_depth;
                tree.fit_rows(x, y, &sample, &mut rng);
                tree
            })
            .collect();

        let mut importances = vec![0.0; x.ncols()];
        for tree in &trees {
            for (total, v) in importances.iter_mut().zip(tree.importances()) {
                *total += v;
            }
        }
        let sum: f64 = importances.iter().sum();
        if sum > 0.0 {
            importances.iter_mut().for_each(|v| *v /= sum);
        }

        debug!(
            "random_forest fitted: {} trees, {} features per split, max depth {:?}",
            trees.len(),
            max_features,
            max_depth
        );
        self.trees = trees;
        self.n_features = x.ncols();
        self.feature_importances = importances;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_input("random_forest", x, self.n_features)?;
        let mean = self.average(x);
        if self.is_classification {
            Ok(mean.mapv(|p| if p > 0.5 { 1.0 } else { 0.0 }))
        } else {
            Ok(mean)
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

impl ProbabilisticClassifier for RandomForest {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_input("random_forest", x, self.n_features)?;
        Ok(self.average(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs(n: usize) -> (Array2<f64>, Array1<f64>) {
        // label is 1 when the first feature is positive; second feature is noise
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let t = i as f64 / n as f64;
            if j == 0 {
                t * 2.0 - 1.0 + 0.01
            } else {
                ((i * 7919) % 13) as f64 / 13.0
            }
        });
        let y = x.column(0).mapv(|v| if v > 0.0 { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn test_classifier_separates_and_reports_importance() {
        let (x, y) = blobs(60);
        let mut forest = RandomForest::new_classifier(20).with_max_depth(5).with_random_state(42);
        forest.fit(&x, &y).unwrap();

        let pred = forest.predict(&x).unwrap();
        let correct = pred.iter().zip(y.iter()).filter(|(p, t)| p == t).count();
        assert!(correct >= 57);

        let importances = forest.feature_importances().unwrap();
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importances[0] > importances[1]);

        let proba = forest.as_probabilistic().unwrap().predict_proba(&x).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, _) = blobs(40);
        let y_reg = x.column(0).mapv(|v| 30.0 + 5.0 * v);
        let mut a = RandomForest::new_regressor(10).with_random_state(7);
        let mut b = RandomForest::new_regressor(10).with_random_state(7);
        a.fit(&x, &y_reg).unwrap();
        b.fit(&x, &y_reg).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_regressor_has_no_probabilities() {
        let (x, _) = blobs(20);
        let y = x.column(0).to_owned();
        let mut forest = RandomForest::new_regressor(5);
        forest.fit(&x, &y).unwrap();
        assert!(forest.as_probabilistic().is_none());
        assert_eq!(forest.n_trees(), 5);
    }

    #[test]
    fn test_classifier_rejects_single_class() {
        let (x, _) = blobs(10);
        let y = Array1::ones(10);
        let mut forest = RandomForest::new_classifier(3);
        assert!(matches!(forest.fit(&x, &y), Err(PipelineError::ModelFit { .. })));
    }

    #[test]
    fn test_sqrt_features() {
        assert_eq!(MaxFeatures::Sqrt.resolve(10), 3);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::All.resolve(10), 10);
    }
}
