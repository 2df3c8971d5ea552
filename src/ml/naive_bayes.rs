use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::model::{
    check_binary_labels, check_prediction_input, check_training_data, ensure_finite, Estimator,
    ProbabilisticClassifier,
};
use crate::error::Result;

/// Gaussian naive Bayes for the two outcome classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianNaiveBayes {
    /// Fraction of the largest feature variance added to every variance
    pub var_smoothing: f64,
    /// Index 0 is class 0, index 1 is class 1
    class_prior: [f64; 2],
    theta: Vec<Vec<f64>>,
    var: Vec<Vec<f64>>,
    n_features: usize,
}

impl Default for GaussianNaiveBayes {
    fn default() -> Self {
        Self::new()
    }
}

impl GaussianNaiveBayes {
    pub fn new() -> Self {
        Self {
            var_smoothing: 1e-9,
            class_prior: [0.5, 0.5],
            theta: Vec::new(),
            var: Vec::new(),
            n_features: 0,
        }
    }

    pub fn class_prior(&self) -> [f64; 2] {
        self.class_prior
    }

    /// Joint log-likelihood per row and class
    fn joint_log_likelihood(&self, x: &Array2<f64>) -> Vec<[f64; 2]> {
        x.rows()
            .into_iter()
            .map(|row| {
                let mut jll = [0.0; 2];
                for (class, out) in jll.iter_mut().enumerate() {
                    let mut total = self.class_prior[class].ln();
                    for (j, v) in row.iter().enumerate() {
                        let var = self.var[class][j];
                        let diff = v - self.theta[class][j];
                        total -= 0.5 * (2.0 * PI * var).ln() + diff * diff / (2.0 * var);
                    }
                    *out = total;
                }
                jll
            })
            .collect()
    }
}

impl Estimator for GaussianNaiveBayes {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let name = "naive_bayes";
        check_training_data(name, x, y)?;
        check_binary_labels(name, y)?;

        let epsilon = self.var_smoothing * x.var_axis(Axis(0), 0.0).fold(0.0_f64, |m, v| m.max(*v));
        let n = x.nrows() as f64;
        let mut theta = Vec::with_capacity(2);
        let mut var = Vec::with_capacity(2);
        let mut prior = [0.0; 2];

        for class in 0..2 {
            let rows: Vec<usize> = (0..x.nrows()).filter(|&i| y[i] == class as f64).collect();
            let subset = x.select(Axis(0), &rows);
            let mean = subset.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
            let variance = subset.var_axis(Axis(0), 0.0) + epsilon;
            prior[class] = rows.len() as f64 / n;
            theta.push(mean.to_vec());
            var.push(variance.to_vec());
        }

        // A zero variance survives only when every feature is constant
        if var.iter().flatten().any(|v| *v <= 0.0) {
            for class_var in var.iter_mut() {
                class_var.iter_mut().for_each(|v| *v = v.max(f64::MIN_POSITIVE));
            }
        }
        ensure_finite(name, theta.iter().flatten().chain(var.iter().flatten()))?;

        self.class_prior = prior;
        self.theta = theta;
        self.var = var;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_input("naive_bayes", x, self.n_features)?;
        Ok(self
            .joint_log_likelihood(x)
            .into_iter()
            .map(|jll| if jll[1] > jll[0] { 1.0 } else { 0.0 })
            .collect())
    }

    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }
}

impl ProbabilisticClassifier for GaussianNaiveBayes {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_input("naive_bayes", x, self.n_features)?;
        Ok(self
            .joint_log_likelihood(x)
            .into_iter()
            .map(|jll| {
                // log-sum-exp over the two classes
                let max = jll[0].max(jll[1]);
                let log_norm = max + ((jll[0] - max).exp() + (jll[1] - max).exp()).ln();
                (jll[1] - log_norm).exp()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_fit_estimates_priors_and_separates() {
        let x = array![[-1.0, 0.1], [-1.2, -0.1], [-0.8, 0.0], [1.0, 0.2], [1.1, -0.2], [0.9, 0.0], [1.3, 0.1], [1.2, 0.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let mut model = GaussianNaiveBayes::new();
        model.fit(&x, &y).unwrap();

        let prior = model.class_prior();
        assert!((prior[0] - 3.0 / 8.0).abs() < 1e-12);
        assert!((prior[1] - 5.0 / 8.0).abs() < 1e-12);
        assert_eq!(model.predict(&x).unwrap(), y);

        let proba = model.predict_proba(&array![[-1.0, 0.0], [1.0, 0.0]]).unwrap();
        assert!(proba[0] < 0.01 && proba[1] > 0.99);
    }

    #[test]
    fn test_far_points_do_not_underflow() {
        let x = array![[0.0], [0.1], [1.0], [1.1]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = GaussianNaiveBayes::new();
        model.fit(&x, &y).unwrap();

        let proba = model.predict_proba(&array![[1000.0], [-1000.0]]).unwrap();
        assert!(proba.iter().all(|p| p.is_finite()));
        assert_eq!(proba[0], 1.0);
        assert_eq!(proba[1], 0.0);
    }

    #[test]
    fn test_requires_both_classes() {
        let mut model = GaussianNaiveBayes::new();
        assert!(model.fit(&array![[0.0], [1.0]], &array![0.0, 0.0]).is_err());
    }
}
