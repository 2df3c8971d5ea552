use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::linalg::solve_symmetric;
use super::model::{
    check_binary_labels, check_prediction_input, check_training_data, ensure_finite, sigmoid, Estimator,
    ProbabilisticClassifier,
};
use crate::error::{PipelineError, Result};

/// Training summary after model fit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub iterations: usize,
    pub accuracy: f64,
    pub wins_in_data: usize,
    pub losses_in_data: usize,
}

/// Blue-side win classifier using L2-regularised logistic regression.
///
/// Minimises `0.5 * ||w||^2 + C * sum(log_loss)` with Newton steps; the
/// intercept is not penalised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub c: f64,
    pub max_iter: usize,
    pub tol: f64,
    coefficients: Vec<f64>,
    intercept: f64,
    report: Option<TrainingReport>,
}

impl LogisticRegression {
    pub fn new(c: f64, max_iter: usize) -> Self {
        Self {
            c,
            max_iter,
            tol: 1e-4,
            coefficients: Vec::new(),
            intercept: 0.0,
            report: None,
        }
    }

    #[cfg(test)]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    #[cfg(test)]
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn report(&self) -> Option<&TrainingReport> {
        self.report.as_ref()
    }

    fn decision_function(&self, x: &Array2<f64>) -> Array1<f64> {
        let w = Array1::from(self.coefficients.clone());
        x.dot(&w) + self.intercept
    }

    /// Penalised objective at `theta = [w..., b]`
    fn objective(&self, xa: &Array2<f64>, y: &Array1<f64>, theta: &Array1<f64>) -> f64 {
        let p = theta.len() - 1;
        let z = xa.dot(theta);
        let loss: f64 = z
            .iter()
            .zip(y.iter())
            .map(|(z, t)| softplus(*z) - t * z)
            .sum();
        let penalty = theta.slice(s![..p]).mapv(|w| w * w).sum();
        0.5 * penalty + self.c * loss
    }
}

impl Estimator for LogisticRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let name = "logistic_regression";
        check_training_data(name, x, y)?;
        check_binary_labels(name, y)?;
        if self.c <= 0.0 {
            return Err(PipelineError::model_fit(name, "C must be positive"));
        }

        let (n, p) = x.dim();
        // Augment with a column of ones for the intercept
        let mut xa = Array2::<f64>::ones((n, p + 1));
        xa.slice_mut(s![.., ..p]).assign(x);

        let mut theta = Array1::<f64>::zeros(p + 1);
        let mut fval = self.objective(&xa, y, &theta);
        let mut converged = false;
        let mut iterations = 0;

        for iter in 0..self.max_iter {
            iterations = iter + 1;
            let proba = xa.dot(&theta).mapv(sigmoid);
            let error = &proba - y;

            let mut gradient = xa.t().dot(&error) * self.c;
            for j in 0..p {
                gradient[j] += theta[j];
            }
            let grad_max = gradient.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
            if grad_max <= self.tol * (n as f64).max(1.0) {
                converged = true;
                break;
            }

            let weights = proba.mapv(|q| q * (1.0 - q) * self.c);
            let weighted = &xa * &weights.view().insert_axis(Axis(1));
            let mut hessian = xa.t().dot(&weighted);
            for j in 0..p {
                hessian[[j, j]] += 1.0;
            }
            hessian[[p, p]] += 1e-10;

            let step = solve_symmetric(&hessian, &(-&gradient))
                .ok_or_else(|| PipelineError::model_fit(name, "Newton system is singular"))?;

            // Backtracking line search on the penalised objective
            let slope = gradient.dot(&step);
            let mut t = 1.0;
            loop {
                let candidate = &theta + &(&step * t);
                let candidate_f = self.objective(&xa, y, &candidate);
                if candidate_f <= fval + 1e-4 * t * slope {
                    theta = candidate;
                    fval = candidate_f;
                    break;
                }
                t *= 0.5;
                if t < 1e-10 {
                    break;
                }
            }
            if t < 1e-10 {
                // No further decrease is possible in floating point
                converged = true;
                break;
            }
        }

        if !converged {
            return Err(PipelineError::model_fit(
                name,
                format!("Newton solver did not converge in {} iterations", self.max_iter),
            ));
        }
        ensure_finite(name, theta.iter())?;

        self.coefficients = theta.slice(s![..p]).to_vec();
        self.intercept = theta[p];

        // Calculate training accuracy
        let predicted = self.decision_function(x);
        let correct = predicted
            .iter()
            .zip(y.iter())
            .filter(|(z, t)| (**z > 0.0) == (**t >= 0.5))
            .count();
        let accuracy = correct as f64 / n as f64;
        let wins = y.iter().filter(|t| **t >= 0.5).count();

        debug!("logistic_regression converged in {} Newton iterations", iterations);

        self.report = Some(TrainingReport {
            samples: n,
            iterations,
            accuracy,
            wins_in_data: wins,
            losses_in_data: n - wins,
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_input("logistic_regression", x, self.coefficients.len())?;
        Ok(self.decision_function(x).mapv(|z| if z > 0.0 { 1.0 } else { 0.0 }))
    }

    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }
}

impl ProbabilisticClassifier for LogisticRegression {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_input("logistic_regression", x, self.coefficients.len())?;
        Ok(self.decision_function(x).mapv(sigmoid))
    }
}

fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn noisy_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, j)| {
            let v = i as f64 / 4.0 - 5.0;
            if j == 0 {
                v
            } else {
                ((i * 31) % 7) as f64 - 3.0
            }
        });
        // mostly x0 > 0, with a few flipped labels so the optimum is finite
        let y = Array1::from_shape_fn(40, |i| {
            let base = if x[[i, 0]] > 0.0 { 1.0 } else { 0.0 };
            if i == 5 || i == 33 {
                1.0 - base
            } else {
                base
            }
        });
        (x, y)
    }

    #[test]
    fn test_fit_learns_positive_coefficient() {
        let (x, y) = noisy_data();
        let mut model = LogisticRegression::new(1.0, 100);
        model.fit(&x, &y).unwrap();

        assert!(model.coefficients()[0] > 0.5);
        assert!(model.coefficients()[0].abs() > model.coefficients()[1].abs());
        let report = model.report().unwrap();
        assert_eq!(report.samples, 40);
        assert!(report.accuracy >= 0.9);
    }

    #[test]
    fn test_separable_data_converges_with_penalty() {
        let x = array![[-2.0], [-1.0], [1.0], [2.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut model = LogisticRegression::new(1.0, 100);
        model.fit(&x, &y).unwrap();

        assert_eq!(model.predict(&x).unwrap(), y);
        let proba = model.predict_proba(&x).unwrap();
        assert!(proba[0] < 0.5 && proba[3] > 0.5);
        // symmetric data gives a zero intercept
        assert!(model.intercept().abs() < 1e-6);
    }

    #[test]
    fn test_stronger_penalty_shrinks_weights() {
        let (x, y) = noisy_data();
        let mut loose = LogisticRegression::new(10.0, 100);
        let mut tight = LogisticRegression::new(0.01, 100);
        loose.fit(&x, &y).unwrap();
        tight.fit(&x, &y).unwrap();
        assert!(tight.coefficients()[0] < loose.coefficients()[0]);
    }

    #[test]
    fn test_iteration_budget_exhausted() {
        let (x, y) = noisy_data();
        let mut model = LogisticRegression::new(1.0, 1);
        assert!(matches!(model.fit(&x, &y), Err(PipelineError::ModelFit { .. })));
    }

    #[test]
    fn test_predict_before_fit_fails() {
        let model = LogisticRegression::new(1.0, 100);
        assert!(model.predict_proba(&array![[1.0]]).is_err());
    }
}
