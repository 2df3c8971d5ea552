use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::linalg::solve_symmetric;
use super::model::{check_prediction_input, check_training_data, ensure_finite, Estimator};
use crate::error::{PipelineError, Result};

/// Least squares with an optional L2 penalty (`alpha = 0` is plain OLS).
///
/// The intercept is fitted on centred data and never penalised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    pub alpha: f64,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearRegression {
    pub fn ordinary() -> Self {
        Self::ridge(0.0)
    }

    pub fn ridge(alpha: f64) -> Self {
        Self {
            alpha,
            coefficients: Vec::new(),
            intercept: 0.0,
        }
    }

    fn name(&self) -> &'static str {
        if self.alpha > 0.0 {
            "ridge"
        } else {
            "linear_regression"
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
}

impl Estimator for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let name = self.name();
        check_training_data(name, x, y)?;
        let (xc, x_mean, yc, y_mean) = center(x, y);

        let mut gram = xc.t().dot(&xc);
        let rhs = xc.t().dot(&yc);
        for j in 0..gram.nrows() {
            gram[[j, j]] += self.alpha;
        }

        let weights = match solve_symmetric(&gram, &rhs) {
            Some(w) => w,
            None => {
                // Collinear columns (e.g. a diff next to both of its parts):
                // a vanishing ridge term picks the small-norm solution.
                let p = gram.nrows() as f64;
                let jitter = 1e-8 * (gram.diag().sum() / p).max(1e-12);
                debug!("{}: normal equations singular, retrying with jitter {:.3e}", name, jitter);
                for j in 0..gram.nrows() {
                    gram[[j, j]] += jitter;
                }
                solve_symmetric(&gram, &rhs)
                    .ok_or_else(|| PipelineError::model_fit(name, "normal equations are singular"))?
            }
        };

        let intercept = y_mean - x_mean.dot(&weights);
        ensure_finite(name, weights.iter().chain(std::iter::once(&intercept)))?;

        self.coefficients = weights.to_vec();
        self.intercept = intercept;
        debug!("{} fitted: intercept={:.4}", name, intercept);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_input(self.name(), x, self.coefficients.len())?;
        Ok(linear_predict(x, &self.coefficients, self.intercept))
    }
}

/// L1-penalised least squares fitted by cyclic coordinate descent.
///
/// Objective: `1/(2n) * ||y - Xw - b||^2 + alpha * ||w||_1`. Convergence is
/// declared when the duality gap drops below `tol * ||y - mean(y)||^2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LassoRegression {
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    coefficients: Vec<f64>,
    intercept: f64,
    n_iter: usize,
}

impl LassoRegression {
    pub fn new(alpha: f64, max_iter: usize) -> Self {
        Self {
            alpha,
            max_iter,
            tol: 1e-4,
            coefficients: Vec::new(),
            intercept: 0.0,
            n_iter: 0,
        }
    }

    #[cfg(test)]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

impl Estimator for LassoRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let name = "lasso";
        check_training_data(name, x, y)?;
        if self.alpha <= 0.0 {
            return Err(PipelineError::model_fit(name, "alpha must be positive"));
        }

        let (xc, x_mean, yc, y_mean) = center(x, y);
        let (n, p) = xc.dim();
        let l1 = self.alpha * n as f64;
        let col_norms: Vec<f64> = xc.axis_iter(Axis(1)).map(|c| c.dot(&c)).collect();
        let tol = self.tol * yc.dot(&yc);

        let mut w = Array1::<f64>::zeros(p);
        let mut residual = yc.clone();
        let mut converged = false;

        for iter in 0..self.max_iter {
            let mut w_max = 0.0_f64;
            let mut d_w_max = 0.0_f64;

            for j in 0..p {
                if col_norms[j] == 0.0 {
                    continue;
                }
                let column = xc.column(j);
                let w_old = w[j];
                if w_old != 0.0 {
                    residual.scaled_add(w_old, &column);
                }
                let rho = column.dot(&residual);
                let w_new = soft_threshold(rho, l1) / col_norms[j];
                if w_new != 0.0 {
                    residual.scaled_add(-w_new, &column);
                }
                w[j] = w_new;

                d_w_max = d_w_max.max((w_new - w_old).abs());
                w_max = w_max.max(w_new.abs());
            }

            self.n_iter = iter + 1;
            let check_gap = w_max == 0.0 || d_w_max / w_max < self.tol || iter + 1 == self.max_iter;
            if check_gap && duality_gap(&xc, &yc, &residual, &w, l1) <= tol {
                converged = true;
                break;
            }
        }

        if !converged {
            return Err(PipelineError::model_fit(
                name,
                format!("coordinate descent did not converge in {} iterations", self.max_iter),
            ));
        }

        let intercept = y_mean - x_mean.dot(&w);
        ensure_finite(name, w.iter().chain(std::iter::once(&intercept)))?;
        let active = w.iter().filter(|v| **v != 0.0).count();
        debug!("lasso converged after {} iterations, {}/{} active coefficients", self.n_iter, active, p);

        self.coefficients = w.to_vec();
        self.intercept = intercept;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_input("lasso", x, self.coefficients.len())?;
        Ok(linear_predict(x, &self.coefficients, self.intercept))
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    if value > threshold {
        value - threshold
    } else if value < -threshold {
        value + threshold
    } else {
        0.0
    }
}

fn duality_gap(x: &Array2<f64>, y: &Array1<f64>, residual: &Array1<f64>, w: &Array1<f64>, l1: f64) -> f64 {
    let xt_r = x.t().dot(residual);
    let dual_norm = xt_r.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let r_norm2 = residual.dot(residual);

    let (scale, mut gap) = if dual_norm > l1 {
        let scale = l1 / dual_norm;
        (scale, 0.5 * r_norm2 * (1.0 + scale * scale))
    } else {
        (1.0, r_norm2)
    };
    let l1_norm: f64 = w.iter().map(|v| v.abs()).sum();
    gap += l1 * l1_norm - scale * residual.dot(y);
    gap
}

fn center(x: &Array2<f64>, y: &Array1<f64>) -> (Array2<f64>, Array1<f64>, Array1<f64>, f64) {
    let n = x.nrows() as f64;
    let x_mean = x.sum_axis(Axis(0)) / n;
    let y_mean = y.sum() / n;
    let xc = x - &x_mean;
    let yc = y - y_mean;
    (xc, x_mean, yc, y_mean)
}

pub(crate) fn linear_predict(x: &Array2<f64>, coefficients: &[f64], intercept: f64) -> Array1<f64> {
    let w = Array1::from(coefficients.to_vec());
    x.dot(&w) + intercept
}
