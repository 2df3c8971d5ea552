//! Support vector classifier trained with SMO, with Platt-scaled probabilities.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::model::{
    check_binary_labels, check_prediction_input, check_training_data, ensure_finite, sigmoid, Estimator,
    ProbabilisticClassifier,
};
use crate::config::SvmKernel;
use crate::error::{PipelineError, Result};

/// Kernel row cache size used when none is configured, in megabytes.
pub const DEFAULT_CACHE_MB: usize = 200;

const TAU: f64 = 1e-12;

fn default_cache_mb() -> usize {
    DEFAULT_CACHE_MB
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportVectorClassifier {
    pub c: f64,
    pub kernel: SvmKernel,
    /// SMO budget in passes over the training rows
    pub max_iter: usize,
    pub tol: f64,
    /// Memory for cached kernel rows during training, in megabytes
    #[serde(default = "default_cache_mb")]
    pub cache_mb: usize,
    gamma: f64,
    support_vectors: Array2<f64>,
    /// `alpha_i * y_i` per support vector, labels in {-1, +1}
    dual_coef: Vec<f64>,
    rho: f64,
    platt_a: f64,
    platt_b: f64,
    n_features: usize,
}

impl SupportVectorClassifier {
    pub fn new(kernel: SvmKernel, c: f64, max_iter: usize) -> Self {
        Self {
            c,
            kernel,
            max_iter,
            tol: 1e-3,
            cache_mb: DEFAULT_CACHE_MB,
            gamma: 1.0,
            support_vectors: Array2::zeros((0, 0)),
            dual_coef: Vec::new(),
            rho: 0.0,
            platt_a: 0.0,
            platt_b: 0.0,
            n_features: 0,
        }
    }

    pub fn with_cache_size(mut self, cache_mb: usize) -> Self {
        self.cache_mb = cache_mb;
        self
    }

    #[cfg(test)]
    pub fn n_support_vectors(&self) -> usize {
        self.dual_coef.len()
    }

    /// Signed distance to the separating surface; positive means blue win.
    pub fn decision_function(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_input("svm", x, self.n_features)?;
        let rows: Vec<ArrayView1<f64>> = x.axis_iter(Axis(0)).collect();
        let values: Vec<f64> = rows
            .into_par_iter()
            .map(|row| {
                self.support_vectors
                    .rows()
                    .into_iter()
                    .zip(&self.dual_coef)
                    .map(|(sv, coef)| coef * kernel_value(self.kernel, self.gamma, sv, row))
                    .sum::<f64>()
                    - self.rho
            })
            .collect();
        Ok(Array1::from(values))
    }
}

fn kernel_value(kernel: SvmKernel, gamma: f64, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    match kernel {
        SvmKernel::Linear => a.dot(&b),
        SvmKernel::Rbf => {
            let dist: f64 = a.iter().zip(b.iter()).map(|(u, v)| (u - v).powi(2)).sum();
            (-gamma * dist).exp()
        }
    }
}

/// Kernel rows computed on demand and kept in a bounded LRU.
/// Recency is a generation counter; eviction drops the lowest generation.
struct KernelCache<'a> {
    x: &'a Array2<f64>,
    kernel: SvmKernel,
    gamma: f64,
    diag: Vec<f64>,
    rows: HashMap<usize, (u64, Arc<Vec<f64>>)>,
    capacity: usize,
    generation: u64,
    misses: usize,
}

impl<'a> KernelCache<'a> {
    fn new(x: &'a Array2<f64>, kernel: SvmKernel, gamma: f64, cache_mb: usize) -> Self {
        let n = x.nrows().max(1);
        let row_bytes = n * std::mem::size_of::<f64>();
        // the working pair must be resident together
        let capacity = (cache_mb.saturating_mul(1 << 20) / row_bytes).clamp(2, n.max(2));
        let diag = x.rows().into_iter().map(|r| kernel_value(kernel, gamma, r, r)).collect();
        Self {
            x,
            kernel,
            gamma,
            diag,
            rows: HashMap::with_capacity(capacity),
            capacity,
            generation: 0,
            misses: 0,
        }
    }

    fn diag(&self, i: usize) -> f64 {
        self.diag[i]
    }

    /// `K(x_i, x_t)` for every training row `t`.
    fn row(&mut self, i: usize) -> Arc<Vec<f64>> {
        self.generation += 1;
        let generation = self.generation;
        if let Some(entry) = self.rows.get_mut(&i) {
            entry.0 = generation;
            return Arc::clone(&entry.1);
        }

        if self.rows.len() >= self.capacity {
            let oldest = self.rows.iter().min_by_key(|(_, (g, _))| *g).map(|(k, _)| *k);
            if let Some(oldest) = oldest {
                self.rows.remove(&oldest);
            }
        }
        self.misses += 1;
        let (x, kernel, gamma) = (self.x, self.kernel, self.gamma);
        let xi = x.row(i);
        let values: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|t| kernel_value(kernel, gamma, xi, x.row(t)))
            .collect();
        let row = Arc::new(values);
        self.rows.insert(i, (generation, Arc::clone(&row)));
        row
    }
}

/// Dual solver state (LIBSVM formulation with second-order working set selection).
struct Smo<'a> {
    cache: KernelCache<'a>,
    y: Vec<f64>,
    c: f64,
    alpha: Vec<f64>,
    grad: Vec<f64>,
}

impl<'a> Smo<'a> {
    fn new(cache: KernelCache<'a>, y: Vec<f64>, c: f64) -> Self {
        let n = y.len();
        Self {
            cache,
            y,
            c,
            alpha: vec![0.0; n],
            grad: vec![-1.0; n],
        }
    }

    fn is_upper(&self, t: usize) -> bool {
        self.alpha[t] >= self.c
    }

    fn is_lower(&self, t: usize) -> bool {
        self.alpha[t] <= 0.0
    }

    /// Most violating pair, or `None` once the KKT gap is below `eps`.
    fn select_working_set(&mut self, eps: f64) -> Option<(usize, usize)> {
        let n = self.y.len();
        let mut g_max = f64::NEG_INFINITY;
        let mut i_sel = None;
        for t in 0..n {
            if self.y[t] > 0.0 {
                if !self.is_upper(t) && -self.grad[t] >= g_max {
                    g_max = -self.grad[t];
                    i_sel = Some(t);
                }
            } else if !self.is_lower(t) && self.grad[t] >= g_max {
                g_max = self.grad[t];
                i_sel = Some(t);
            }
        }
        let i = i_sel?;
        let k_i = self.cache.row(i);
        let k_ii = self.cache.diag(i);

        let mut g_max2 = f64::NEG_INFINITY;
        let mut obj_min = f64::INFINITY;
        let mut j_sel = None;
        for t in 0..n {
            let (candidate, grad_diff) = if self.y[t] > 0.0 {
                if self.is_lower(t) {
                    continue;
                }
                g_max2 = g_max2.max(self.grad[t]);
                (true, g_max + self.grad[t])
            } else {
                if self.is_upper(t) {
                    continue;
                }
                g_max2 = g_max2.max(-self.grad[t]);
                (true, g_max - self.grad[t])
            };
            if candidate && grad_diff > 0.0 {
                let quad = k_ii + self.cache.diag(t) - 2.0 * k_i[t];
                let obj = -(grad_diff * grad_diff) / if quad > 0.0 { quad } else { TAU };
                if obj <= obj_min {
                    obj_min = obj;
                    j_sel = Some(t);
                }
            }
        }

        if g_max + g_max2 < eps {
            return None;
        }
        j_sel.map(|j| (i, j))
    }

    fn update(&mut self, i: usize, j: usize) {
        let c = self.c;
        let (old_i, old_j) = (self.alpha[i], self.alpha[j]);
        let (mut ai, mut aj) = (old_i, old_j);
        let k_i = self.cache.row(i);
        let k_j = self.cache.row(j);
        let (k_ii, k_jj) = (self.cache.diag(i), self.cache.diag(j));
        let q_ij = self.y[i] * self.y[j] * k_i[j];

        if self.y[i] != self.y[j] {
            let quad = (k_ii + k_jj + 2.0 * q_ij).max(TAU);
            let delta = (-self.grad[i] - self.grad[j]) / quad;
            let diff = ai - aj;
            ai += delta;
            aj += delta;
            if diff > 0.0 {
                if aj < 0.0 {
                    aj = 0.0;
                    ai = diff;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = -diff;
            }
            if diff > 0.0 {
                if ai > c {
                    ai = c;
                    aj = c - diff;
                }
            } else if aj > c {
                aj = c;
                ai = c + diff;
            }
        } else {
            let quad = (k_ii + k_jj - 2.0 * q_ij).max(TAU);
            let delta = (self.grad[i] - self.grad[j]) / quad;
            let sum = ai + aj;
            ai -= delta;
            aj += delta;
            if sum > c {
                if ai > c {
                    ai = c;
                    aj = sum - c;
                }
            } else if aj < 0.0 {
                aj = 0.0;
                ai = sum;
            }
            if sum > c {
                if aj > c {
                    aj = c;
                    ai = sum - c;
                }
            } else if ai < 0.0 {
                ai = 0.0;
                aj = sum;
            }
        }

        self.alpha[i] = ai;
        self.alpha[j] = aj;
        let (d_i, d_j) = (ai - old_i, aj - old_j);
        let (y_i, y_j) = (self.y[i], self.y[j]);
        for t in 0..self.y.len() {
            self.grad[t] += self.y[t] * (y_i * k_i[t] * d_i + y_j * k_j[t] * d_j);
        }
    }

    fn rho(&self) -> f64 {
        let mut upper = f64::INFINITY;
        let mut lower = f64::NEG_INFINITY;
        let mut free_sum = 0.0;
        let mut free_count = 0;
        for t in 0..self.y.len() {
            let yg = self.y[t] * self.grad[t];
            if self.is_upper(t) {
                if self.y[t] < 0.0 {
                    upper = upper.min(yg);
                } else {
                    lower = lower.max(yg);
                }
            } else if self.is_lower(t) {
                if self.y[t] > 0.0 {
                    upper = upper.min(yg);
                } else {
                    lower = lower.max(yg);
                }
            } else {
                free_count += 1;
                free_sum += yg;
            }
        }
        if free_count > 0 {
            free_sum / free_count as f64
        } else {
            (upper + lower) / 2.0
        }
    }
}

/// Fit `P(y=1 | f) = 1 / (1 + exp(A f + B))` by regularised maximum likelihood.
fn platt_scaling(decision: &[f64], labels: &[f64]) -> (f64, f64) {
    let prior1 = labels.iter().filter(|t| **t > 0.5).count() as f64;
    let prior0 = labels.len() as f64 - prior1;
    let hi_target = (prior1 + 1.0) / (prior1 + 2.0);
    let lo_target = 1.0 / (prior0 + 2.0);
    let targets: Vec<f64> = labels
        .iter()
        .map(|t| if *t > 0.5 { hi_target } else { lo_target })
        .collect();

    let objective = |a: f64, b: f64| -> f64 {
        decision
            .iter()
            .zip(&targets)
            .map(|(f, t)| {
                let fab = f * a + b;
                if fab >= 0.0 {
                    t * fab + (-fab).exp().ln_1p()
                } else {
                    (t - 1.0) * fab + fab.exp().ln_1p()
                }
            })
            .sum()
    };

    let (min_step, sigma, eps) = (1e-10, 1e-12, 1e-5);
    let mut a = 0.0;
    let mut b = ((prior0 + 1.0) / (prior1 + 1.0)).ln();
    let mut fval = objective(a, b);

    for _ in 0..100 {
        let (mut h11, mut h22, mut h21, mut g1, mut g2) = (sigma, sigma, 0.0, 0.0, 0.0);
        for (f, t) in decision.iter().zip(&targets) {
            let p = sigmoid(-(f * a + b));
            let q = 1.0 - p;
            let d2 = p * q;
            h11 += f * f * d2;
            h22 += d2;
            h21 += f * d2;
            let d1 = t - p;
            g1 += f * d1;
            g2 += d1;
        }
        if g1.abs() < eps && g2.abs() < eps {
            break;
        }

        let det = h11 * h22 - h21 * h21;
        let da = -(h22 * g1 - h21 * g2) / det;
        let db = -(-h21 * g1 + h11 * g2) / det;
        let gd = g1 * da + g2 * db;

        let mut step = 1.0;
        while step >= min_step {
            let (new_a, new_b) = (a + step * da, b + step * db);
            let new_f = objective(new_a, new_b);
            if new_f < fval + 1e-4 * step * gd {
                a = new_a;
                b = new_b;
                fval = new_f;
                break;
            }
            step /= 2.0;
        }
        if step < min_step {
            debug!("Platt scaling line search stopped early");
            break;
        }
    }
    (a, b)
}

/// `gamma = 1 / (n_features * Var(X))` over every entry of the matrix.
fn scale_gamma(x: &Array2<f64>) -> f64 {
    let var = x.var(0.0);
    if var > 0.0 {
        1.0 / (x.ncols() as f64 * var)
    } else {
        1.0
    }
}

impl Estimator for SupportVectorClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let name = "svm";
        check_training_data(name, x, y)?;
        check_binary_labels(name, y)?;
        let n = x.nrows();
        if self.c <= 0.0 {
            return Err(PipelineError::model_fit(name, "C must be positive"));
        }

        self.gamma = scale_gamma(x);
        let cache = KernelCache::new(x, self.kernel, self.gamma, self.cache_mb);
        let signed: Vec<f64> = y.iter().map(|t| if *t > 0.5 { 1.0 } else { -1.0 }).collect();

        let mut smo = Smo::new(cache, signed.clone(), self.c);
        let budget = self.max_iter.saturating_mul(n).max(1);
        let mut iterations = 0;
        let mut converged = false;
        while iterations < budget {
            match smo.select_working_set(self.tol) {
                Some((i, j)) => smo.update(i, j),
                None => {
                    converged = true;
                    break;
                }
            }
            iterations += 1;
        }
        if !converged {
            return Err(PipelineError::model_fit(
                name,
                format!(
                    "SMO did not reach tolerance {} within {} passes ({} iterations); raise svm_max_iter",
                    self.tol, self.max_iter, iterations
                ),
            ));
        }

        let rho = smo.rho();
        let support: Vec<usize> = (0..n).filter(|&t| smo.alpha[t] > 0.0).collect();
        let dual_coef: Vec<f64> = support.iter().map(|&t| smo.alpha[t] * signed[t]).collect();
        ensure_finite(name, dual_coef.iter().chain(std::iter::once(&rho)))?;

        // Training decision values from the support vectors' kernel rows
        let mut decision = vec![-rho; n];
        for (&s, coef) in support.iter().zip(&dual_coef) {
            let k_s = smo.cache.row(s);
            for (d, k) in decision.iter_mut().zip(k_s.iter()) {
                *d += coef * k;
            }
        }
        let labels = y.to_vec();
        let (platt_a, platt_b) = platt_scaling(&decision, &labels);
        ensure_finite(name, [platt_a, platt_b].iter())?;

        debug!(
            "svm fitted: {} support vectors of {} rows, gamma={:.4}, {} SMO iterations, {} kernel rows computed",
            support.len(),
            n,
            self.gamma,
            iterations,
            smo.cache.misses
        );
        self.support_vectors = x.select(Axis(0), &support);
        self.dual_coef = dual_coef;
        self.rho = rho;
        self.platt_a = platt_a;
        self.platt_b = platt_b;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.decision_function(x)?.mapv(|f| if f > 0.0 { 1.0 } else { 0.0 }))
    }

    fn as_probabilistic(&self) -> Option<&dyn ProbabilisticClassifier> {
        Some(self)
    }
}

impl ProbabilisticClassifier for SupportVectorClassifier {
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (a, b) = (self.platt_a, self.platt_b);
        Ok(self.decision_function(x)?.mapv(|f| sigmoid(-(a * f + b))))
    }
}
