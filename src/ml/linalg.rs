//! Small dense solvers for the normal equations and Newton steps.

use ndarray::{Array1, Array2};

const PIVOT_TOLERANCE: f64 = 1e-12;

/// Solve `a x = b` for symmetric positive definite `a`.
///
/// Returns `None` when a pivot falls below the relative tolerance.
pub fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return None;
    }
    let max_diag = (0..n).map(|i| a[[i, i]].abs()).fold(0.0, f64::max);
    let tol = PIVOT_TOLERANCE * max_diag.max(f64::MIN_POSITIVE);

    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut diag = a[[j, j]];
        for k in 0..j {
            diag -= l[[j, k]] * l[[j, k]];
        }
        if !(diag > tol) {
            return None;
        }
        let ljj = diag.sqrt();
        l[[j, j]] = ljj;
        for i in (j + 1)..n {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = sum / ljj;
        }
    }

    // Forward then back substitution
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * z[k];
        }
        z[i] = sum / l[[i, i]];
    }
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = z[i];
        for k in (i + 1)..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }
    Some(x)
}

/// Gauss-Jordan elimination with partial pivoting.
pub fn gauss_jordan_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.len() != n {
        return None;
    }
    let scale = a.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let tol = PIVOT_TOLERANCE * scale.max(f64::MIN_POSITIVE);

    let mut m = a.clone();
    let mut rhs = b.clone();
    for col in 0..n {
        let pivot_row = (col..n).max_by(|&i, &j| m[[i, col]].abs().total_cmp(&m[[j, col]].abs()))?;
        if m[[pivot_row, col]].abs() <= tol {
            return None;
        }
        if pivot_row != col {
            for k in 0..n {
                m.swap([col, k], [pivot_row, k]);
            }
            rhs.swap(col, pivot_row);
        }

        let pivot = m[[col, col]];
        for k in 0..n {
            m[[col, k]] /= pivot;
        }
        rhs[col] /= pivot;

        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = m[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }
    Some(rhs)
}

/// Cholesky first, Gauss-Jordan if the matrix is not numerically SPD.
pub fn solve_symmetric(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    cholesky_solve(a, b).or_else(|| gauss_jordan_solve(a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a: &Array1<f64>, b: &Array1<f64>) {
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-9, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_cholesky_solves_spd_system() {
        let a = array![[4.0, 2.0, 0.6], [2.0, 5.0, 1.0], [0.6, 1.0, 3.0]];
        let x = array![1.0, -2.0, 0.5];
        let b = a.dot(&x);
        assert_close(&cholesky_solve(&a, &b).unwrap(), &x);
    }

    #[test]
    fn test_gauss_jordan_handles_non_symmetric() {
        let a = array![[0.0, 2.0], [3.0, 1.0]];
        let x = array![2.0, 3.0];
        let b = a.dot(&x);
        assert!(cholesky_solve(&a, &b).is_none());
        assert_close(&solve_symmetric(&a, &b).unwrap(), &x);
    }

    #[test]
    fn test_singular_matrix_is_rejected() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        let b = array![1.0, 2.0];
        assert!(solve_symmetric(&a, &b).is_none());
    }
}
