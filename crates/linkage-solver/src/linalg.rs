//! Dense linear algebra for the SQP step: KKT solves, multiplier estimates,
//! Hessian convexification and rank detection.

use nalgebra::{DMatrix, DVector, SVD};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinalgError {
    #[error("SVD solve failed: {reason}")]
    Svd { reason: &'static str },
}

/// Solution of one KKT system.
#[derive(Debug, Clone)]
pub struct KktStep {
    /// Primal step `d`.
    pub step: Vec<f64>,
    /// Multipliers `lambda` of the linearised constraints.
    pub multipliers: Vec<f64>,
    /// False when the system was singular and the least-squares fallback ran.
    pub exact: bool,
}

/// Largest absolute entry, zero for an empty slice.
pub fn inf_norm(v: &[f64]) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

pub fn l1_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x.abs()).sum()
}

/// Solve
///
/// ```text
/// [ B  J^T ] [ d      ]   [ -g ]
/// [ J  0   ] [ lambda ] = [ -c ]
/// ```
///
/// with an LU factorisation. Rank-deficient or contradictory constraint
/// Jacobians make the matrix singular; in that case the minimum-norm
/// least-squares solution from the SVD is returned instead.
pub fn solve_kkt(
    hessian: &DMatrix<f64>,
    jac: &DMatrix<f64>,
    g: &[f64],
    c: &[f64],
) -> Result<KktStep, LinalgError> {
    let n = g.len();
    let m = c.len();
    let dim = n + m;

    let mut kkt = DMatrix::zeros(dim, dim);
    kkt.view_mut((0, 0), (n, n)).copy_from(hessian);
    if m > 0 {
        kkt.view_mut((n, 0), (m, n)).copy_from(jac);
        kkt.view_mut((0, n), (n, m)).copy_from(&jac.transpose());
    }

    let mut rhs = DVector::zeros(dim);
    for i in 0..n {
        rhs[i] = -g[i];
    }
    for k in 0..m {
        rhs[n + k] = -c[k];
    }

    let scale = 1.0 + rhs.norm();
    if let Some(sol) = kkt.clone().lu().solve(&rhs) {
        let residual = (&kkt * &sol - &rhs).norm();
        if sol.iter().all(|v| v.is_finite()) && residual <= 1e-9 * scale {
            return Ok(split(&sol, n, true));
        }
    }

    let sol = least_squares(kkt, &rhs)?;
    Ok(split(&sol, n, false))
}

fn split(sol: &DVector<f64>, n: usize, exact: bool) -> KktStep {
    KktStep {
        step: sol.rows(0, n).iter().copied().collect(),
        multipliers: sol.rows(n, sol.len() - n).iter().copied().collect(),
        exact,
    }
}

/// Minimum-norm least-squares solution of `a * x = b`.
pub fn least_squares(a: DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>, LinalgError> {
    let (rows, cols) = a.shape();
    if rows == 0 || cols == 0 {
        return Ok(DVector::zeros(cols));
    }
    let svd = SVD::new(a, true, true);
    let max_sv = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let eps = max_sv * (rows.max(cols) as f64) * f64::EPSILON;
    svd.solve(b, eps).map_err(|reason| LinalgError::Svd { reason })
}

/// Least-squares multiplier estimate: `argmin |g + J^T lambda|`.
pub fn least_squares_multipliers(jac: &DMatrix<f64>, g: &[f64]) -> Result<Vec<f64>, LinalgError> {
    if jac.nrows() == 0 {
        return Ok(Vec::new());
    }
    let rhs = -DVector::from_column_slice(g);
    let lambda = least_squares(jac.transpose(), &rhs)?;
    Ok(lambda.iter().copied().collect())
}

/// Gradient of the Lagrangian, `g + J^T lambda`.
pub fn lagrangian_gradient(jac: &DMatrix<f64>, g: &[f64], lambda: &[f64]) -> Vec<f64> {
    let mut out = g.to_vec();
    if lambda.is_empty() {
        return out;
    }
    let jt_lambda = jac.transpose() * DVector::from_column_slice(lambda);
    for (o, v) in out.iter_mut().zip(jt_lambda.iter()) {
        *o += v;
    }
    out
}

/// Minimum-norm correction `z` with `J z = -c`: one Gauss-Newton step back
/// towards the constraints.
pub fn min_norm_correction(jac: &DMatrix<f64>, c: &[f64]) -> Result<Vec<f64>, LinalgError> {
    if c.is_empty() {
        return Ok(vec![0.0; jac.ncols()]);
    }
    let rhs = -DVector::from_column_slice(c);
    let z = least_squares(jac.clone(), &rhs)?;
    Ok(z.iter().copied().collect())
}

/// Numerical rank of a matrix via SVD.
pub fn numerical_rank(mat: &DMatrix<f64>) -> usize {
    let (m, n) = mat.shape();
    if m == 0 || n == 0 {
        return 0;
    }
    let svd = SVD::new(mat.clone(), false, false);
    let sv = &svd.singular_values;
    let max_sv = sv.iter().cloned().fold(0.0_f64, f64::max);
    let threshold = max_sv * (m.max(n) as f64) * f64::EPSILON;
    sv.iter().filter(|&&s| s > threshold).count()
}

/// Orthonormal basis of the null space of `jac`, one vector per column.
///
/// Directions whose singular value is below `sqrt(EPS)` of the largest are
/// counted as null, so nearly dependent constraints still expose the
/// direction they barely restrict.
pub fn null_space(jac: &DMatrix<f64>) -> Result<DMatrix<f64>, LinalgError> {
    let (m, n) = jac.shape();
    if m == 0 {
        return Ok(DMatrix::identity(n, n));
    }
    if n == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    // Pad to at least n rows so the SVD returns a full n x n V^T.
    let mut padded = DMatrix::zeros(m.max(n), n);
    padded.view_mut((0, 0), (m, n)).copy_from(jac);
    let svd = SVD::new(padded, false, true);
    let v_t = svd.v_t.ok_or(LinalgError::Svd {
        reason: "right singular vectors missing",
    })?;
    let max_sv = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let threshold = max_sv * (m.max(n) as f64) * f64::EPSILON.sqrt();
    let columns: Vec<DVector<f64>> = svd
        .singular_values
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s <= threshold)
        .map(|(i, _)| v_t.row(i).transpose())
        .collect();
    if columns.is_empty() {
        Ok(DMatrix::zeros(n, 0))
    } else {
        Ok(DMatrix::from_columns(&columns))
    }
}

/// Smallest curvature left on the null space, relative to the largest
/// Hessian entry.
const CURVATURE_FLOOR: f64 = 1e-4;

/// Shift `hessian` by a multiple of the identity until it is positive
/// definite on the null space of `jac`, and return the shift.
///
/// Negative curvature is mirrored: the smallest reduced eigenvalue ends up
/// at its own magnitude. Flat directions are lifted to the curvature floor.
pub fn convexify(hessian: &mut DMatrix<f64>, jac: &DMatrix<f64>) -> Result<f64, LinalgError> {
    let n = hessian.nrows();
    let z = null_space(jac)?;
    if n == 0 || z.ncols() == 0 {
        return Ok(0.0);
    }
    let reduced = z.transpose() * &*hessian * &z;
    let reduced = (&reduced + reduced.transpose()) * 0.5;
    let smallest = reduced.symmetric_eigen().eigenvalues.min();
    let floor = CURVATURE_FLOOR * hessian.amax().max(1.0);
    if smallest >= floor {
        return Ok(0.0);
    }
    let shift = (floor - smallest).max(-2.0 * smallest);
    for i in 0..n {
        hessian[(i, i)] += shift;
    }
    Ok(shift)
}
