use std::fmt;

use linkage_types::{ConstraintSpec, PointId, wrap_angle};
use nalgebra::DMatrix;

use crate::packing::{point_at, slots};

/// An equality constraint expressed as residuals over the flat vector.
///
/// A residual is a scalar that equals zero when the constraint holds. The
/// number of residuals is fixed per constraint, and evaluation must be a pure
/// function of `x`: constraints never hold references to point objects, only
/// indices into the flat vector.
///
/// New constraint kinds implement this trait and are handed to
/// [`crate::Problem::with_constraints`]; the optimizer itself never needs to
/// know about them.
pub trait Constraint: fmt::Debug + Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Number of residuals appended by [`Constraint::residuals`].
    fn residual_dim(&self) -> usize;

    /// Points the residuals depend on.
    fn point_refs(&self) -> Vec<PointId>;

    /// Append `residual_dim()` residuals for the configuration `x`.
    fn residuals(&self, x: &[f64], out: &mut Vec<f64>);

    /// Write the Jacobian rows of this constraint into `rows`
    /// (`residual_dim() x x.len()`, row-major, zero-initialised).
    ///
    /// The default uses central differences over the referenced points only.
    fn jacobian(&self, x: &[f64], rows: &mut [f64]) {
        finite_difference_rows(self, x, rows);
    }

    /// Add `sum_i weights[i] * hess(residual_i)` into `hess` (`x.len()` square).
    ///
    /// The default differentiates the weighted Jacobian rows centrally, so a
    /// custom constraint only has to provide residuals.
    fn add_weighted_hessian(&self, x: &[f64], weights: &[f64], hess: &mut DMatrix<f64>) {
        finite_difference_hessian(self, x, weights, hess);
    }

    /// Declarative form, for constraints that have one. Validation uses it to
    /// spot contradictions between built-in constraints.
    fn spec(&self) -> Option<ConstraintSpec> {
        None
    }
}

/// Flat-vector slots of `point_refs()`, sorted and deduplicated.
fn referenced_columns<C: Constraint + ?Sized>(constraint: &C) -> Vec<usize> {
    let mut columns: Vec<usize> = constraint
        .point_refs()
        .into_iter()
        .flat_map(|p| {
            let (ix, iy) = slots(p);
            [ix, iy]
        })
        .collect();
    columns.sort_unstable();
    columns.dedup();
    columns
}

/// Central-difference Jacobian restricted to the slots of `point_refs()`.
pub fn finite_difference_rows<C: Constraint + ?Sized>(constraint: &C, x: &[f64], rows: &mut [f64]) {
    let n = x.len();
    let m = constraint.residual_dim();
    let mut shifted = x.to_vec();
    let mut plus = Vec::with_capacity(m);
    let mut minus = Vec::with_capacity(m);

    for j in referenced_columns(constraint) {
        let orig = shifted[j];
        let h = 1e-7 * orig.abs().max(1.0);
        shifted[j] = orig + h;
        plus.clear();
        constraint.residuals(&shifted, &mut plus);
        shifted[j] = orig - h;
        minus.clear();
        constraint.residuals(&shifted, &mut minus);
        shifted[j] = orig;
        for i in 0..m {
            rows[i * n + j] = (plus[i] - minus[i]) / (2.0 * h);
        }
    }
}

/// Central differences of the weighted gradient `sum_i weights[i] * grad(residual_i)`,
/// symmetrised and added into `hess`. Only the referenced slots are touched.
pub fn finite_difference_hessian<C: Constraint + ?Sized>(
    constraint: &C,
    x: &[f64],
    weights: &[f64],
    hess: &mut DMatrix<f64>,
) {
    if weights.iter().all(|&w| w == 0.0) {
        return;
    }
    let n = x.len();
    let m = constraint.residual_dim();
    let columns = referenced_columns(constraint);
    let weighted_gradient = |shifted: &[f64]| -> Vec<f64> {
        let mut rows = vec![0.0; m * n];
        constraint.jacobian(shifted, &mut rows);
        columns
            .iter()
            .map(|&k| (0..m).map(|i| weights[i] * rows[i * n + k]).sum::<f64>())
            .collect()
    };

    let mut shifted = x.to_vec();
    let mut block = DMatrix::zeros(columns.len(), columns.len());
    for (b, &j) in columns.iter().enumerate() {
        let orig = shifted[j];
        let h = 1e-5 * orig.abs().max(1.0);
        shifted[j] = orig + h;
        let plus = weighted_gradient(&shifted);
        shifted[j] = orig - h;
        let minus = weighted_gradient(&shifted);
        shifted[j] = orig;
        for a in 0..columns.len() {
            block[(a, b)] = (plus[a] - minus[a]) / (2.0 * h);
        }
    }
    for (a, &i) in columns.iter().enumerate() {
        for (b, &j) in columns.iter().enumerate() {
            hess[(i, j)] += 0.5 * (block[(a, b)] + block[(b, a)]);
        }
    }
}

/// Add `scale * block` at rows `at` and columns `to` of `hess`.
fn add_block(
    hess: &mut DMatrix<f64>,
    at: (usize, usize),
    to: (usize, usize),
    block: [[f64; 2]; 2],
    scale: f64,
) {
    let rows = [at.0, at.1];
    let cols = [to.0, to.1];
    for (r, row) in rows.iter().enumerate() {
        for (c, col) in cols.iter().enumerate() {
            hess[(*row, *col)] += scale * block[r][c];
        }
    }
}

/// Hessian of `atan2(uy, ux)` with respect to `u`.
fn polar_angle_hessian(ux: f64, uy: f64) -> [[f64; 2]; 2] {
    let r2 = ux * ux + uy * uy;
    let r4 = r2 * r2;
    let off = (uy * uy - ux * ux) / r4;
    [[2.0 * ux * uy / r4, off], [off, -2.0 * ux * uy / r4]]
}

// ── Built-in constraints ─────────────────────────────────────────────────────

/// Pins a point at `(x, y)` with one residual per coordinate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPoint {
    pub point: PointId,
    pub x: f64,
    pub y: f64,
}

impl Constraint for FixedPoint {
    fn name(&self) -> &'static str {
        "fixed_point"
    }

    fn residual_dim(&self) -> usize {
        2
    }

    fn point_refs(&self) -> Vec<PointId> {
        vec![self.point]
    }

    fn residuals(&self, x: &[f64], out: &mut Vec<f64>) {
        let p = point_at(x, self.point);
        out.push(p.x - self.x);
        out.push(p.y - self.y);
    }

    fn jacobian(&self, x: &[f64], rows: &mut [f64]) {
        let n = x.len();
        let (ix, iy) = slots(self.point);
        rows[ix] = 1.0;
        rows[n + iy] = 1.0;
    }

    // Linear residuals.
    fn add_weighted_hessian(&self, _x: &[f64], _weights: &[f64], _hess: &mut DMatrix<f64>) {}

    fn spec(&self) -> Option<ConstraintSpec> {
        Some(ConstraintSpec::FixedPoint {
            point: self.point,
            x: self.x,
            y: self.y,
        })
    }
}

/// Holds the distance between two points at `length`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedLength {
    pub start: PointId,
    pub end: PointId,
    pub length: f64,
}

impl Constraint for FixedLength {
    fn name(&self) -> &'static str {
        "fixed_length"
    }

    fn residual_dim(&self) -> usize {
        1
    }

    fn point_refs(&self) -> Vec<PointId> {
        vec![self.start, self.end]
    }

    fn residuals(&self, x: &[f64], out: &mut Vec<f64>) {
        let p = point_at(x, self.start);
        let q = point_at(x, self.end);
        out.push(p.distance_to(&q) - self.length);
    }

    // d|q - p|/dq = (q - p) / |q - p|. Coincident endpoints yield NaN, which
    // the optimizer reports as numeric instability.
    fn jacobian(&self, x: &[f64], rows: &mut [f64]) {
        let p = point_at(x, self.start);
        let q = point_at(x, self.end);
        let (dx, dy) = q - p;
        let r = (dx * dx + dy * dy).sqrt();
        let (ux, uy) = (dx / r, dy / r);
        let (sx, sy) = slots(self.start);
        let (ex, ey) = slots(self.end);
        rows[sx] -= ux;
        rows[sy] -= uy;
        rows[ex] += ux;
        rows[ey] += uy;
    }

    // hess |q - p| over d = q - p is (I - u u^T) / r; p and q enter with
    // opposite signs.
    fn add_weighted_hessian(&self, x: &[f64], weights: &[f64], hess: &mut DMatrix<f64>) {
        let w = weights[0];
        if w == 0.0 {
            return;
        }
        let p = point_at(x, self.start);
        let q = point_at(x, self.end);
        let (dx, dy) = q - p;
        let r = (dx * dx + dy * dy).sqrt();
        let (ux, uy) = (dx / r, dy / r);
        let block = [[1.0 - ux * ux, -ux * uy], [-ux * uy, 1.0 - uy * uy]];
        let k = w / r;
        let s = slots(self.start);
        let e = slots(self.end);
        add_block(hess, s, s, block, k);
        add_block(hess, e, e, block, k);
        add_block(hess, s, e, block, -k);
        add_block(hess, e, s, block, -k);
    }

    fn spec(&self) -> Option<ConstraintSpec> {
        Some(ConstraintSpec::FixedLength {
            start: self.start,
            end: self.end,
            length: self.length,
        })
    }
}

/// Holds the signed angle `a`-`vertex`-`c` at `angle` radians.
///
/// The residual is the wrapped difference between the current and target
/// angle, so it stays continuous across the `±PI` seam.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedAngle {
    pub a: PointId,
    pub vertex: PointId,
    pub c: PointId,
    pub angle: f64,
}

impl Constraint for FixedAngle {
    fn name(&self) -> &'static str {
        "fixed_angle"
    }

    fn residual_dim(&self) -> usize {
        1
    }

    fn point_refs(&self) -> Vec<PointId> {
        vec![self.a, self.vertex, self.c]
    }

    fn residuals(&self, x: &[f64], out: &mut Vec<f64>) {
        let a = point_at(x, self.a);
        let v = point_at(x, self.vertex);
        let c = point_at(x, self.c);
        let current = linkage_types::signed_angle(&a, &v, &c);
        out.push(wrap_angle(current - self.angle));
    }

    // theta = atan2(w) - atan2(u) with u = a - v, w = c - v.
    // d atan2(u) / du = (-uy, ux) / |u|^2.
    fn jacobian(&self, x: &[f64], rows: &mut [f64]) {
        let a = point_at(x, self.a);
        let v = point_at(x, self.vertex);
        let c = point_at(x, self.c);
        let (ux, uy) = a - v;
        let (wx, wy) = c - v;
        let u2 = ux * ux + uy * uy;
        let w2 = wx * wx + wy * wy;
        let da = (uy / u2, -ux / u2);
        let dc = (-wy / w2, wx / w2);
        let (ax, ay) = slots(self.a);
        let (vx, vy) = slots(self.vertex);
        let (cx, cy) = slots(self.c);
        rows[ax] += da.0;
        rows[ay] += da.1;
        rows[cx] += dc.0;
        rows[cy] += dc.1;
        rows[vx] -= da.0 + dc.0;
        rows[vy] -= da.1 + dc.1;
    }

    fn add_weighted_hessian(&self, x: &[f64], weights: &[f64], hess: &mut DMatrix<f64>) {
        let lambda = weights[0];
        if lambda == 0.0 {
            return;
        }
        let a = point_at(x, self.a);
        let v = point_at(x, self.vertex);
        let c = point_at(x, self.c);
        let (ux, uy) = a - v;
        let (wx, wy) = c - v;
        let hu = polar_angle_hessian(ux, uy);
        let hw = polar_angle_hessian(wx, wy);
        let (sa, sv, sc) = (slots(self.a), slots(self.vertex), slots(self.c));
        add_block(hess, sc, sc, hw, lambda);
        add_block(hess, sv, sv, hw, lambda);
        add_block(hess, sc, sv, hw, -lambda);
        add_block(hess, sv, sc, hw, -lambda);
        add_block(hess, sa, sa, hu, -lambda);
        add_block(hess, sv, sv, hu, -lambda);
        add_block(hess, sa, sv, hu, lambda);
        add_block(hess, sv, sa, hu, lambda);
    }

    fn spec(&self) -> Option<ConstraintSpec> {
        Some(ConstraintSpec::FixedAngle {
            a: self.a,
            vertex: self.vertex,
            c: self.c,
            angle: self.angle,
        })
    }
}

/// Build the trait object for a declarative constraint.
pub fn from_spec(spec: &ConstraintSpec) -> Box<dyn Constraint> {
    match *spec {
        ConstraintSpec::FixedPoint { point, x, y } => Box::new(FixedPoint { point, x, y }),
        ConstraintSpec::FixedLength { start, end, length } => {
            Box::new(FixedLength { start, end, length })
        }
        ConstraintSpec::FixedAngle {
            a,
            vertex,
            c,
            angle,
        } => Box::new(FixedAngle {
            a,
            vertex,
            c,
            angle,
        }),
    }
}

impl From<&ConstraintSpec> for Box<dyn Constraint> {
    fn from(spec: &ConstraintSpec) -> Self {
        from_spec(spec)
    }
}

// ── Constraint set ───────────────────────────────────────────────────────────

/// Ordered collection of constraints.
///
/// The residual vector is the concatenation of each constraint's residuals in
/// insertion order. Order only decides which multiplier belongs to which
/// residual; it never changes the solution.
#[derive(Debug, Default)]
pub struct ConstraintSet {
    constraints: Vec<Box<dyn Constraint>>,
    equations: usize,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: &[ConstraintSpec]) -> Self {
        let mut set = Self::new();
        for spec in specs {
            set.push(from_spec(spec));
        }
        set
    }

    pub fn push(&mut self, constraint: Box<dyn Constraint>) {
        self.equations += constraint.residual_dim();
        self.constraints.push(constraint);
    }

    /// Total number of scalar residuals.
    pub fn len(&self) -> usize {
        self.equations
    }

    pub fn is_empty(&self) -> bool {
        self.equations == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Constraint> {
        self.constraints.iter().map(|c| c.as_ref())
    }

    /// Number of constraints (not residuals).
    pub fn count(&self) -> usize {
        self.constraints.len()
    }

    pub fn residuals(&self, x: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.equations);
        for c in &self.constraints {
            c.residuals(x, &mut out);
        }
        out
    }

    /// Dense `len() x x.len()` Jacobian.
    pub fn jacobian(&self, x: &[f64]) -> DMatrix<f64> {
        let n = x.len();
        let mut jac = DMatrix::zeros(self.equations, n);
        let mut row = 0;
        for c in &self.constraints {
            let dim = c.residual_dim();
            let mut rows = vec![0.0; dim * n];
            c.jacobian(x, &mut rows);
            for i in 0..dim {
                for j in 0..n {
                    jac[(row + i, j)] = rows[i * n + j];
                }
            }
            row += dim;
        }
        jac
    }

    /// Dense `sum_k weights[k] * hess(residual_k)`, one weight per residual.
    pub fn weighted_hessian(&self, x: &[f64], weights: &[f64]) -> DMatrix<f64> {
        let n = x.len();
        let mut hess = DMatrix::zeros(n, n);
        let mut row = 0;
        for c in &self.constraints {
            let dim = c.residual_dim();
            c.add_weighted_hessian(x, &weights[row..row + dim], &mut hess);
            row += dim;
        }
        hess
    }
}
