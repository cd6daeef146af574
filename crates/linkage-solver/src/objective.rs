use linkage_types::{MovingPointSpec, Point2, PointId};
use nalgebra::DMatrix;

use crate::packing::{point_at, slots};

/// Sum of squared distances between moving points and their targets.
///
/// Squared distance keeps the objective smooth at the target itself. With no
/// terms the objective is identically zero and the solve reduces to finding
/// a feasible configuration near the start.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Objective {
    terms: Vec<(PointId, Point2)>,
}

impl Objective {
    pub fn from_specs(specs: &[MovingPointSpec]) -> Self {
        Self {
            terms: specs.iter().map(|s| (s.point, s.target)).collect(),
        }
    }

    pub fn terms(&self) -> &[(PointId, Point2)] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn value(&self, x: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(point, target)| point_at(x, *point).distance_squared_to(target))
            .sum()
    }

    pub fn gradient(&self, x: &[f64]) -> Vec<f64> {
        let mut g = vec![0.0; x.len()];
        for (point, target) in &self.terms {
            let (ix, iy) = slots(*point);
            g[ix] += 2.0 * (x[ix] - target.x);
            g[iy] += 2.0 * (x[iy] - target.y);
        }
        g
    }

    /// Add the (constant) objective Hessian: 2 on both slots of every term.
    pub fn add_hessian(&self, hess: &mut DMatrix<f64>) {
        for (point, _) in &self.terms {
            let (ix, iy) = slots(*point);
            hess[(ix, ix)] += 2.0;
            hess[(iy, iy)] += 2.0;
        }
    }

    /// Largest absolute target coordinate, zero without terms.
    pub fn target_extent(&self) -> f64 {
        self.terms
            .iter()
            .fold(0.0_f64, |acc, (_, t)| acc.max(t.x.abs()).max(t.y.abs()))
    }
}
