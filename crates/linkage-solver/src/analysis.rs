use serde::{Deserialize, Serialize};

use crate::constraint::ConstraintSet;
use crate::linalg::numerical_rank;
use crate::packing::pack;
use crate::solver::{Problem, SolveError};
use crate::validate::validate;

/// Degrees-of-freedom bookkeeping for a constraint system at one
/// configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintAnalysis {
    /// Number of coordinates, twice the point count.
    pub variables: usize,
    /// Number of scalar residuals.
    pub equations: usize,
    /// Numerical rank of the constraint Jacobian.
    pub rank: usize,
    /// Remaining freedom, `variables - rank`.
    pub dof: usize,
    /// Equations that add no independent information, `equations - rank`.
    pub redundant: usize,
}

impl ConstraintAnalysis {
    /// No freedom left and no redundancy.
    pub fn is_well_constrained(&self) -> bool {
        self.dof == 0 && self.redundant == 0
    }

    pub fn is_under_constrained(&self) -> bool {
        self.dof > 0
    }

    pub fn is_over_constrained(&self) -> bool {
        self.redundant > 0
    }
}

/// Analyse a problem at its starting configuration.
pub fn analyze(problem: &Problem) -> Result<ConstraintAnalysis, SolveError> {
    validate(problem)?;
    Ok(analyze_at(problem.constraints(), &pack(problem.points())))
}

/// Analyse a constraint set at the configuration `x`.
///
/// A Jacobian with non-finite entries is reported with rank zero.
pub fn analyze_at(constraints: &ConstraintSet, x: &[f64]) -> ConstraintAnalysis {
    let variables = x.len();
    let equations = constraints.len();
    let jac = constraints.jacobian(x);
    let rank = if jac.iter().all(|v| v.is_finite()) {
        numerical_rank(&jac)
    } else {
        0
    };
    ConstraintAnalysis {
        variables,
        equations,
        rank,
        dof: variables - rank,
        redundant: equations - rank,
    }
}
