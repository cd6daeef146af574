use std::fmt;
use std::time::{Duration, Instant};

use linkage_types::{ConstraintSpec, Linkage, ModelError, MovingPointSpec, Point2};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::analysis::{ConstraintAnalysis, analyze_at};
use crate::constraint::{Constraint, ConstraintSet};
use crate::linalg::LinalgError;
use crate::objective::Objective;
use crate::packing::{PackingError, pack, unpack};
use crate::sqp;
use crate::validate::{ValidationError, validate};

/// Which evaluation produced a non-finite value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalStage {
    Objective,
    Residual,
    Jacobian,
    Hessian,
}

impl fmt::Display for EvalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalStage::Objective => write!(f, "objective"),
            EvalStage::Residual => write!(f, "residual"),
            EvalStage::Jacobian => write!(f, "jacobian"),
            EvalStage::Hessian => write!(f, "hessian"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("non-finite {stage} value at iteration {iteration}")]
    NumericInstability { stage: EvalStage, iteration: usize },
    #[error("linear algebra failure: {0}")]
    LinearAlgebra(#[from] LinalgError),
    #[error(transparent)]
    Packing(#[from] PackingError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("malformed request: {0}")]
    Request(#[from] serde_json::Error),
}

/// Why the iteration stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Feasible and stationary within tolerance.
    Converged,
    /// `max_iterations` ran out.
    IterationLimit,
    /// The wall-clock budget ran out.
    TimeLimit,
    /// The step vanished while constraints were still violated.
    Stalled,
}

/// Configuration for the SQP solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Largest acceptable absolute residual, in coordinate units.
    pub feasibility_tolerance: f64,
    /// Largest acceptable Lagrangian gradient, relative to `1 + |grad f|`.
    pub optimality_tolerance: f64,
    /// Steps shorter than this (relative to `1 + |x|`) count as converged
    /// when the iterate is feasible.
    pub step_tolerance: f64,
    /// Backtracking halvings per iteration.
    pub max_line_search_steps: usize,
    /// Optional wall-clock budget in milliseconds.
    pub time_limit_ms: Option<u64>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            feasibility_tolerance: 1e-6,
            optimality_tolerance: 1e-6,
            step_tolerance: 1e-10,
            max_line_search_steps: 30,
            time_limit_ms: None,
        }
    }
}

impl SolverConfig {
    /// Tighter tolerances and a larger iteration budget.
    pub fn precise() -> Self {
        Self {
            max_iterations: 500,
            feasibility_tolerance: 1e-9,
            optimality_tolerance: 1e-9,
            step_tolerance: 1e-12,
            ..Self::default()
        }
    }

    /// Bounded budget for interactive dragging.
    pub fn interactive() -> Self {
        Self {
            max_iterations: 60,
            time_limit_ms: Some(50),
            ..Self::default()
        }
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_ms.map(Duration::from_millis)
    }

    pub(crate) fn time_exceeded(&self, started: Instant) -> bool {
        self.time_limit()
            .is_some_and(|limit| started.elapsed() >= limit)
    }

    pub(crate) fn is_feasible(&self, max_residual: f64) -> bool {
        max_residual <= self.feasibility_tolerance
    }

    pub(crate) fn is_converged(&self, max_residual: f64, stationarity: f64, grad_scale: f64) -> bool {
        self.is_feasible(max_residual)
            && stationarity <= self.optimality_tolerance * (1.0 + grad_scale)
    }
}

/// Diagnostics of a finished solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub iterations: usize,
    pub objective: f64,
    pub max_residual: f64,
    pub stationarity: f64,
    pub termination: Termination,
    pub analysis: ConstraintAnalysis,
}

/// Result of a solve that got as far as iterating.
///
/// A `NotConverged` outcome still carries the best iterate found, but it is
/// never presented as exact.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    Converged {
        points: Vec<Point2>,
        report: SolveReport,
    },
    NotConverged {
        points: Vec<Point2>,
        iterations: usize,
        report: SolveReport,
    },
}

impl SolveOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, SolveOutcome::Converged { .. })
    }

    pub fn points(&self) -> &[Point2] {
        match self {
            SolveOutcome::Converged { points, .. } | SolveOutcome::NotConverged { points, .. } => {
                points
            }
        }
    }

    pub fn report(&self) -> &SolveReport {
        match self {
            SolveOutcome::Converged { report, .. } | SolveOutcome::NotConverged { report, .. } => {
                report
            }
        }
    }

    /// Points of a converged solve, `None` otherwise.
    pub fn converged_points(&self) -> Option<&[Point2]> {
        match self {
            SolveOutcome::Converged { points, .. } => Some(points),
            SolveOutcome::NotConverged { .. } => None,
        }
    }

    pub fn into_points(self) -> Vec<Point2> {
        match self {
            SolveOutcome::Converged { points, .. } | SolveOutcome::NotConverged { points, .. } => {
                points
            }
        }
    }
}

/// One solve: the starting coordinates, the constraints to satisfy and the
/// points to drag.
///
/// The problem never mutates the caller's points; each call to
/// [`Problem::solve`] works on its own flat vector.
#[derive(Debug)]
pub struct Problem {
    points: Vec<Point2>,
    constraints: ConstraintSet,
    objective: Objective,
}

impl Problem {
    pub fn new(
        points: &[Point2],
        constraints: &[ConstraintSpec],
        moves: &[MovingPointSpec],
    ) -> Self {
        Self {
            points: points.to_vec(),
            constraints: ConstraintSet::from_specs(constraints),
            objective: Objective::from_specs(moves),
        }
    }

    /// Build a problem from arbitrary constraint implementations.
    pub fn with_constraints(
        points: &[Point2],
        constraints: Vec<Box<dyn Constraint>>,
        moves: &[MovingPointSpec],
    ) -> Self {
        let mut set = ConstraintSet::new();
        for c in constraints {
            set.push(c);
        }
        Self {
            points: points.to_vec(),
            constraints: set,
            objective: Objective::from_specs(moves),
        }
    }

    pub fn from_linkage(linkage: &Linkage, moves: &[MovingPointSpec]) -> Self {
        Self::new(linkage.points(), linkage.constraints(), moves)
    }

    pub fn add_constraint(&mut self, constraint: Box<dyn Constraint>) {
        self.constraints.push(constraint);
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    /// Starting point of the iteration.
    pub fn initial_vector(&self) -> Vec<f64> {
        pack(&self.points)
    }

    /// Validate, iterate, and unpack.
    #[instrument(skip_all, fields(
        points = self.points.len(),
        equations = self.constraints.len(),
        moving = self.objective.terms().len()
    ))]
    pub fn solve(&self, config: &SolverConfig) -> Result<SolveOutcome, SolveError> {
        if let Err(err) = validate(self) {
            warn!(%err, "rejected solve input");
            return Err(err.into());
        }

        let run = sqp::minimize(self, self.initial_vector(), config)?;
        let points = unpack(&run.x)?;
        let report = SolveReport {
            iterations: run.iterations,
            objective: run.objective,
            max_residual: run.max_residual,
            stationarity: run.stationarity,
            termination: run.termination,
            analysis: analyze_at(&self.constraints, &run.x),
        };

        if run.termination == Termination::Converged {
            info!(
                iterations = report.iterations,
                objective = report.objective,
                max_residual = report.max_residual,
                dof = report.analysis.dof,
                "solve converged"
            );
            Ok(SolveOutcome::Converged { points, report })
        } else {
            warn!(
                iterations = report.iterations,
                termination = ?report.termination,
                max_residual = report.max_residual,
                "solve did not converge"
            );
            Ok(SolveOutcome::NotConverged {
                points,
                iterations: run.iterations,
                report,
            })
        }
    }
}

/// Solve a linkage given as plain data.
pub fn solve(
    points: &[Point2],
    constraints: &[ConstraintSpec],
    moves: &[MovingPointSpec],
    config: &SolverConfig,
) -> Result<SolveOutcome, SolveError> {
    Problem::new(points, constraints, moves).solve(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn two_point() -> (Vec<Point2>, Vec<ConstraintSpec>) {
        let points = vec![Point2::new(2.0, 2.0), Point2::new(5.0, 3.0)];
        let constraints = vec![
            ConstraintSpec::fixed_point(0, points[0]),
            ConstraintSpec::FixedLength {
                start: 0,
                end: 1,
                length: points[0].distance_to(&points[1]),
            },
        ];
        (points, constraints)
    }

    #[test]
    fn test_solve_two_point_linkage() {
        let (points, constraints) = two_point();
        let target = Point2::new(5.0, 6.0);
        let outcome = solve(
            &points,
            &constraints,
            &[MovingPointSpec::new(1, target)],
            &SolverConfig::default(),
        )
        .unwrap();
        assert!(outcome.is_converged(), "{:?}", outcome.report());

        let solved = outcome.points();
        assert_abs_diff_eq!(solved[0].x, 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(solved[0].y, 2.0, epsilon = 1e-6);
        assert_abs_diff_eq!(solved[0].distance_to(&solved[1]), 10f64.sqrt(), epsilon = 1e-6);

        // The closest point on the circle lies along (3, 4) / 5 from a.
        let r = 10f64.sqrt();
        assert_abs_diff_eq!(solved[1].x, 2.0 + 0.6 * r, epsilon = 1e-4);
        assert_abs_diff_eq!(solved[1].y, 2.0 + 0.8 * r, epsilon = 1e-4);
    }

    #[test]
    fn test_already_satisfied_converges_immediately() {
        let (points, constraints) = two_point();
        let outcome = solve(&points, &constraints, &[], &SolverConfig::default()).unwrap();
        assert!(outcome.is_converged());
        assert_eq!(outcome.report().iterations, 0);
        assert_eq!(outcome.points(), points.as_slice());
    }

    #[test]
    fn test_no_constraints_moves_straight_to_target() {
        let points = vec![Point2::new(0.0, 0.0)];
        let target = Point2::new(3.0, -4.0);
        let outcome = solve(
            &points,
            &[],
            &[MovingPointSpec::new(0, target)],
            &SolverConfig::default(),
        )
        .unwrap();
        assert!(outcome.is_converged());
        assert_abs_diff_eq!(outcome.points()[0].x, 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(outcome.points()[0].y, -4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_feasibility_restoration_without_moves() {
        let points = vec![Point2::new(0.0, 0.0), Point2::new(3.0, 4.0)];
        let constraints = vec![
            ConstraintSpec::fixed_point(0, Point2::ORIGIN),
            ConstraintSpec::FixedLength {
                start: 0,
                end: 1,
                length: 10.0,
            },
        ];
        let outcome = solve(&points, &constraints, &[], &SolverConfig::default()).unwrap();
        assert!(outcome.is_converged());
        let p = outcome.points();
        assert_abs_diff_eq!(p[0].distance_to(&p[1]), 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_caller_points_untouched() {
        let (points, constraints) = two_point();
        let before = points.clone();
        let problem = Problem::new(
            &points,
            &constraints,
            &[MovingPointSpec::new(1, Point2::new(5.0, 6.0))],
        );
        let _ = problem.solve(&SolverConfig::default()).unwrap();
        assert_eq!(problem.points(), before.as_slice());
        assert_eq!(points, before);
    }

    #[test]
    fn test_iteration_limit_reports_not_converged() {
        let (points, constraints) = two_point();
        let config = SolverConfig {
            max_iterations: 1,
            ..SolverConfig::default()
        };
        let outcome = solve(
            &points,
            &constraints,
            &[MovingPointSpec::new(1, Point2::new(5.0, 6.0))],
            &config,
        )
        .unwrap();
        match outcome {
            SolveOutcome::NotConverged {
                iterations, report, ..
            } => {
                assert_eq!(iterations, 1);
                assert_eq!(report.termination, Termination::IterationLimit);
            }
            SolveOutcome::Converged { .. } => panic!("one iteration should not be enough"),
        }
    }

    #[test]
    fn test_config_serde_defaults_missing_fields() {
        let config: SolverConfig = serde_json::from_str(r#"{"max_iterations": 7}"#).unwrap();
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.feasibility_tolerance, 1e-6);
        assert_eq!(config.time_limit(), None);
    }

    #[test]
    fn test_presets() {
        assert!(SolverConfig::precise().feasibility_tolerance < SolverConfig::default().feasibility_tolerance);
        assert_eq!(
            SolverConfig::interactive().time_limit(),
            Some(Duration::from_millis(50))
        );
    }
}
