//! Verification oracles: pure functions returning pass/fail verdicts.
//!
//! Each oracle returns an `OracleVerdict` with diagnostic detail, not panics.
//! This lets a test collect all failures in one pass.

use linkage_solver::SolveOutcome;
use linkage_types::{ConstraintSpec, MovingPointSpec, Point2, signed_angle, wrap_angle};

/// The result of a single oracle check.
#[derive(Debug, Clone)]
pub struct OracleVerdict {
    pub oracle_name: String,
    pub passed: bool,
    pub detail: String,
    pub value: Option<f64>,
}

impl OracleVerdict {
    fn pass(name: &str, detail: String) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: true,
            detail,
            value: None,
        }
    }

    fn pass_val(name: &str, detail: String, value: f64) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: true,
            detail,
            value: Some(value),
        }
    }

    fn fail(name: &str, detail: String) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: false,
            detail,
            value: None,
        }
    }

    fn fail_val(name: &str, detail: String, value: f64) -> Self {
        Self {
            oracle_name: name.to_string(),
            passed: false,
            detail,
            value: Some(value),
        }
    }
}

/// Largest violation among `(label, error)` pairs as a verdict.
fn worst_violation(name: &str, what: &str, errors: Vec<(String, f64)>, tol: f64) -> OracleVerdict {
    if errors.is_empty() {
        return OracleVerdict::pass(name, format!("no {what} constraints"));
    }
    let count = errors.len();
    let (label, worst) = errors
        .into_iter()
        .fold((String::new(), 0.0_f64), |acc, (label, err)| {
            if err > acc.1 || acc.0.is_empty() {
                (label, err)
            } else {
                acc
            }
        });
    if worst <= tol {
        OracleVerdict::pass_val(
            name,
            format!("{count} {what} constraints hold, worst {label} off by {worst:.3e}"),
            worst,
        )
    } else {
        OracleVerdict::fail_val(
            name,
            format!("{label} off by {worst:.3e} (tol={tol:.1e})"),
            worst,
        )
    }
}

// ── Constraint Oracles ──────────────────────────────────────────────────────

/// Every `FixedPoint` is within `tol` of its anchor, per coordinate.
pub fn check_fixed_points(constraints: &[ConstraintSpec], points: &[Point2], tol: f64) -> OracleVerdict {
    let errors = constraints
        .iter()
        .filter_map(|c| match *c {
            ConstraintSpec::FixedPoint { point, x, y } => {
                let p = points.get(point)?;
                Some((
                    format!("point {point}"),
                    (p.x - x).abs().max((p.y - y).abs()),
                ))
            }
            _ => None,
        })
        .collect();
    worst_violation("fixed_points", "fixed-point", errors, tol)
}

/// Every `FixedLength` is within `tol` of its target length.
pub fn check_fixed_lengths(constraints: &[ConstraintSpec], points: &[Point2], tol: f64) -> OracleVerdict {
    let errors = constraints
        .iter()
        .filter_map(|c| match *c {
            ConstraintSpec::FixedLength { start, end, length } => {
                let d = points.get(start)?.distance_to(points.get(end)?);
                Some((format!("line {start}-{end}"), (d - length).abs()))
            }
            _ => None,
        })
        .collect();
    worst_violation("fixed_lengths", "fixed-length", errors, tol)
}

/// Every `FixedAngle` is within `tol` radians of its target.
pub fn check_fixed_angles(constraints: &[ConstraintSpec], points: &[Point2], tol: f64) -> OracleVerdict {
    let errors = constraints
        .iter()
        .filter_map(|c| match *c {
            ConstraintSpec::FixedAngle {
                a,
                vertex,
                c,
                angle,
            } => {
                let current = signed_angle(points.get(a)?, points.get(vertex)?, points.get(c)?);
                Some((format!("angle at {vertex}"), wrap_angle(current - angle).abs()))
            }
            _ => None,
        })
        .collect();
    worst_violation("fixed_angles", "fixed-angle", errors, tol)
}

/// All coordinates are finite.
pub fn check_finite(points: &[Point2]) -> OracleVerdict {
    match points.iter().position(|p| !p.is_finite()) {
        None => OracleVerdict::pass("finite", format!("all {} points finite", points.len())),
        Some(i) => OracleVerdict::fail("finite", format!("point {i} is {:?}", points[i])),
    }
}

// ── Motion Oracles ──────────────────────────────────────────────────────────

/// Every moving point ended no farther from its target than it started, and
/// the total squared distance did not grow.
pub fn check_moved_closer(
    before: &[Point2],
    after: &[Point2],
    moves: &[MovingPointSpec],
) -> OracleVerdict {
    let mut start = 0.0;
    let mut end = 0.0;
    for m in moves {
        let (Some(b), Some(a)) = (before.get(m.point), after.get(m.point)) else {
            return OracleVerdict::fail("moved_closer", format!("point {} missing", m.point));
        };
        start += b.distance_squared_to(&m.target);
        end += a.distance_squared_to(&m.target);
    }
    if end <= start {
        OracleVerdict::pass_val(
            "moved_closer",
            format!("objective {start:.4} -> {end:.4}"),
            end,
        )
    } else {
        OracleVerdict::fail_val(
            "moved_closer",
            format!("objective grew {start:.4} -> {end:.4}"),
            end,
        )
    }
}

/// Points with no motion requested and pinned by a `FixedPoint` did not move.
pub fn check_anchors_unchanged(
    constraints: &[ConstraintSpec],
    before: &[Point2],
    after: &[Point2],
    tol: f64,
) -> OracleVerdict {
    let errors = constraints
        .iter()
        .filter_map(|c| match *c {
            ConstraintSpec::FixedPoint { point, .. } => Some((
                format!("point {point}"),
                before.get(point)?.distance_to(after.get(point)?),
            )),
            _ => None,
        })
        .collect();
    worst_violation("anchors_unchanged", "anchor", errors, tol)
}

/// Run every oracle against a solve outcome.
///
/// A non-converged outcome fails the `converged` verdict but the geometric
/// oracles still run, so the report shows how far off it was.
pub fn verify_outcome(
    constraints: &[ConstraintSpec],
    before: &[Point2],
    moves: &[MovingPointSpec],
    outcome: &SolveOutcome,
    tol: f64,
) -> Vec<OracleVerdict> {
    let after = outcome.points();
    let report = outcome.report();
    let converged = if outcome.is_converged() {
        OracleVerdict::pass_val(
            "converged",
            format!("after {} iterations", report.iterations),
            report.max_residual,
        )
    } else {
        OracleVerdict::fail_val(
            "converged",
            format!(
                "stopped after {} iterations ({:?})",
                report.iterations, report.termination
            ),
            report.max_residual,
        )
    };
    vec![
        converged,
        check_finite(after),
        check_fixed_points(constraints, after, tol),
        check_fixed_lengths(constraints, after, tol),
        check_fixed_angles(constraints, after, tol),
        check_anchors_unchanged(constraints, before, after, tol),
        check_moved_closer(before, after, moves),
    ]
}
