//! Input checks run before any iteration.
//!
//! Everything caught here would otherwise surface as NaNs or as a solve that
//! can never converge. Checks run in a fixed order and the first failure is
//! returned.

use std::collections::HashMap;

use linkage_types::{COINCIDENCE_TOLERANCE, ConstraintSpec, Point2, PointId};
use thiserror::Error;

use crate::solver::Problem;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("point {point} has a non-finite coordinate")]
    NonFinitePoint { point: PointId },

    #[error("constraint {constraint} ({kind}) references point {point}, but only {count} points exist")]
    PointOutOfRange {
        constraint: usize,
        kind: &'static str,
        point: PointId,
        count: usize,
    },

    #[error("moving point {spec} references point {point}, but only {count} points exist")]
    MovingPointOutOfRange {
        spec: usize,
        point: PointId,
        count: usize,
    },

    #[error("moving point {spec} has a non-finite target")]
    NonFiniteTarget { spec: usize },

    #[error("constraint {constraint} ({kind}) has a non-finite value")]
    NonFiniteValue { constraint: usize, kind: &'static str },

    #[error("constraint {constraint} asks for non-positive length {length}")]
    NonPositiveLength { constraint: usize, length: f64 },

    #[error("constraint {constraint} holds the length of degenerate line {start}-{end}")]
    DegenerateLine {
        constraint: usize,
        start: PointId,
        end: PointId,
    },

    #[error("constraint {constraint} measures an angle at point {vertex} with a zero-length ray")]
    DegenerateAngle { constraint: usize, vertex: PointId },

    #[error("constraints {first} and {second} fix point {point} at different positions")]
    ConflictingFixedPoints {
        point: PointId,
        first: usize,
        second: usize,
    },

    #[error("constraints {first} and {second} hold line {start}-{end} at different lengths")]
    ConflictingLengths {
        start: PointId,
        end: PointId,
        first: usize,
        second: usize,
    },

    #[error(
        "constraint {constraint} holds {start}-{end} at {length}, but their anchors are {distance} apart"
    )]
    AnchoredLengthMismatch {
        constraint: usize,
        start: PointId,
        end: PointId,
        length: f64,
        distance: f64,
    },

    #[error("constraint {constraint} ({kind}) produced {actual} residuals, expected {expected}")]
    ArityMismatch {
        constraint: usize,
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("constraint {constraint} ({kind}) is not finite at the starting configuration")]
    NonFiniteAtStart { constraint: usize, kind: &'static str },
}

fn same_value(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-12 * (1.0 + a.abs().max(b.abs()))
}

fn same_point(a: &Point2, b: &Point2) -> bool {
    same_value(a.x, b.x) && same_value(a.y, b.y)
}

/// Relative slack allowed between a held length and the distance of two
/// fixed anchors.
const ANCHORED_LENGTH_TOLERANCE: f64 = 1e-9;

/// Check a problem before solving it.
pub fn validate(problem: &Problem) -> Result<(), ValidationError> {
    let points = problem.points();
    let count = points.len();

    if let Some(point) = points.iter().position(|p| !p.is_finite()) {
        return Err(ValidationError::NonFinitePoint { point });
    }

    for (k, c) in problem.constraints().iter().enumerate() {
        if let Some(&point) = c.point_refs().iter().find(|&&p| p >= count) {
            return Err(ValidationError::PointOutOfRange {
                constraint: k,
                kind: c.name(),
                point,
                count,
            });
        }
    }

    for (spec, (point, target)) in problem.objective().terms().iter().enumerate() {
        if *point >= count {
            return Err(ValidationError::MovingPointOutOfRange {
                spec,
                point: *point,
                count,
            });
        }
        if !target.is_finite() {
            return Err(ValidationError::NonFiniteTarget { spec });
        }
    }

    check_builtin_specs(problem)?;
    check_start_evaluation(problem)
}

fn check_builtin_specs(problem: &Problem) -> Result<(), ValidationError> {
    let points = problem.points();
    let mut anchors: HashMap<PointId, (usize, Point2)> = HashMap::new();
    let mut lengths: HashMap<(PointId, PointId), (usize, f64)> = HashMap::new();
    let mut held = Vec::new();

    for (k, c) in problem.constraints().iter().enumerate() {
        let Some(spec) = c.spec() else {
            continue;
        };
        if spec.values().iter().any(|v| !v.is_finite()) {
            return Err(ValidationError::NonFiniteValue {
                constraint: k,
                kind: spec.kind(),
            });
        }

        match spec {
            ConstraintSpec::FixedPoint { point, x, y } => {
                let at = Point2::new(x, y);
                if let Some(&(first, prev)) = anchors.get(&point) {
                    if !same_point(&prev, &at) {
                        return Err(ValidationError::ConflictingFixedPoints {
                            point,
                            first,
                            second: k,
                        });
                    }
                } else {
                    anchors.insert(point, (k, at));
                }
            }
            ConstraintSpec::FixedLength { start, end, length } => {
                if length <= 0.0 {
                    return Err(ValidationError::NonPositiveLength {
                        constraint: k,
                        length,
                    });
                }
                if start == end
                    || points[start].distance_to(&points[end]) <= COINCIDENCE_TOLERANCE
                {
                    return Err(ValidationError::DegenerateLine {
                        constraint: k,
                        start,
                        end,
                    });
                }
                let key = (start.min(end), start.max(end));
                if let Some(&(first, prev)) = lengths.get(&key) {
                    if !same_value(prev, length) {
                        return Err(ValidationError::ConflictingLengths {
                            start: key.0,
                            end: key.1,
                            first,
                            second: k,
                        });
                    }
                } else {
                    lengths.insert(key, (k, length));
                }
                held.push((k, start, end, length));
            }
            ConstraintSpec::FixedAngle { a, vertex, c, .. } => {
                let degenerate = a == vertex
                    || c == vertex
                    || a == c
                    || points[a].distance_to(&points[vertex]) <= COINCIDENCE_TOLERANCE
                    || points[c].distance_to(&points[vertex]) <= COINCIDENCE_TOLERANCE;
                if degenerate {
                    return Err(ValidationError::DegenerateAngle {
                        constraint: k,
                        vertex,
                    });
                }
            }
        }
    }

    for (k, start, end, length) in held {
        let (Some(&(_, p)), Some(&(_, q))) = (anchors.get(&start), anchors.get(&end)) else {
            continue;
        };
        let distance = p.distance_to(&q);
        if (distance - length).abs() > ANCHORED_LENGTH_TOLERANCE * (1.0 + length) {
            return Err(ValidationError::AnchoredLengthMismatch {
                constraint: k,
                start,
                end,
                length,
                distance,
            });
        }
    }
    Ok(())
}

/// Every constraint must report the residual count it declares and be finite
/// at the start, Jacobian included.
fn check_start_evaluation(problem: &Problem) -> Result<(), ValidationError> {
    let x = problem.initial_vector();
    let n = x.len();
    let mut out = Vec::new();

    for (k, c) in problem.constraints().iter().enumerate() {
        out.clear();
        c.residuals(&x, &mut out);
        let expected = c.residual_dim();
        if out.len() != expected {
            return Err(ValidationError::ArityMismatch {
                constraint: k,
                kind: c.name(),
                expected,
                actual: out.len(),
            });
        }
        let mut rows = vec![0.0; expected * n];
        c.jacobian(&x, &mut rows);
        if out.iter().chain(&rows).any(|v| !v.is_finite()) {
            return Err(ValidationError::NonFiniteAtStart {
                constraint: k,
                kind: c.name(),
            });
        }
    }
    Ok(())
}
