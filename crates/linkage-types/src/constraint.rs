use serde::{Deserialize, Serialize};

use crate::geometry::{Line, Point2, PointId};

/// An equality constraint on the points of a linkage.
///
/// Every variant addresses points purely by index, so several constraints
/// may refer to the same point without any aliasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ConstraintSpec {
    /// Point is pinned at `(x, y)`. Two residuals, one per coordinate.
    FixedPoint { point: PointId, x: f64, y: f64 },
    /// Distance between `start` and `end` equals `length`. One residual.
    FixedLength {
        start: PointId,
        end: PointId,
        length: f64,
    },
    /// Signed angle at `vertex` from ray `vertex -> a` to ray `vertex -> c`
    /// equals `angle` (radians, counter-clockwise positive). One residual.
    FixedAngle {
        a: PointId,
        vertex: PointId,
        c: PointId,
        angle: f64,
    },
}

impl ConstraintSpec {
    /// Pin `point` at `at`.
    pub fn fixed_point(point: PointId, at: Point2) -> Self {
        Self::FixedPoint {
            point,
            x: at.x,
            y: at.y,
        }
    }

    /// Hold `line` at an explicit length.
    pub fn fixed_length(line: &Line, length: f64) -> Self {
        Self::FixedLength {
            start: line.start(),
            end: line.end(),
            length,
        }
    }

    /// Hold `line` at the length it had when it was created.
    pub fn hold_line(line: &Line) -> Self {
        Self::fixed_length(line, line.rest_length())
    }

    pub fn fixed_angle(a: PointId, vertex: PointId, c: PointId, angle: f64) -> Self {
        Self::FixedAngle {
            a,
            vertex,
            c,
            angle,
        }
    }

    /// Short name of the constraint kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ConstraintSpec::FixedPoint { .. } => "fixed_point",
            ConstraintSpec::FixedLength { .. } => "fixed_length",
            ConstraintSpec::FixedAngle { .. } => "fixed_angle",
        }
    }

    /// Number of scalar residuals this constraint contributes.
    pub fn residual_dim(&self) -> usize {
        match self {
            ConstraintSpec::FixedPoint { .. } => 2,
            ConstraintSpec::FixedLength { .. } | ConstraintSpec::FixedAngle { .. } => 1,
        }
    }

    /// Every point index the constraint reads.
    pub fn point_refs(&self) -> Vec<PointId> {
        match self {
            ConstraintSpec::FixedPoint { point, .. } => vec![*point],
            ConstraintSpec::FixedLength { start, end, .. } => vec![*start, *end],
            ConstraintSpec::FixedAngle { a, vertex, c, .. } => vec![*a, *vertex, *c],
        }
    }

    /// The literal values carried by the constraint.
    pub fn values(&self) -> Vec<f64> {
        match self {
            ConstraintSpec::FixedPoint { x, y, .. } => vec![*x, *y],
            ConstraintSpec::FixedLength { length, .. } => vec![*length],
            ConstraintSpec::FixedAngle { angle, .. } => vec![*angle],
        }
    }
}

/// A request to drag one point towards a target.
///
/// The objective sums the squared distance of every moving point to its
/// target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovingPointSpec {
    pub point: PointId,
    pub target: Point2,
}

impl MovingPointSpec {
    pub fn new(point: PointId, target: Point2) -> Self {
        Self { point, target }
    }

    /// Target `point` at its current position `origin` shifted by `(dx, dy)`.
    pub fn displaced(point: PointId, origin: &Point2, dx: f64, dy: f64) -> Self {
        Self {
            point,
            target: origin.offset(dx, dy),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hold_line_uses_rest_length() {
        let points = vec![Point2::new(2.0, 2.0), Point2::new(5.0, 3.0)];
        let line = Line::between(&points, 0, 1).unwrap();
        match ConstraintSpec::hold_line(&line) {
            ConstraintSpec::FixedLength { start, end, length } => {
                assert_eq!((start, end), (0, 1));
                assert!((length - 10f64.sqrt()).abs() < 1e-12);
            }
            other => panic!("unexpected constraint {:?}", other),
        }
    }

    #[test]
    fn test_residual_dims() {
        assert_eq!(ConstraintSpec::fixed_point(0, Point2::ORIGIN).residual_dim(), 2);
        assert_eq!(
            ConstraintSpec::FixedLength {
                start: 0,
                end: 1,
                length: 1.0
            }
            .residual_dim(),
            1
        );
        assert_eq!(ConstraintSpec::fixed_angle(0, 1, 2, 0.5).residual_dim(), 1);
    }

    #[test]
    fn test_point_refs_order() {
        let spec = ConstraintSpec::fixed_angle(4, 2, 7, 1.0);
        assert_eq!(spec.point_refs(), vec![4, 2, 7]);
        assert_eq!(spec.kind(), "fixed_angle");
    }

    #[test]
    fn test_displaced_target() {
        let spec = MovingPointSpec::displaced(2, &Point2::new(500.0, 400.0), 100.0, -20.0);
        assert_eq!(spec.point, 2);
        assert_eq!(spec.target, Point2::new(600.0, 380.0));
    }

    #[test]
    fn test_serde_tagged_json() {
        let spec = ConstraintSpec::fixed_point(3, Point2::new(1.5, -2.0));
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("\"type\":\"FixedPoint\""));
        let back: ConstraintSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(back, spec);
    }
}
