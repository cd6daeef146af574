use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::ops::Sub;

use crate::linkage::ModelError;

/// Index of a point within a linkage's point list.
pub type PointId = usize;

/// Index of a line within a linkage's line list.
pub type LineId = usize;

/// Segments shorter than this are treated as zero-length.
pub const COINCIDENCE_TOLERANCE: f64 = 1e-9;

/// A point in the plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Self) -> f64 {
        self.distance_squared_to(other).sqrt()
    }

    pub fn distance_squared_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// This point shifted by `(dx, dy)`.
    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub fn to_array(&self) -> [f64; 2] {
        [self.x, self.y]
    }

    pub fn from_array(arr: [f64; 2]) -> Self {
        Self {
            x: arr[0],
            y: arr[1],
        }
    }
}

impl Sub for Point2 {
    type Output = (f64, f64);
    fn sub(self, rhs: Self) -> Self::Output {
        (self.x - rhs.x, self.y - rhs.y)
    }
}

/// A segment between two points of a linkage.
///
/// The rest length is measured once, when the line is created, and is never
/// recomputed from later coordinates. A "hold this line" constraint therefore
/// always refers to the length the line had when it was drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    start: PointId,
    end: PointId,
    rest_length: f64,
}

impl Line {
    /// Create a line between `start` and `end`, capturing its current length.
    ///
    /// Rejects out-of-range indices, a line from a point to itself, and
    /// segments whose endpoints coincide.
    pub fn between(points: &[Point2], start: PointId, end: PointId) -> Result<Self, ModelError> {
        let count = points.len();
        for point in [start, end] {
            if point >= count {
                return Err(ModelError::PointOutOfRange { point, count });
            }
        }
        if start == end {
            return Err(ModelError::SelfLoop { point: start });
        }
        let p = &points[start];
        let q = &points[end];
        if !p.is_finite() || !q.is_finite() {
            return Err(ModelError::NonFinite {
                what: format!("line endpoint {start} or {end}"),
            });
        }
        let rest_length = p.distance_to(q);
        if rest_length <= COINCIDENCE_TOLERANCE {
            return Err(ModelError::DegenerateLine { start, end });
        }
        Ok(Self {
            start,
            end,
            rest_length,
        })
    }

    /// Re-check a line that did not come from [`Line::between`], such as one
    /// read back from disk. The rest length is kept as stored, but must still
    /// be a usable length.
    pub fn check(&self, points: &[Point2]) -> Result<(), ModelError> {
        let count = points.len();
        for point in [self.start, self.end] {
            if point >= count {
                return Err(ModelError::PointOutOfRange { point, count });
            }
        }
        if self.start == self.end {
            return Err(ModelError::SelfLoop { point: self.start });
        }
        if !self.rest_length.is_finite() {
            return Err(ModelError::NonFinite {
                what: format!("rest length of line {}-{}", self.start, self.end),
            });
        }
        if self.rest_length <= COINCIDENCE_TOLERANCE {
            return Err(ModelError::DegenerateLine {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn start(&self) -> PointId {
        self.start
    }

    pub fn end(&self) -> PointId {
        self.end
    }

    /// Length captured at construction.
    pub fn rest_length(&self) -> f64 {
        self.rest_length
    }

    /// Current length of the line given some (possibly moved) coordinates.
    pub fn current_length(&self, points: &[Point2]) -> Option<f64> {
        let p = points.get(self.start)?;
        let q = points.get(self.end)?;
        Some(p.distance_to(q))
    }
}

/// Signed angle at `vertex` from the ray towards `a` to the ray towards `c`,
/// in radians within `(-PI, PI]`. Counter-clockwise is positive.
pub fn signed_angle(a: &Point2, vertex: &Point2, c: &Point2) -> f64 {
    let (ux, uy) = *a - *vertex;
    let (wx, wy) = *c - *vertex;
    let cross = ux * wy - uy * wx;
    let dot = ux * wx + uy * wy;
    cross.atan2(dot)
}

/// Wrap an angle difference into `(-PI, PI]`.
pub fn wrap_angle(delta: f64) -> f64 {
    if delta > -PI && delta <= PI {
        delta
    } else {
        let wrapped = delta.sin().atan2(delta.cos());
        if wrapped <= -PI { PI } else { wrapped }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_distance() {
        let a = Point2::new(2.0, 2.0);
        let b = Point2::new(5.0, 3.0);
        assert_abs_diff_eq!(a.distance_to(&b), 10f64.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(a.distance_squared_to(&b), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_line_captures_rest_length() {
        let mut points = vec![Point2::new(200.0, 100.0), Point2::new(200.0, 300.0)];
        let line = Line::between(&points, 0, 1).unwrap();
        assert_abs_diff_eq!(line.rest_length(), 200.0, epsilon = 1e-12);

        points[1] = Point2::new(200.0, 400.0);
        assert_abs_diff_eq!(line.rest_length(), 200.0, epsilon = 1e-12);
        assert_abs_diff_eq!(line.current_length(&points).unwrap(), 300.0, epsilon = 1e-12);
    }

    #[test]
    fn test_line_rejects_coincident_endpoints() {
        let points = vec![Point2::new(1.0, 1.0), Point2::new(1.0, 1.0)];
        let err = Line::between(&points, 0, 1).unwrap_err();
        assert!(matches!(err, ModelError::DegenerateLine { start: 0, end: 1 }));
    }

    #[test]
    fn test_line_rejects_bad_indices() {
        let points = vec![Point2::new(0.0, 0.0)];
        assert!(matches!(
            Line::between(&points, 0, 3),
            Err(ModelError::PointOutOfRange { point: 3, count: 1 })
        ));
        assert!(matches!(
            Line::between(&points, 0, 0),
            Err(ModelError::SelfLoop { point: 0 })
        ));
    }

    #[test]
    fn test_signed_angle_orientation() {
        let vertex = Point2::ORIGIN;
        let a = Point2::new(1.0, 0.0);
        let c = Point2::new(0.0, 1.0);
        assert_abs_diff_eq!(signed_angle(&a, &vertex, &c), FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(signed_angle(&c, &vertex, &a), -FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_wrap_angle() {
        assert_abs_diff_eq!(wrap_angle(0.5), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(3.0 * PI / 2.0), -FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(-3.0 * PI / 2.0), FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(PI), PI, epsilon = 1e-12);
    }
}
