//! Conversion between point lists and the flat vector the optimizer works on.
//!
//! Layout is interleaved: point `i` occupies `x[2 * i]` and `x[2 * i + 1]`.
//! Every constraint and the objective index the vector through [`slots`] or
//! [`point_at`], so the layout is defined in exactly one place.

use linkage_types::{Point2, PointId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackingError {
    #[error("flat vector has odd length {len}")]
    OddLength { len: usize },
}

/// Flatten points into `[x0, y0, x1, y1, ...]`.
pub fn pack(points: &[Point2]) -> Vec<f64> {
    let mut x = Vec::with_capacity(points.len() * 2);
    for p in points {
        x.push(p.x);
        x.push(p.y);
    }
    x
}

/// Inverse of [`pack`].
pub fn unpack(x: &[f64]) -> Result<Vec<Point2>, PackingError> {
    if x.len() % 2 != 0 {
        return Err(PackingError::OddLength { len: x.len() });
    }
    Ok(x.chunks_exact(2).map(|c| Point2::new(c[0], c[1])).collect())
}

/// Slot indices `(x, y)` of a point inside the flat vector.
pub fn slots(point: PointId) -> (usize, usize) {
    (2 * point, 2 * point + 1)
}

/// Read a point out of the flat vector.
///
/// Callers validate indices up front; see `validate::validate`.
pub fn point_at(x: &[f64], point: PointId) -> Point2 {
    let (ix, iy) = slots(point);
    Point2::new(x[ix], x[iy])
}

/// Number of points a flat vector of length `len` encodes.
pub fn point_count(len: usize) -> usize {
    len / 2
}
