use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constraint::ConstraintSpec;
use crate::geometry::{COINCIDENCE_TOLERANCE, Line, LineId, Point2, PointId, signed_angle};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("point {point} is out of range ({count} points)")]
    PointOutOfRange { point: PointId, count: usize },
    #[error("line {line} is out of range ({count} lines)")]
    LineOutOfRange { line: LineId, count: usize },
    #[error("line from point {point} to itself")]
    SelfLoop { point: PointId },
    #[error("line {start}-{end} has zero length")]
    DegenerateLine { start: PointId, end: PointId },
    #[error("angle at point {vertex} has a zero-length ray")]
    DegenerateAngle { vertex: PointId },
    #[error("non-finite value in {what}")]
    NonFinite { what: String },
    #[error("no point named {name:?}")]
    UnknownName { name: String },
    #[error("point name {name:?} is already taken")]
    DuplicateName { name: String },
    #[error("expected {expected} points, got {actual}")]
    PointCountMismatch { expected: usize, actual: usize },
}

/// An arena of points, the lines drawn between them, and the constraints
/// that hold the mechanism together.
///
/// Points are addressed by their index, which stays stable for the lifetime
/// of the linkage. The solver never touches a `Linkage` directly; converged
/// coordinates are written back with [`Linkage::apply`].
///
/// Deserialising re-runs the builder's checks, so a stored linkage with a
/// zero-length line or a dangling index is rejected on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "StoredLinkage")]
pub struct Linkage {
    points: Vec<Point2>,
    names: Vec<Option<String>>,
    lines: Vec<Line>,
    constraints: Vec<ConstraintSpec>,
}

/// Unchecked wire form of [`Linkage`].
#[derive(Deserialize)]
struct StoredLinkage {
    points: Vec<Point2>,
    #[serde(default)]
    names: Vec<Option<String>>,
    #[serde(default)]
    lines: Vec<Line>,
    #[serde(default)]
    constraints: Vec<ConstraintSpec>,
}

impl TryFrom<StoredLinkage> for Linkage {
    type Error = ModelError;

    fn try_from(stored: StoredLinkage) -> Result<Self, Self::Error> {
        let mut linkage = Linkage::new();
        let mut names = stored.names.into_iter();
        for at in stored.points {
            match names.next().flatten() {
                Some(name) => linkage.add_named_point(&name, at)?,
                None => linkage.add_point(at)?,
            };
        }
        let extra = names.count();
        if extra > 0 {
            return Err(ModelError::PointCountMismatch {
                expected: linkage.points.len(),
                actual: linkage.points.len() + extra,
            });
        }
        for line in &stored.lines {
            line.check(&linkage.points)?;
        }
        linkage.lines = stored.lines;
        let count = linkage.points.len();
        for spec in &stored.constraints {
            if let Some(point) = spec.point_refs().into_iter().find(|&p| p >= count) {
                return Err(ModelError::PointOutOfRange { point, count });
            }
        }
        linkage.constraints = stored.constraints;
        Ok(linkage)
    }
}

impl Linkage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an anonymous point, returning its index.
    pub fn add_point(&mut self, at: Point2) -> Result<PointId, ModelError> {
        if !at.is_finite() {
            return Err(ModelError::NonFinite {
                what: format!("point ({}, {})", at.x, at.y),
            });
        }
        let id = self.points.len();
        self.points.push(at);
        self.names.push(None);
        Ok(id)
    }

    /// Add a point that can later be looked up by `name`.
    pub fn add_named_point(&mut self, name: &str, at: Point2) -> Result<PointId, ModelError> {
        if self.point_by_name(name).is_some() {
            return Err(ModelError::DuplicateName {
                name: name.to_string(),
            });
        }
        let id = self.add_point(at)?;
        self.names[id] = Some(name.to_string());
        Ok(id)
    }

    pub fn point_by_name(&self, name: &str) -> Option<PointId> {
        self.names
            .iter()
            .position(|n| n.as_deref() == Some(name))
    }

    pub fn name_of(&self, point: PointId) -> Option<&str> {
        self.names.get(point).and_then(|n| n.as_deref())
    }

    /// Look up a named point, failing with [`ModelError::UnknownName`].
    pub fn require(&self, name: &str) -> Result<PointId, ModelError> {
        self.point_by_name(name)
            .ok_or_else(|| ModelError::UnknownName {
                name: name.to_string(),
            })
    }

    /// Draw a line between two points, capturing its current length.
    pub fn add_line(&mut self, start: PointId, end: PointId) -> Result<LineId, ModelError> {
        let line = Line::between(&self.points, start, end)?;
        let id = self.lines.len();
        self.lines.push(line);
        Ok(id)
    }

    /// Pin a point where it currently is.
    pub fn fix_point(&mut self, point: PointId) -> Result<(), ModelError> {
        let at = self.position(point)?;
        self.constraints.push(ConstraintSpec::fixed_point(point, at));
        Ok(())
    }

    /// Pin a point at an explicit location.
    pub fn fix_point_at(&mut self, point: PointId, at: Point2) -> Result<(), ModelError> {
        self.position(point)?;
        if !at.is_finite() {
            return Err(ModelError::NonFinite {
                what: format!("fixed position of point {point}"),
            });
        }
        self.constraints.push(ConstraintSpec::fixed_point(point, at));
        Ok(())
    }

    /// Hold a line at its rest length.
    pub fn hold_line_length(&mut self, line: LineId) -> Result<(), ModelError> {
        let line = *self.line(line)?;
        self.constraints.push(ConstraintSpec::hold_line(&line));
        Ok(())
    }

    /// Hold a line at an explicit length.
    pub fn fix_line_length(&mut self, line: LineId, length: f64) -> Result<(), ModelError> {
        let line = *self.line(line)?;
        if !length.is_finite() {
            return Err(ModelError::NonFinite {
                what: format!("length of line {}-{}", line.start(), line.end()),
            });
        }
        self.constraints.push(ConstraintSpec::fixed_length(&line, length));
        Ok(())
    }

    /// Hold the signed angle `a`-`vertex`-`c` at `angle` radians.
    pub fn fix_angle(
        &mut self,
        a: PointId,
        vertex: PointId,
        c: PointId,
        angle: f64,
    ) -> Result<(), ModelError> {
        self.check_angle(a, vertex, c)?;
        if !angle.is_finite() {
            return Err(ModelError::NonFinite {
                what: format!("angle at point {vertex}"),
            });
        }
        self.constraints
            .push(ConstraintSpec::fixed_angle(a, vertex, c, angle));
        Ok(())
    }

    /// Hold the angle `a`-`vertex`-`c` at its current value.
    pub fn hold_angle(&mut self, a: PointId, vertex: PointId, c: PointId) -> Result<(), ModelError> {
        self.check_angle(a, vertex, c)?;
        let angle = signed_angle(&self.points[a], &self.points[vertex], &self.points[c]);
        self.constraints
            .push(ConstraintSpec::fixed_angle(a, vertex, c, angle));
        Ok(())
    }

    fn check_angle(&self, a: PointId, vertex: PointId, c: PointId) -> Result<(), ModelError> {
        let pa = self.position(a)?;
        let pv = self.position(vertex)?;
        let pc = self.position(c)?;
        if pa.distance_to(&pv) <= COINCIDENCE_TOLERANCE || pc.distance_to(&pv) <= COINCIDENCE_TOLERANCE
        {
            return Err(ModelError::DegenerateAngle { vertex });
        }
        Ok(())
    }

    /// Append an arbitrary constraint without checking it; the solver
    /// validates everything before iterating.
    pub fn push_constraint(&mut self, constraint: ConstraintSpec) {
        self.constraints.push(constraint);
    }

    pub fn position(&self, point: PointId) -> Result<Point2, ModelError> {
        self.points
            .get(point)
            .copied()
            .ok_or(ModelError::PointOutOfRange {
                point,
                count: self.points.len(),
            })
    }

    pub fn line(&self, line: LineId) -> Result<&Line, ModelError> {
        self.lines.get(line).ok_or(ModelError::LineOutOfRange {
            line,
            count: self.lines.len(),
        })
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn constraints(&self) -> &[ConstraintSpec] {
        &self.constraints
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Replace every coordinate with solver output. The point count must match.
    pub fn apply(&mut self, points: &[Point2]) -> Result<(), ModelError> {
        if points.len() != self.points.len() {
            return Err(ModelError::PointCountMismatch {
                expected: self.points.len(),
                actual: points.len(),
            });
        }
        if let Some(bad) = points.iter().position(|p| !p.is_finite()) {
            return Err(ModelError::NonFinite {
                what: format!("solved point {bad}"),
            });
        }
        self.points.copy_from_slice(points);
        Ok(())
    }
}
