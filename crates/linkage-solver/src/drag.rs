//! Interactive dragging on top of a [`Linkage`].

use linkage_types::{Linkage, MovingPointSpec, Point2, PointId};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::solver::{Problem, SolveError, SolveOutcome, SolverConfig};

/// Counts of drags applied to or refused by a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DragHistory {
    pub committed: usize,
    pub rejected: usize,
}

/// A linkage being edited by dragging points.
///
/// Each drag solves with the linkage's own constraints and writes the result
/// back only when the solve converged. Anything else leaves the linkage as it
/// was, so the session always holds a consistent configuration.
#[derive(Debug, Clone)]
pub struct DragSession {
    linkage: Linkage,
    config: SolverConfig,
    history: DragHistory,
}

impl DragSession {
    pub fn new(linkage: Linkage, config: SolverConfig) -> Self {
        Self {
            linkage,
            config,
            history: DragHistory::default(),
        }
    }

    pub fn linkage(&self) -> &Linkage {
        &self.linkage
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    pub fn history(&self) -> DragHistory {
        self.history
    }

    pub fn into_linkage(self) -> Linkage {
        self.linkage
    }

    /// Drag `point` towards `target`.
    #[instrument(skip(self), fields(committed = self.history.committed))]
    pub fn drag_to(&mut self, point: PointId, target: Point2) -> Result<SolveOutcome, SolveError> {
        let problem = Problem::from_linkage(&self.linkage, &[MovingPointSpec::new(point, target)]);
        let outcome = match problem.solve(&self.config) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.history.rejected += 1;
                return Err(err);
            }
        };

        match outcome.converged_points() {
            Some(points) => {
                self.linkage.apply(points)?;
                self.history.committed += 1;
                debug!(point, "drag committed");
            }
            None => {
                self.history.rejected += 1;
                debug!(point, "drag rejected, linkage unchanged");
            }
        }
        Ok(outcome)
    }

    /// Drag `point` by `(dx, dy)` from where it currently is.
    pub fn drag_by(&mut self, point: PointId, dx: f64, dy: f64) -> Result<SolveOutcome, SolveError> {
        let origin = self.linkage.position(point)?;
        let spec = MovingPointSpec::displaced(point, &origin, dx, dy);
        self.drag_to(point, spec.target)
    }

    /// Drag `point` to `target` in `steps` equal increments, committing each.
    ///
    /// Large jumps can flip a linkage into another assembly mode; small steps
    /// track the branch the mechanism is on. Stops at the first increment that
    /// does not converge and returns its outcome.
    pub fn drag_along(
        &mut self,
        point: PointId,
        target: Point2,
        steps: usize,
    ) -> Result<SolveOutcome, SolveError> {
        let start = self.linkage.position(point)?;
        let steps = steps.max(1);
        let waypoint = |i: usize| {
            let t = i as f64 / steps as f64;
            Point2::new(
                start.x + (target.x - start.x) * t,
                start.y + (target.y - start.y) * t,
            )
        };
        let mut outcome = self.drag_to(point, waypoint(1))?;
        for i in 2..=steps {
            if !outcome.is_converged() {
                break;
            }
            outcome = self.drag_to(point, waypoint(i))?;
        }
        Ok(outcome)
    }
}
