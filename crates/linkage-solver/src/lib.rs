//! Numerical solver for planar linkages.
//!
//! Points are packed into a flat vector `[x0, y0, x1, y1, ...]`, every
//! constraint contributes residuals that must vanish, and an SQP iteration
//! drags the requested points as close to their targets as the constraints
//! allow.

pub mod analysis;
pub mod constraint;
pub mod drag;
pub mod linalg;
pub mod objective;
pub mod packing;
pub mod request;
pub mod solver;
mod sqp;
pub mod validate;

pub use analysis::{ConstraintAnalysis, analyze};
pub use constraint::{Constraint, ConstraintSet, FixedAngle, FixedLength, FixedPoint};
pub use drag::{DragHistory, DragSession};
pub use objective::Objective;
pub use packing::{PackingError, pack, unpack};
pub use request::{SolveRequest, SolveResponse, solve_json, solve_request};
pub use solver::*;
pub use validate::{ValidationError, validate};

pub use linkage_types::{
    COINCIDENCE_TOLERANCE, ConstraintSpec, Line, LineId, Linkage, ModelError, MovingPointSpec,
    Point2, PointId, signed_angle, wrap_angle,
};
