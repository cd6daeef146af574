//! JSON wire format for driving the solver from another process.

use linkage_types::{ConstraintSpec, MovingPointSpec, Point2};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::solver::{SolveError, SolveOutcome, SolveReport, SolverConfig, solve};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveRequest {
    pub points: Vec<Point2>,
    #[serde(default)]
    pub constraints: Vec<ConstraintSpec>,
    #[serde(default)]
    pub moves: Vec<MovingPointSpec>,
    #[serde(default)]
    pub config: SolverConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SolveResponse {
    Converged {
        points: Vec<Point2>,
        report: SolveReport,
    },
    NotConverged {
        points: Vec<Point2>,
        iterations: usize,
        report: SolveReport,
    },
    /// The request was rejected before iterating.
    Invalid { reason: String },
    /// Iteration aborted, e.g. on a non-finite evaluation.
    Failed { reason: String },
}

impl SolveResponse {
    pub fn is_converged(&self) -> bool {
        matches!(self, SolveResponse::Converged { .. })
    }
}

impl From<SolveOutcome> for SolveResponse {
    fn from(outcome: SolveOutcome) -> Self {
        match outcome {
            SolveOutcome::Converged { points, report } => SolveResponse::Converged { points, report },
            SolveOutcome::NotConverged {
                points,
                iterations,
                report,
            } => SolveResponse::NotConverged {
                points,
                iterations,
                report,
            },
        }
    }
}

/// Solve a request. Failures become response variants rather than errors.
pub fn solve_request(request: &SolveRequest) -> SolveResponse {
    match solve(
        &request.points,
        &request.constraints,
        &request.moves,
        &request.config,
    ) {
        Ok(outcome) => outcome.into(),
        Err(SolveError::Validation(err)) => SolveResponse::Invalid {
            reason: err.to_string(),
        },
        Err(err) => {
            warn!(%err, "solve request failed");
            SolveResponse::Failed {
                reason: err.to_string(),
            }
        }
    }
}

/// Parse a JSON request, solve it, and serialise the response.
///
/// Only malformed JSON is an error; everything else is reported in the
/// response body.
pub fn solve_json(input: &str) -> Result<String, SolveError> {
    let request: SolveRequest = serde_json::from_str(input)?;
    let response = solve_request(&request);
    Ok(serde_json::to_string(&response)?)
}
