//! Assertion helpers with diagnostic output.
//!
//! Every failure includes the caller's context string and expected vs actual
//! values.

use linkage_solver::SolveOutcome;
use linkage_types::Point2;

use crate::helpers::HarnessError;
use crate::oracle::OracleVerdict;

/// Assert the solve converged.
pub fn assert_converged(outcome: &SolveOutcome, ctx: &str) -> Result<(), HarnessError> {
    if outcome.is_converged() {
        return Ok(());
    }
    let report = outcome.report();
    Err(HarnessError::AssertionFailed {
        detail: format!(
            "[{}] expected convergence, stopped after {} iterations ({:?}), max residual {:.3e}",
            ctx, report.iterations, report.termination, report.max_residual,
        ),
    })
}

/// Assert the solve did not claim convergence.
pub fn assert_not_converged(outcome: &SolveOutcome, ctx: &str) -> Result<(), HarnessError> {
    if outcome.is_converged() {
        Err(HarnessError::AssertionFailed {
            detail: format!(
                "[{}] expected no convergence, converged with max residual {:.3e}",
                ctx,
                outcome.report().max_residual,
            ),
        })
    } else {
        Ok(())
    }
}

/// Assert a point lies within `tol` of `expected`.
pub fn assert_point_near(
    actual: &Point2,
    expected: &Point2,
    tol: f64,
    ctx: &str,
) -> Result<(), HarnessError> {
    let d = actual.distance_to(expected);
    if d <= tol {
        Ok(())
    } else {
        Err(HarnessError::AssertionFailed {
            detail: format!(
                "[{}] expected ({:.6}, {:.6}), got ({:.6}, {:.6}), off by {:.3e} (tol={})",
                ctx, expected.x, expected.y, actual.x, actual.y, d, tol,
            ),
        })
    }
}

/// Assert every verdict passed, listing all failures at once.
pub fn assert_all_pass(verdicts: &[OracleVerdict], ctx: &str) -> Result<(), HarnessError> {
    let failures: Vec<String> = verdicts
        .iter()
        .filter(|v| !v.passed)
        .map(|v| format!("{}: {}", v.oracle_name, v.detail))
        .collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(HarnessError::OracleFailure {
            oracle: ctx.to_string(),
            detail: failures.join("; "),
        })
    }
}
