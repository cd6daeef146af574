//! Structured text reports of a solve.
//!
//! Reports are plain text so a failing test prints something a person can
//! read straight from the log.

use std::fmt;

use linkage_solver::{SolveOutcome, SolveReport, SolverConfig};
use linkage_types::{Linkage, Point2};

use crate::helpers::{HarnessError, Scenario};
use crate::oracle::{OracleVerdict, verify_outcome};

/// Tolerance the scenario runner checks constraints against.
pub const SCENARIO_TOLERANCE: f64 = 1e-4;

/// One point's motion during a solve.
pub struct PointEntry {
    pub index: usize,
    pub name: Option<String>,
    pub before: Point2,
    pub after: Point2,
}

/// A complete solve report with all sections.
pub struct SolveSummary {
    pub scenario: String,
    pub converged: bool,
    pub report: SolveReport,
    pub points: Vec<PointEntry>,
    pub oracle_results: Vec<OracleVerdict>,
}

impl SolveSummary {
    /// Summarise `outcome` as a solve of `linkage` from its current points.
    pub fn new(
        scenario: &str,
        linkage: &Linkage,
        outcome: &SolveOutcome,
        oracle_results: Vec<OracleVerdict>,
    ) -> Self {
        let points = linkage
            .points()
            .iter()
            .zip(outcome.points())
            .enumerate()
            .map(|(index, (before, after))| PointEntry {
                index,
                name: linkage.name_of(index).map(str::to_string),
                before: *before,
                after: *after,
            })
            .collect();
        Self {
            scenario: scenario.to_string(),
            converged: outcome.is_converged(),
            report: outcome.report().clone(),
            points,
            oracle_results,
        }
    }

    pub fn all_passed(&self) -> bool {
        self.oracle_results.iter().all(|v| v.passed)
    }

    /// Format the report as text.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("=== Linkage Solve Report: {} ===\n\n", self.scenario));

        let status = if self.converged { "CONVERGED" } else { "NOT CONVERGED" };
        out.push_str(&format!(
            "Status: {} ({:?}) after {} iterations\n",
            status, self.report.termination, self.report.iterations,
        ));
        out.push_str(&format!(
            "Objective: {:.6} | max residual {:.3e} | stationarity {:.3e}\n",
            self.report.objective, self.report.max_residual, self.report.stationarity,
        ));

        let a = &self.report.analysis;
        out.push_str(&format!(
            "Constraints: {} equations over {} variables, rank {}, {} dof, {} redundant\n",
            a.equations, a.variables, a.rank, a.dof, a.redundant,
        ));

        out.push_str(&format!("\nPoints ({}):\n", self.points.len()));
        for p in &self.points {
            let label = p.name.as_deref().unwrap_or("-");
            let moved = p.before.distance_to(&p.after);
            out.push_str(&format!(
                "  [{}] {}: ({:.4}, {:.4}) -> ({:.4}, {:.4})  moved {:.4}\n",
                p.index, label, p.before.x, p.before.y, p.after.x, p.after.y, moved,
            ));
        }

        if !self.oracle_results.is_empty() {
            out.push_str(&format!(
                "\nOracle Results ({} checks):\n",
                self.oracle_results.len()
            ));
            for v in &self.oracle_results {
                let status = if v.passed { "PASS" } else { "FAIL" };
                out.push_str(&format!("  [{}] {}: {}\n", status, v.oracle_name, v.detail));
            }
        }

        out
    }
}

impl fmt::Display for SolveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_text())
    }
}

impl Scenario {
    /// Solve the scenario with `config` and verify the result.
    pub fn run(&self, config: &SolverConfig) -> Result<SolveSummary, HarnessError> {
        let outcome = self.problem().solve(config)?;
        let verdicts = verify_outcome(
            self.linkage.constraints(),
            self.linkage.points(),
            &self.moves,
            &outcome,
            SCENARIO_TOLERANCE,
        );
        Ok(SolveSummary::new(self.name, &self.linkage, &outcome, verdicts))
    }
}

/// The solver's own report as JSON, for attaching to failures.
pub fn report_json(report: &SolveReport) -> Result<String, HarnessError> {
    serde_json::to_string_pretty(report).map_err(|e| HarnessError::AssertionFailed {
        detail: format!("report serialisation failed: {e}"),
    })
}
