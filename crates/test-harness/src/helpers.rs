//! Helper functions: error type and canned linkage scenarios.

use linkage_solver::{ModelError, MovingPointSpec, Problem, SolveError};
use linkage_types::{Linkage, Point2, PointId};

// ── Error Type ──────────────────────────────────────────────────────────────

/// Unified error type for the test harness.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("assertion failed: {detail}")]
    AssertionFailed { detail: String },

    #[error("oracle failure ({oracle}): {detail}")]
    OracleFailure { oracle: String, detail: String },

    #[error("solve error: {0}")]
    Solve(#[from] SolveError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

// ── Scenarios ───────────────────────────────────────────────────────────────

/// A linkage plus the drag to apply to it.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: &'static str,
    pub linkage: Linkage,
    pub moves: Vec<MovingPointSpec>,
}

impl Scenario {
    pub fn problem(&self) -> Problem {
        Problem::from_linkage(&self.linkage, &self.moves)
    }

    pub fn point(&self, name: &str) -> Result<PointId, HarnessError> {
        Ok(self.linkage.require(name)?)
    }

    /// The same scenario with every moving point sent to `target` instead.
    pub fn with_target(mut self, target: Point2) -> Self {
        for m in &mut self.moves {
            m.target = target;
        }
        self
    }
}

/// Four-bar linkage: ground pivots `a` and `d`, coupler `b`-`c`.
///
/// a=(200,100), b=(200,300), c=(500,400), d=(500,100); `a`, `d` fixed,
/// `ab`, `bc`, `cd` held. `c` is dragged towards (600,300).
pub fn four_bar() -> Result<Scenario, HarnessError> {
    let mut linkage = Linkage::new();
    let a = linkage.add_named_point("a", Point2::new(200.0, 100.0))?;
    let b = linkage.add_named_point("b", Point2::new(200.0, 300.0))?;
    let c = linkage.add_named_point("c", Point2::new(500.0, 400.0))?;
    let d = linkage.add_named_point("d", Point2::new(500.0, 100.0))?;
    linkage.fix_point(a)?;
    linkage.fix_point(d)?;
    for (start, end) in [(a, b), (b, c), (c, d)] {
        let line = linkage.add_line(start, end)?;
        linkage.hold_line_length(line)?;
    }
    Ok(Scenario {
        name: "four_bar",
        linkage,
        moves: vec![MovingPointSpec::new(c, Point2::new(600.0, 300.0))],
    })
}

/// Pendulum: `a`=(2,2) fixed, `b`=(5,3) on a rod of fixed length, dragged
/// towards (5,6).
pub fn pendulum() -> Result<Scenario, HarnessError> {
    let mut linkage = Linkage::new();
    let a = linkage.add_named_point("a", Point2::new(2.0, 2.0))?;
    let b = linkage.add_named_point("b", Point2::new(5.0, 3.0))?;
    linkage.fix_point(a)?;
    let rod = linkage.add_line(a, b)?;
    linkage.hold_line_length(rod)?;
    Ok(Scenario {
        name: "pendulum",
        linkage,
        moves: vec![MovingPointSpec::new(b, Point2::new(5.0, 6.0))],
    })
}

/// Rigid right-angle bracket hinged at `o`: arms `o`-`p` and `o`-`q` with
/// held lengths and a held 90 degree angle. `p` is dragged upwards.
pub fn bracket() -> Result<Scenario, HarnessError> {
    let mut linkage = Linkage::new();
    let o = linkage.add_named_point("o", Point2::new(0.0, 0.0))?;
    let p = linkage.add_named_point("p", Point2::new(10.0, 0.0))?;
    let q = linkage.add_named_point("q", Point2::new(0.0, 5.0))?;
    linkage.fix_point(o)?;
    for end in [p, q] {
        let arm = linkage.add_line(o, end)?;
        linkage.hold_line_length(arm)?;
    }
    linkage.hold_angle(p, o, q)?;
    Ok(Scenario {
        name: "bracket",
        linkage,
        moves: vec![MovingPointSpec::new(p, Point2::new(5.0, 10.0))],
    })
}

/// Every canned scenario.
pub fn all_scenarios() -> Result<Vec<Scenario>, HarnessError> {
    Ok(vec![four_bar()?, pendulum()?, bracket()?])
}
