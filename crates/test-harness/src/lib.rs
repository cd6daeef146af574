//! Test harness for linkage solves.
//!
//! Provides canned mechanisms, verification oracles that return verdicts
//! instead of panicking, and plain-text reports of a solve.
//!
//! # Key Components
//!
//! - [`helpers`]: Error type and scenario builders
//! - [`oracle`]: Verification functions returning pass/fail verdicts
//! - [`assertions`]: Assertion helpers with diagnostics
//! - [`report`]: Structured text reports of a solve

pub mod assertions;
pub mod helpers;
pub mod oracle;
pub mod report;

pub use helpers::{HarnessError, Scenario};
pub use oracle::OracleVerdict;
pub use report::SolveSummary;
