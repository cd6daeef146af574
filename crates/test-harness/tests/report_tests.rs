//! Tests for the report module.

use linkage_solver::SolverConfig;
use test_harness::helpers::{four_bar, pendulum};
use test_harness::report::report_json;

#[test]
fn report_lists_status_and_points() {
    let summary = pendulum().unwrap().run(&SolverConfig::default()).unwrap();
    let text = summary.to_text();
    assert!(text.contains("=== Linkage Solve Report: pendulum ==="), "{text}");
    assert!(text.contains("Status: CONVERGED"), "{text}");
    assert!(text.contains("Points (2):"), "{text}");
    assert!(text.contains("] a: "), "{text}");
    assert!(text.contains("] b: "), "{text}");
}

#[test]
fn report_contains_constraint_analysis() {
    let summary = four_bar().unwrap().run(&SolverConfig::default()).unwrap();
    let text = summary.to_string();
    assert!(
        text.contains("7 equations over 8 variables, rank 7, 1 dof, 0 redundant"),
        "{text}"
    );
}

#[test]
fn report_contains_oracle_section() {
    let summary = four_bar().unwrap().run(&SolverConfig::default()).unwrap();
    let text = summary.to_text();
    assert!(text.contains("Oracle Results (7 checks):"), "{text}");
    assert!(text.contains("[PASS] fixed_lengths"), "{text}");
    assert!(!text.contains("[FAIL]"), "{text}");
}

#[test]
fn non_converged_report_says_so() {
    let config = SolverConfig {
        max_iterations: 1,
        ..SolverConfig::default()
    };
    let summary = four_bar().unwrap().run(&config).unwrap();
    assert!(!summary.converged);
    assert!(summary.to_text().contains("NOT CONVERGED"));
    assert!(!summary.all_passed());
}

#[test]
fn report_json_has_termination() {
    let summary = pendulum().unwrap().run(&SolverConfig::default()).unwrap();
    let json = report_json(&summary.report).unwrap();
    assert!(json.contains("\"termination\": \"Converged\""), "{json}");
}
