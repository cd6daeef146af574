//! Tests for verification oracles.

use linkage_types::{ConstraintSpec, MovingPointSpec, Point2};
use test_harness::assertions::assert_all_pass;
use test_harness::oracle::*;

fn bar() -> (Vec<ConstraintSpec>, Vec<Point2>) {
    let points = vec![Point2::new(0.0, 0.0), Point2::new(3.0, 4.0)];
    let constraints = vec![
        ConstraintSpec::fixed_point(0, Point2::ORIGIN),
        ConstraintSpec::FixedLength {
            start: 0,
            end: 1,
            length: 5.0,
        },
    ];
    (constraints, points)
}

// ── Constraint Oracle Tests ─────────────────────────────────────────────────

#[test]
fn satisfied_constraints_pass() {
    let (constraints, points) = bar();
    let verdicts = [
        check_fixed_points(&constraints, &points, 1e-9),
        check_fixed_lengths(&constraints, &points, 1e-9),
        check_fixed_angles(&constraints, &points, 1e-9),
        check_finite(&points),
    ];
    assert_all_pass(&verdicts, "bar").unwrap();
}

#[test]
fn violated_length_fails_with_value() {
    let (constraints, mut points) = bar();
    points[1] = Point2::new(6.0, 0.0);
    let verdict = check_fixed_lengths(&constraints, &points, 1e-6);
    assert!(!verdict.passed);
    assert_eq!(verdict.value, Some(1.0));
    assert!(verdict.detail.contains("line 0-1"), "{}", verdict.detail);
}

#[test]
fn moved_anchor_fails() {
    let (constraints, points) = bar();
    let mut after = points.clone();
    after[0] = Point2::new(0.5, 0.0);
    assert!(!check_fixed_points(&constraints, &after, 1e-6).passed);
    assert!(!check_anchors_unchanged(&constraints, &points, &after, 1e-6).passed);
}

#[test]
fn angle_oracle_wraps() {
    let points = vec![
        Point2::new(1.0, 0.0),
        Point2::ORIGIN,
        Point2::new(-1.0, -1e-12),
    ];
    let constraints = vec![ConstraintSpec::FixedAngle {
        a: 0,
        vertex: 1,
        c: 2,
        angle: std::f64::consts::PI,
    }];
    assert!(check_fixed_angles(&constraints, &points, 1e-9).passed);
}

#[test]
fn non_finite_points_fail() {
    let points = vec![Point2::new(f64::NAN, 0.0)];
    assert!(!check_finite(&points).passed);
}

// ── Motion Oracle Tests ─────────────────────────────────────────────────────

#[test]
fn moved_closer_compares_objective() {
    let moves = [MovingPointSpec::new(0, Point2::new(10.0, 0.0))];
    let before = [Point2::ORIGIN];
    assert!(check_moved_closer(&before, &[Point2::new(4.0, 0.0)], &moves).passed);
    assert!(!check_moved_closer(&before, &[Point2::new(-1.0, 0.0)], &moves).passed);
}

#[test]
fn moved_closer_reports_missing_point() {
    let moves = [MovingPointSpec::new(3, Point2::ORIGIN)];
    let verdict = check_moved_closer(&[Point2::ORIGIN], &[Point2::ORIGIN], &moves);
    assert!(!verdict.passed);
}

#[test]
fn assert_all_pass_lists_every_failure() {
    let (constraints, _) = bar();
    let bad = vec![Point2::new(1.0, 1.0), Point2::new(9.0, 9.0)];
    let verdicts = [
        check_fixed_points(&constraints, &bad, 1e-6),
        check_fixed_lengths(&constraints, &bad, 1e-6),
    ];
    let err = assert_all_pass(&verdicts, "bad").unwrap_err().to_string();
    assert!(err.contains("fixed_points"), "{err}");
    assert!(err.contains("fixed_lengths"), "{err}");
}
