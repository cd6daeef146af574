//! Integration tests for the public solve API.

use std::f64::consts::{FRAC_PI_2, PI};

use approx::assert_abs_diff_eq;
use linkage_solver::{
    ConstraintSpec, DragSession, Linkage, MovingPointSpec, Point2, Problem, SolveError,
    SolveOutcome, SolveResponse, SolverConfig, Termination, ValidationError, analyze,
    signed_angle, solve, solve_json,
};

fn four_bar() -> (Vec<Point2>, Vec<ConstraintSpec>) {
    let points = vec![
        Point2::new(200.0, 100.0),
        Point2::new(200.0, 300.0),
        Point2::new(500.0, 400.0),
        Point2::new(500.0, 100.0),
    ];
    let length = |i: usize, j: usize| ConstraintSpec::FixedLength {
        start: i,
        end: j,
        length: points[i].distance_to(&points[j]),
    };
    let constraints = vec![
        ConstraintSpec::fixed_point(0, points[0]),
        ConstraintSpec::fixed_point(3, points[3]),
        length(0, 1),
        length(1, 2),
        length(2, 3),
    ];
    (points, constraints)
}

#[test]
fn four_bar_drag_towards_target() {
    let (points, constraints) = four_bar();
    let target = Point2::new(600.0, 300.0);
    let outcome = solve(
        &points,
        &constraints,
        &[MovingPointSpec::new(2, target)],
        &SolverConfig::default(),
    )
    .unwrap();
    assert!(outcome.is_converged(), "{:?}", outcome.report());

    let p = outcome.points();
    assert_abs_diff_eq!(p[0].x, 200.0, epsilon = 1e-6);
    assert_abs_diff_eq!(p[0].y, 100.0, epsilon = 1e-6);
    assert_abs_diff_eq!(p[3].x, 500.0, epsilon = 1e-6);
    assert_abs_diff_eq!(p[3].y, 100.0, epsilon = 1e-6);
    assert_abs_diff_eq!(p[0].distance_to(&p[1]), 200.0, epsilon = 1e-4);
    assert_abs_diff_eq!(p[1].distance_to(&p[2]), 100000f64.sqrt(), epsilon = 1e-4);
    assert_abs_diff_eq!(p[2].distance_to(&p[3]), 300.0, epsilon = 1e-4);
    assert!(p[2].distance_to(&target) < points[2].distance_to(&target));
}

#[test]
fn resolving_converged_output_is_stable() {
    let (points, constraints) = four_bar();
    let moves = [MovingPointSpec::new(2, Point2::new(600.0, 300.0))];
    let config = SolverConfig::default();
    let first = solve(&points, &constraints, &moves, &config).unwrap();
    let second = solve(first.points(), &constraints, &moves, &config).unwrap();
    assert!(second.is_converged());
    for (a, b) in first.points().iter().zip(second.points()) {
        assert!(a.distance_to(b) <= 1e-4, "{a:?} vs {b:?}");
    }
}

#[test]
fn identical_inputs_give_identical_outputs() {
    let (points, constraints) = four_bar();
    let moves = [MovingPointSpec::new(2, Point2::new(600.0, 300.0))];
    let config = SolverConfig::default();
    let a = solve(&points, &constraints, &moves, &config).unwrap();
    let b = solve(&points, &constraints, &moves, &config).unwrap();
    assert_eq!(a, b);
}

#[test]
fn conflicting_lengths_are_rejected() {
    let (points, mut constraints) = four_bar();
    constraints.push(ConstraintSpec::FixedLength {
        start: 1,
        end: 0,
        length: 150.0,
    });
    let err = solve(&points, &constraints, &[], &SolverConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Validation(ValidationError::ConflictingLengths { .. })
    ));
}

#[test]
fn impossible_triangle_never_converges() {
    let points = [
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 1.0),
        Point2::new(2.0, 0.0),
    ];
    let constraints = [
        ConstraintSpec::fixed_point(0, Point2::ORIGIN),
        ConstraintSpec::FixedLength { start: 0, end: 1, length: 1.0 },
        ConstraintSpec::FixedLength { start: 1, end: 2, length: 1.0 },
        ConstraintSpec::FixedLength { start: 0, end: 2, length: 5.0 },
    ];
    let config = SolverConfig {
        max_iterations: 50,
        ..SolverConfig::default()
    };
    match solve(&points, &constraints, &[], &config) {
        Ok(SolveOutcome::NotConverged { report, .. }) => {
            assert_ne!(report.termination, Termination::Converged);
            assert!(report.max_residual > config.feasibility_tolerance);
        }
        Ok(SolveOutcome::Converged { .. }) => panic!("infeasible system reported as converged"),
        Err(SolveError::Validation(_)) | Err(SolveError::NumericInstability { .. }) => {}
        Err(other) => panic!("unexpected error {other}"),
    }
}

#[test]
fn coincident_length_endpoints_are_rejected() {
    let points = [Point2::new(4.0, 4.0), Point2::new(4.0, 4.0)];
    let constraints = [ConstraintSpec::FixedLength { start: 0, end: 1, length: 1.0 }];
    let err = solve(&points, &constraints, &[], &SolverConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Validation(ValidationError::DegenerateLine { .. })
    ));
}

#[test]
fn right_angle_survives_drag() {
    let points = [
        Point2::new(10.0, 0.0),
        Point2::ORIGIN,
        Point2::new(0.0, 5.0),
    ];
    let constraints = [
        ConstraintSpec::fixed_point(1, Point2::ORIGIN),
        ConstraintSpec::FixedLength { start: 1, end: 0, length: 10.0 },
        ConstraintSpec::FixedLength { start: 1, end: 2, length: 5.0 },
        ConstraintSpec::FixedAngle { a: 0, vertex: 1, c: 2, angle: FRAC_PI_2 },
    ];
    let outcome = solve(
        &points,
        &constraints,
        &[MovingPointSpec::new(0, Point2::new(0.0, 10.0))],
        &SolverConfig::default(),
    )
    .unwrap();
    assert!(outcome.is_converged(), "{:?}", outcome.report());
    let p = outcome.points();
    assert_abs_diff_eq!(signed_angle(&p[0], &p[1], &p[2]), FRAC_PI_2, epsilon = 1e-6);
    // The arm reaches its target exactly; the other arm swings to -x.
    assert_abs_diff_eq!(p[0].x, 0.0, epsilon = 1e-4);
    assert_abs_diff_eq!(p[0].y, 10.0, epsilon = 1e-4);
    assert_abs_diff_eq!(p[2].x, -5.0, epsilon = 1e-4);
    assert_abs_diff_eq!(p[2].y, 0.0, epsilon = 1e-4);
}

#[test]
fn four_bar_swings_to_toggle_position() {
    // The target lies beyond the reach of c's branch; the closest the
    // coupler gets is where a, b and c line up.
    let (points, constraints) = four_bar();
    let target = Point2::new(110.1, -340.5);
    let outcome = solve(
        &points,
        &constraints,
        &[MovingPointSpec::new(2, target)],
        &SolverConfig::default(),
    )
    .unwrap();
    assert!(outcome.is_converged(), "{:?}", outcome.report());

    let p = outcome.points();
    assert_abs_diff_eq!(p[2].x, 222.5148, epsilon = 1e-2);
    assert_abs_diff_eq!(p[2].y, 214.0262, epsilon = 1e-2);
    assert_abs_diff_eq!(p[0].distance_to(&p[1]), 200.0, epsilon = 1e-4);
    assert_abs_diff_eq!(p[1].distance_to(&p[2]), 100000f64.sqrt(), epsilon = 1e-4);
    assert_abs_diff_eq!(p[2].distance_to(&p[3]), 300.0, epsilon = 1e-4);
}

#[test]
fn straight_bracket_swings_through_large_arc() {
    for angle in [-PI, 3.0, -3.0] {
        // p1 points along -x; p2 sits at `angle` from it.
        let p1 = Point2::new(-10.0, 0.0);
        let p2 = Point2::new(10.0 * (PI + angle).cos(), 10.0 * (PI + angle).sin());
        let points = [Point2::ORIGIN, p1, p2];
        let constraints = [
            ConstraintSpec::fixed_point(0, Point2::ORIGIN),
            ConstraintSpec::FixedLength { start: 0, end: 1, length: 10.0 },
            ConstraintSpec::FixedLength { start: 0, end: 2, length: 10.0 },
            ConstraintSpec::FixedAngle { a: 1, vertex: 0, c: 2, angle },
        ];
        let target = Point2::new(0.0, 10.0);
        let outcome = solve(
            &points,
            &constraints,
            &[MovingPointSpec::new(2, target)],
            &SolverConfig::default(),
        )
        .unwrap();
        assert!(outcome.is_converged(), "angle {angle}: {:?}", outcome.report());

        let p = outcome.points();
        assert!(p[2].distance_to(&target) < 1e-4, "angle {angle}: {:?}", p[2]);
        assert_abs_diff_eq!(p[0].distance_to(&p[1]), 10.0, epsilon = 1e-6);
        let held = signed_angle(&p[1], &p[0], &p[2]);
        assert!((held - angle).abs() < 1e-6 || (held - angle).abs() > 2.0 * PI - 1e-6);
    }
}

#[test]
fn anchored_length_mismatch_is_rejected() {
    let points = [Point2::new(0.0, 0.0), Point2::new(3.0, 4.0)];
    let constraints = [
        ConstraintSpec::fixed_point(0, points[0]),
        ConstraintSpec::fixed_point(1, points[1]),
        ConstraintSpec::FixedLength { start: 0, end: 1, length: 6.0 },
    ];
    let err = solve(&points, &constraints, &[], &SolverConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        SolveError::Validation(ValidationError::AnchoredLengthMismatch { constraint: 2, .. })
    ));
}

#[test]
fn analysis_counts_freedom() {
    let (points, constraints) = four_bar();
    let analysis = analyze(&Problem::new(&points, &constraints, &[])).unwrap();
    assert_eq!(analysis.variables, 8);
    assert_eq!(analysis.equations, 7);
    assert_eq!(analysis.dof, 1);
}

#[test]
fn drag_session_on_linkage_builder() {
    let mut linkage = Linkage::new();
    let a = linkage.add_named_point("a", Point2::new(200.0, 100.0)).unwrap();
    let b = linkage.add_named_point("b", Point2::new(200.0, 300.0)).unwrap();
    let c = linkage.add_named_point("c", Point2::new(500.0, 400.0)).unwrap();
    let d = linkage.add_named_point("d", Point2::new(500.0, 100.0)).unwrap();
    linkage.fix_point(a).unwrap();
    linkage.fix_point(d).unwrap();
    for (s, e) in [(a, b), (b, c), (c, d)] {
        let line = linkage.add_line(s, e).unwrap();
        linkage.hold_line_length(line).unwrap();
    }

    let mut session = DragSession::new(linkage, SolverConfig::default());
    let outcome = session.drag_by(c, 50.0, 0.0).unwrap();
    assert!(outcome.is_converged());

    let l = session.linkage();
    assert_eq!(l.points()[a], Point2::new(200.0, 100.0));
    assert_abs_diff_eq!(l.points()[c].distance_to(&l.points()[d]), 300.0, epsilon = 1e-4);
    assert_eq!(session.history().committed, 1);
}

#[test]
fn json_request_round_trip() {
    let request = r#"{
        "points": [{"x": 200, "y": 100}, {"x": 200, "y": 300}, {"x": 500, "y": 400}, {"x": 500, "y": 100}],
        "constraints": [
            {"type": "FixedPoint", "point": 0, "x": 200, "y": 100},
            {"type": "FixedPoint", "point": 3, "x": 500, "y": 100},
            {"type": "FixedLength", "start": 0, "end": 1, "length": 200},
            {"type": "FixedLength", "start": 1, "end": 2, "length": 316.22776601683796},
            {"type": "FixedLength", "start": 2, "end": 3, "length": 300}
        ],
        "moves": [{"point": 2, "target": {"x": 600, "y": 300}}],
        "config": {"max_iterations": 300}
    }"#;
    let response: SolveResponse = serde_json::from_str(&solve_json(request).unwrap()).unwrap();
    match response {
        SolveResponse::Converged { points, report } => {
            assert_eq!(points.len(), 4);
            assert!(report.max_residual <= 1e-6);
            assert_abs_diff_eq!(points[2].distance_to(&points[3]), 300.0, epsilon = 1e-4);
        }
        other => panic!("expected convergence, got {other:?}"),
    }
}

#[test]
fn json_request_with_bad_index_is_invalid() {
    let request = r#"{"points": [{"x": 0, "y": 0}], "moves": [{"point": 5, "target": {"x": 1, "y": 1}}]}"#;
    let out = solve_json(request).unwrap();
    assert!(out.contains(r#""status":"invalid""#), "{out}");
}
