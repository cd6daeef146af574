//! Equality-constrained SQP on the exact Lagrangian Hessian, convexified on
//! the constraint null space, with an l1 merit line search that pulls each
//! trial point back onto the constraints.

use std::time::Instant;

use nalgebra::DMatrix;
use tracing::debug;

use crate::linalg::{
    convexify, inf_norm, l1_norm, lagrangian_gradient, least_squares_multipliers,
    min_norm_correction, solve_kkt,
};
use crate::solver::{EvalStage, Problem, SolveError, SolverConfig, Termination};

/// Sufficient-decrease constant of the Armijo test.
const ARMIJO: f64 = 1e-4;

/// Gauss-Newton steps spent pulling a trial point back onto the constraints.
const RESTORATION_STEPS: usize = 3;

/// Final state of one SQP run.
#[derive(Debug, Clone)]
pub(crate) struct SqpRun {
    pub x: Vec<f64>,
    pub iterations: usize,
    pub objective: f64,
    pub max_residual: f64,
    pub stationarity: f64,
    pub termination: Termination,
}

struct Evaluation {
    f: f64,
    g: Vec<f64>,
    c: Vec<f64>,
    jac: DMatrix<f64>,
}

fn check_finite(values: &[f64], stage: EvalStage, iteration: usize) -> Result<(), SolveError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SolveError::NumericInstability { stage, iteration })
    }
}

/// Objective value and residuals, as needed by the line search.
fn merit_terms(problem: &Problem, x: &[f64], iteration: usize) -> Result<(f64, Vec<f64>), SolveError> {
    let f = problem.objective().value(x);
    check_finite(&[f], EvalStage::Objective, iteration)?;
    let c = problem.constraints().residuals(x);
    check_finite(&c, EvalStage::Residual, iteration)?;
    Ok((f, c))
}

fn evaluate(problem: &Problem, x: &[f64], iteration: usize) -> Result<Evaluation, SolveError> {
    let (f, c) = merit_terms(problem, x, iteration)?;
    let g = problem.objective().gradient(x);
    check_finite(&g, EvalStage::Objective, iteration)?;
    let jac = problem.constraints().jacobian(x);
    check_finite(jac.as_slice(), EvalStage::Jacobian, iteration)?;
    Ok(Evaluation { f, g, c, jac })
}

/// Best iterate seen so far. Feasible beats infeasible; among feasible
/// iterates the lower objective wins, among infeasible ones the lower
/// violation. Ties go to the later iterate.
struct BestIterate {
    x: Vec<f64>,
    objective: f64,
    max_residual: f64,
    stationarity: f64,
}

impl BestIterate {
    fn consider(&mut self, x: &[f64], objective: f64, max_residual: f64, stationarity: f64, tol: f64) {
        let feasible = max_residual <= tol;
        let best_feasible = self.max_residual <= tol;
        let better = match (feasible, best_feasible) {
            (true, false) => true,
            (false, true) => false,
            (true, true) => objective <= self.objective,
            (false, false) => max_residual <= self.max_residual,
        };
        if better {
            self.x.clear();
            self.x.extend_from_slice(x);
            self.objective = objective;
            self.max_residual = max_residual;
            self.stationarity = stationarity;
        }
    }

    fn into_run(self, iterations: usize, termination: Termination) -> SqpRun {
        SqpRun {
            x: self.x,
            iterations,
            objective: self.objective,
            max_residual: self.max_residual,
            stationarity: self.stationarity,
            termination,
        }
    }
}

/// `hess f + sum_k lambda_k hess c_k` at `x`.
fn lagrangian_hessian(
    problem: &Problem,
    x: &[f64],
    lambda: &[f64],
    iteration: usize,
) -> Result<DMatrix<f64>, SolveError> {
    let mut hess = problem.constraints().weighted_hessian(x, lambda);
    problem.objective().add_hessian(&mut hess);
    check_finite(hess.as_slice(), EvalStage::Hessian, iteration)?;
    Ok(hess)
}

/// Pull `x` back towards the constraint manifold with a few minimum-norm
/// Gauss-Newton steps, re-linearising at every step. Returns the restored
/// point with its objective and residuals, or `None` when an evaluation
/// along the way is not finite.
fn restore(
    problem: &Problem,
    mut x: Vec<f64>,
    mut c: Vec<f64>,
    tol: f64,
) -> Option<(Vec<f64>, f64, Vec<f64>)> {
    for _ in 0..RESTORATION_STEPS {
        if inf_norm(&c) <= tol {
            break;
        }
        let jac = problem.constraints().jacobian(&x);
        if !jac.iter().all(|v| v.is_finite()) {
            return None;
        }
        let z = min_norm_correction(&jac, &c).ok()?;
        x = axpy(&x, 1.0, &z);
        c = problem.constraints().residuals(&x);
        if !c.iter().all(|v| v.is_finite()) {
            return None;
        }
    }
    let f = problem.objective().value(&x);
    f.is_finite().then_some((x, f, c))
}

fn converged_run(x: Vec<f64>, iterations: usize, eval: &Evaluation, stationarity: f64) -> SqpRun {
    SqpRun {
        x,
        iterations,
        objective: eval.f,
        max_residual: inf_norm(&eval.c),
        stationarity,
        termination: Termination::Converged,
    }
}

fn axpy(x: &[f64], alpha: f64, d: &[f64]) -> Vec<f64> {
    x.iter().zip(d).map(|(xi, di)| xi + alpha * di).collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Run SQP from `x0` until convergence or a budget runs out.
///
/// On convergence the current iterate is returned. Otherwise the best iterate
/// seen is returned with the reason iteration stopped.
pub(crate) fn minimize(
    problem: &Problem,
    x0: Vec<f64>,
    config: &SolverConfig,
) -> Result<SqpRun, SolveError> {
    let started = Instant::now();
    let tol = config.feasibility_tolerance;

    let mut x = x0;
    let mut eval = evaluate(problem, &x, 0)?;
    let mut penalty = 1.0_f64;
    let mut best = BestIterate {
        x: x.clone(),
        objective: eval.f,
        max_residual: inf_norm(&eval.c),
        stationarity: f64::INFINITY,
    };
    let reach = problem.objective().target_extent();

    for iteration in 0..config.max_iterations {
        let max_residual = inf_norm(&eval.c);
        let lambda = least_squares_multipliers(&eval.jac, &eval.g)?;
        let stationarity = inf_norm(&lagrangian_gradient(&eval.jac, &eval.g, &lambda));
        best.consider(&x, eval.f, max_residual, stationarity, tol);
        debug!(iteration, objective = eval.f, max_residual, stationarity, penalty, "sqp iterate");

        if config.is_converged(max_residual, stationarity, inf_norm(&eval.g)) {
            return Ok(converged_run(x, iteration, &eval, stationarity));
        }
        if config.time_exceeded(started) {
            debug!(iteration, "time limit reached");
            return Ok(best.into_run(iteration, Termination::TimeLimit));
        }

        let mut hessian = lagrangian_hessian(problem, &x, &lambda, iteration)?;
        let shift = convexify(&mut hessian, &eval.jac)?;
        if shift > 0.0 {
            debug!(iteration, shift, "shifted Lagrangian Hessian");
        }

        let kkt = solve_kkt(&hessian, &eval.jac, &eval.g, &eval.c)?;
        if !kkt.exact {
            debug!(iteration, "singular KKT system, using least-squares step");
        }

        let length = inf_norm(&kkt.step);
        if length <= config.step_tolerance * (1.0 + inf_norm(&x)) {
            if config.is_feasible(max_residual) {
                return Ok(converged_run(x, iteration, &eval, stationarity));
            }
            debug!(iteration, max_residual, "step vanished while infeasible");
            return Ok(best.into_run(iteration, Termination::Stalled));
        }

        // No single step travels farther than the drawing extends.
        let limit = 1.0 + inf_norm(&x).max(reach);
        let scale = if length > limit { limit / length } else { 1.0 };
        let step: Vec<f64> = kkt.step.iter().map(|d| d * scale).collect();

        let required = inf_norm(&kkt.multipliers);
        if penalty < 1.1 * required {
            penalty = 1.5 * required;
        }

        // Directional derivative of f + mu |c|_1 along a step that solves the
        // linearised constraints.
        let violation = l1_norm(&eval.c);
        let merit0 = eval.f + penalty * violation;
        let slope = (dot(&eval.g, &step) - scale * penalty * violation).min(0.0);

        let mut alpha = 1.0;
        let mut accepted = None;
        let mut shortest = None;
        for _ in 0..config.max_line_search_steps.max(1) {
            let trial = axpy(&x, alpha, &step);
            let (f_t, c_t) = merit_terms(problem, &trial, iteration)?;
            let target = merit0 + ARMIJO * alpha * slope;
            if f_t + penalty * l1_norm(&c_t) <= target {
                accepted = Some(trial);
                break;
            }
            if !c_t.is_empty() {
                if let Some((restored, f_r, c_r)) = restore(problem, trial.clone(), c_t, tol) {
                    if f_r + penalty * l1_norm(&c_r) <= target {
                        debug!(iteration, alpha, "restored trial point accepted");
                        accepted = Some(restored);
                        break;
                    }
                }
            }
            shortest = Some(trial);
            alpha *= 0.5;
        }
        let x_new = match (accepted, shortest) {
            (Some(x_new), _) => x_new,
            (None, Some(trial)) => {
                debug!(iteration, alpha, "line search exhausted, taking shortest step");
                trial
            }
            (None, None) => x.clone(),
        };

        eval = evaluate(problem, &x_new, iteration + 1)?;
        x = x_new;
    }

    let max_residual = inf_norm(&eval.c);
    let lambda = least_squares_multipliers(&eval.jac, &eval.g)?;
    let stationarity = inf_norm(&lagrangian_gradient(&eval.jac, &eval.g, &lambda));
    if config.is_converged(max_residual, stationarity, inf_norm(&eval.g)) {
        return Ok(converged_run(x, config.max_iterations, &eval, stationarity));
    }
    best.consider(&x, eval.f, max_residual, stationarity, tol);
    Ok(best.into_run(config.max_iterations, Termination::IterationLimit))
}
