//! Levenberg-Marquardt iteration over a [`Model`].
//!
//! Each iteration solves the Marquardt-damped normal equations
//! `(C + λ·diag(C))·δ = β` built by the [`Accumulator`] at the current
//! point, limits the step with the optional [`Clamp`], clips it into the
//! [`ParameterBounds`] and evaluates the candidate. A candidate is accepted
//! only if it strictly lowers the score.
//!
//! | Event | λ | Next |
//! |---|---|---|
//! | solve fails | `× increase` | retry, at most `max_singular_retries` times |
//! | candidate accepted | `× decrease` | convergence check |
//! | candidate rejected | `× increase` | retry from the same point |
//!
//! A rejected candidate that the checker cannot tell apart from the current
//! point means the optimum is flat at the working precision; the fit then
//! stops as converged at the current point.

use log::{debug, trace};

use crate::accumulate::Accumulator;
use crate::bounds::{Clamp, ParameterBounds};
use crate::convergence::{ConvergenceChecker, Decision};
use crate::linalg::SymmetricSolver;
use crate::model::{Model, ParameterLayout};
use crate::objective::{Objective, SampleData};

use super::{DampingSettings, FailureReason, FitStatus};

/// Raw outcome of [`StepSolver::solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub status: FitStatus,
    pub parameters: Vec<f64>,
    pub score: f64,
    pub iterations: usize,
    pub evaluations: usize,
}

/// True if the model could not be evaluated at a candidate.
///
/// The `+∞` a maximum-likelihood fold reports for a non-positive prediction
/// is an ordinary rejection; a NaN score, any other non-finite least-squares
/// score, or non-finite curvature alongside a usable score is not.
fn unusable(objective: &Objective, score: f64, acc: &Accumulator) -> bool {
    if score.is_nan() {
        return true;
    }
    match objective {
        Objective::LeastSquares => !score.is_finite() || !acc.is_finite(),
        Objective::MaximumLikelihood(_) => score != f64::INFINITY && !acc.is_finite(),
    }
}

/// Damped Gauss-Newton state for one fit.
///
/// Owns every buffer the iteration needs, sized once from the model's
/// layout.
#[derive(Debug, Clone)]
pub struct StepSolver {
    damping: DampingSettings,
    lambda: f64,
    gradient_indices: Vec<usize>,
    current: Accumulator,
    trial: Accumulator,
    linear: SymmetricSolver<f64>,
    damped: Vec<f64>,
    delta: Vec<f64>,
    step: Vec<f64>,
}

impl StepSolver {
    pub fn new(layout: &ParameterLayout, damping: DampingSettings) -> Self {
        let k = layout.active_count();
        Self {
            damping,
            lambda: damping.initial_lambda,
            gradient_indices: layout.gradient_indices().to_vec(),
            current: Accumulator::new(k),
            trial: Accumulator::new(k),
            linear: SymmetricSolver::new(k),
            damped: vec![0.0; k * k],
            delta: vec![0.0; k],
            step: vec![0.0; layout.parameter_count()],
        }
    }

    /// Current damping factor.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Solve the damped system at the current point into `self.delta`,
    /// raising λ after each failure.
    fn solve_damped(&mut self) -> bool {
        let k = self.gradient_indices.len();
        let mut retries = 0;
        loop {
            self.damped.copy_from_slice(self.current.alpha());
            for i in 0..k {
                self.damped[i * k + i] *= 1.0 + self.lambda;
            }
            match self
                .linear
                .solve(&self.damped, self.current.beta(), &mut self.delta)
            {
                Ok(_) => return true,
                Err(e) => {
                    trace!("damped solve failed ({e}) at lambda {:.3e}", self.lambda);
                    if retries == self.damping.max_singular_retries {
                        return false;
                    }
                    retries += 1;
                    self.lambda *= self.damping.lambda_increase;
                }
            }
        }
    }

    /// Iterate from `initial` until the checker, the iteration cap or a
    /// failure stops the fit. Inputs are assumed validated.
    #[allow(clippy::too_many_arguments)]
    pub fn solve<M: Model>(
        &mut self,
        model: &mut M,
        objective: &Objective,
        data: &SampleData,
        bounds: &ParameterBounds,
        mut clamp: Option<Clamp>,
        checker: &ConvergenceChecker,
        initial: &[f64],
    ) -> Solution {
        self.lambda = self.damping.initial_lambda;
        let mut params = initial.to_vec();
        bounds.clip_in_place(&mut params);
        let mut candidate = params.clone();

        model.initialise(&params);
        let mut score = self.current.accumulate(model, objective, data);
        let mut evaluations = 1;
        let mut iterations = 0;

        let finish = |status: FitStatus, parameters: Vec<f64>, score, iterations, evaluations| {
            debug!(
                "fit finished: {status:?} after {iterations} iterations \
                 ({evaluations} evaluations), score {score:.6e}"
            );
            Solution {
                status,
                parameters,
                score,
                iterations,
                evaluations,
            }
        };

        if !score.is_finite() {
            return finish(
                FitStatus::Failed(FailureReason::InvalidStart),
                params,
                score,
                0,
                evaluations,
            );
        }
        if !self.current.is_finite() {
            return finish(
                FitStatus::Failed(FailureReason::InvalidGradients),
                params,
                score,
                0,
                evaluations,
            );
        }

        let mut rejections = 0;
        loop {
            if !self.solve_damped() {
                return finish(
                    FitStatus::Failed(FailureReason::SingularMatrix),
                    params,
                    score,
                    iterations,
                    evaluations,
                );
            }

            self.step.fill(0.0);
            for (&i, &d) in self.gradient_indices.iter().zip(&self.delta) {
                self.step[i] = d;
            }
            if let Some(clamp) = &clamp {
                clamp.clamp_step(&mut self.step);
            }
            bounds.apply_bounds(&params, &self.step, &mut candidate);

            model.initialise(&candidate);
            let candidate_score = self.trial.accumulate(model, objective, data);
            evaluations += 1;

            if unusable(objective, candidate_score, &self.trial) {
                return finish(
                    FitStatus::Failed(FailureReason::InvalidGradients),
                    params,
                    score,
                    iterations,
                    evaluations,
                );
            }

            if candidate_score < score {
                iterations += 1;
                rejections = 0;
                self.lambda *= self.damping.lambda_decrease;
                if let Some(clamp) = &mut clamp {
                    for ((s, c), p) in self.step.iter_mut().zip(&candidate).zip(&params) {
                        *s = c - p;
                    }
                    clamp.step_accepted(&self.step);
                }
                trace!(
                    "iteration {iterations}: score {candidate_score:.6e}, lambda {:.3e}",
                    self.lambda
                );

                let previous_score = score;
                score = candidate_score;
                core::mem::swap(&mut params, &mut candidate);
                core::mem::swap(&mut self.current, &mut self.trial);

                match checker.check(iterations, previous_score, &candidate, score, &params) {
                    Decision::Continue => {}
                    Decision::Converged => {
                        return finish(FitStatus::Converged, params, score, iterations, evaluations)
                    }
                    Decision::MaxIterations => {
                        let status = if checker.settings().converge_at_max_iterations {
                            FitStatus::Converged
                        } else {
                            FitStatus::MaxIterationsReached
                        };
                        return finish(status, params, score, iterations, evaluations);
                    }
                }
            } else {
                if candidate_score.is_finite()
                    && checker.converged(score, &params, candidate_score, &candidate)
                {
                    return finish(FitStatus::Converged, params, score, iterations, evaluations);
                }
                rejections += 1;
                if rejections > self.damping.max_rejections {
                    return finish(
                        FitStatus::Failed(FailureReason::NoImprovement),
                        params,
                        score,
                        iterations,
                        evaluations,
                    );
                }
                self.lambda *= self.damping.lambda_increase;
                trace!(
                    "rejected candidate (score {candidate_score:.6e}), lambda {:.3e}",
                    self.lambda
                );
            }
        }
    }
}
