//! Many independent fits with one model template.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::bounds::{Clamp, ParameterBounds};
use crate::model::Model;
use crate::objective::{Objective, SampleData};

use super::{fit, FitError, FitResult, FitSettings};

/// Inputs of one fit in a batch.
#[derive(Debug, Clone)]
pub struct FitJob {
    pub initial: Vec<f64>,
    pub data: SampleData,
    pub bounds: Option<ParameterBounds>,
    pub clamp: Option<Clamp>,
}

impl FitJob {
    pub fn new(initial: Vec<f64>, data: SampleData) -> Self {
        Self {
            initial,
            data,
            bounds: None,
            clamp: None,
        }
    }
}

fn run<M: Model + Clone>(
    template: &M,
    objective: &Objective,
    job: &FitJob,
    settings: &FitSettings,
) -> Result<FitResult, FitError> {
    let mut model = template.clone();
    fit(
        &mut model,
        objective,
        &job.initial,
        &job.data,
        job.bounds.as_ref(),
        job.clamp.clone(),
        settings,
    )
}

/// Fit every job with its own clone of `template`; results keep job order.
///
/// With the `parallel` feature jobs run on the rayon thread pool.
#[cfg(feature = "parallel")]
pub fn fit_batch<M: Model + Clone + Sync>(
    template: &M,
    objective: &Objective,
    jobs: &[FitJob],
    settings: &FitSettings,
) -> Vec<Result<FitResult, FitError>> {
    jobs.par_iter()
        .map(|job| run(template, objective, job, settings))
        .collect()
}

/// Fit every job with its own clone of `template`; results keep job order.
#[cfg(not(feature = "parallel"))]
pub fn fit_batch<M: Model + Clone>(
    template: &M,
    objective: &Objective,
    jobs: &[FitJob],
    settings: &FitSettings,
) -> Vec<Result<FitResult, FitError>> {
    jobs.iter()
        .map(|job| run(template, objective, job, settings))
        .collect()
}
