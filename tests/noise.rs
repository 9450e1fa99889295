//! Fits on Poisson-noise images: estimator spread against the CRLB and
//! goodness-of-fit calibration.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};

use spotfit::fit::{fit, fit_batch, FitJob, FitSettings};
use spotfit::model::param;
use spotfit::{GaussianModel, GaussianShape, Model, Objective, SampleData};

const FITS: usize = 300;

fn truth() -> Vec<f64> {
    let mut a = vec![0.0; param::count(1)];
    a[param::BACKGROUND] = 5.0;
    a[param::SIGNAL] = 500.0;
    a[param::X_POSITION] = 3.5;
    a[param::Y_POSITION] = 3.5;
    a[param::X_WIDTH] = 1.0;
    a
}

fn seed() -> Vec<f64> {
    let mut a = truth();
    a[param::BACKGROUND] = 3.0;
    a[param::SIGNAL] = 400.0;
    a[param::X_POSITION] = 3.2;
    a[param::Y_POSITION] = 3.7;
    a
}

fn poisson_images(model: &mut GaussianModel, rng: &mut StdRng, count: usize) -> Vec<SampleData> {
    model.initialise(&truth());
    let means: Vec<f64> = model.values().collect();
    (0..count)
        .map(|_| {
            SampleData::new(
                means
                    .iter()
                    .map(|&m| Poisson::new(m).unwrap().sample(rng))
                    .collect(),
            )
        })
        .collect()
}

fn mean_and_sd(xs: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    let var = xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

#[test]
fn position_spread_matches_crlb() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut model = GaussianModel::new(GaussianShape::Circular, 7, 7, 1).unwrap();
    let images = poisson_images(&mut model, &mut rng, FITS);
    let objective = Objective::maximum_likelihood();
    let settings = FitSettings::default();

    let mut xs = Vec::with_capacity(FITS);
    let mut crlb = Vec::with_capacity(FITS);
    for data in &images {
        let r = fit(&mut model, &objective, &seed(), data, None, None, &settings).unwrap();
        if r.status.is_failed() {
            continue;
        }
        xs.push(r.parameters[param::X_POSITION]);
        if let Some(sd) = r.precision.standard_deviations() {
            crlb.push(sd[param::X_POSITION]);
        }
    }
    assert!(xs.len() >= FITS * 95 / 100, "only {} fits succeeded", xs.len());

    let (mean, sd) = mean_and_sd(&xs);
    let (bound, _) = mean_and_sd(&crlb);
    assert!((mean - 3.5).abs() < 4.0 * sd / (xs.len() as f64).sqrt());
    let ratio = sd / bound;
    assert!((0.75..1.4).contains(&ratio), "spread / CRLB = {ratio}");
}

#[test]
fn goodness_of_fit_is_calibrated() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut model = GaussianModel::new(GaussianShape::Circular, 7, 7, 1).unwrap();
    let images = poisson_images(&mut model, &mut rng, FITS);
    let objective = Objective::maximum_likelihood();
    let settings = FitSettings::default();

    let p_values: Vec<f64> = images
        .iter()
        .filter_map(|data| {
            fit(&mut model, &objective, &seed(), data, None, None, &settings)
                .unwrap()
                .goodness_of_fit
        })
        .collect();
    assert!(p_values.len() >= FITS * 95 / 100);
    assert!(p_values.iter().all(|p| (0.0..=1.0).contains(p)));
    let (mean, _) = mean_and_sd(&p_values);
    assert!((0.3..0.7).contains(&mean), "mean p-value {mean}");
}

#[test]
fn batch_matches_individual_fits() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut model = GaussianModel::new(GaussianShape::Circular, 7, 7, 1).unwrap();
    let images = poisson_images(&mut model, &mut rng, 16);
    let objective = Objective::maximum_likelihood();
    let settings = FitSettings::default();

    let jobs: Vec<FitJob> = images
        .iter()
        .map(|data| FitJob::new(seed(), data.clone()))
        .collect();
    let batch = fit_batch(&model, &objective, &jobs, &settings);
    assert_eq!(batch.len(), jobs.len());
    for (data, result) in images.iter().zip(batch) {
        let single = fit(&mut model, &objective, &seed(), data, None, None, &settings).unwrap();
        let batched = result.unwrap();
        assert_eq!(batched.status, single.status);
        assert_eq!(batched.evaluations, single.evaluations);
        assert_eq!(batched.parameters, single.parameters);
    }
}
