use super::*;

#[test]
fn chi_squared_rejects_bad_dof() {
    assert_eq!(ChiSquared::new(0.0_f64).unwrap_err(), StatsError::InvalidParameter);
    assert_eq!(ChiSquared::new(-2.0_f64).unwrap_err(), StatsError::InvalidParameter);
    assert!(ChiSquared::new(f64::NAN).is_err());
}

#[test]
fn chi_squared_two_dof_is_exponential() {
    // k = 2: CDF = 1 − e^{−x/2}
    let chi2 = ChiSquared::new(2.0_f64).unwrap();
    for &x in &[0.1, 1.0, 3.0, 10.0, 60.0] {
        assert!((chi2.cdf(x) - (1.0 - (-x / 2.0_f64).exp())).abs() < 1e-14);
        let sf = chi2.sf(x);
        let expected = (-x / 2.0_f64).exp();
        assert!(((sf - expected) / expected).abs() < 1e-12, "sf({x}) = {sf}");
    }
}

#[test]
fn chi_squared_reference_values() {
    // scipy.stats.chi2.sf(x, k)
    let chi2 = ChiSquared::new(3.0_f64).unwrap();
    assert!((chi2.sf(7.814727903251178) - 0.05).abs() < 1e-12);
    let chi2 = ChiSquared::new(10.0_f64).unwrap();
    assert!((chi2.sf(18.307038053275146) - 0.05).abs() < 1e-12);
}

#[test]
fn chi_squared_tails_are_complementary() {
    let chi2 = ChiSquared::new(7.0_f64).unwrap();
    assert_eq!(chi2.dof(), 7.0);
    for &x in &[0.5, 3.0, 7.0, 15.0] {
        assert!((chi2.cdf(x) + chi2.sf(x) - 1.0).abs() < 1e-14);
    }
}

#[test]
fn chi_squared_sf_at_origin() {
    let chi2 = ChiSquared::new(5.0_f64).unwrap();
    assert_eq!(chi2.sf(0.0), 1.0);
    assert_eq!(chi2.cdf(-1.0), 0.0);
}
