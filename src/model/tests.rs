use std::sync::Arc;

use super::*;

fn assert_near(a: f64, b: f64, tol: f64, msg: &str) {
    assert!(
        (a - b).abs() < tol,
        "{}: {} vs {} (diff {})",
        msg,
        a,
        b,
        (a - b).abs()
    );
}

fn single_peak(bg: f64, signal: f64, x: f64, y: f64) -> Vec<f64> {
    let mut a = vec![0.0; param::count(1)];
    a[param::BACKGROUND] = bg;
    a[param::SIGNAL] = signal;
    a[param::X_POSITION] = x;
    a[param::Y_POSITION] = y;
    a[param::X_WIDTH] = 1.2;
    a[param::Y_WIDTH] = 1.2;
    a
}

/// Compare analytic first and second derivatives against central
/// differences at every sample.
fn check_gradients<M: Model>(model: &mut M, params: &[f64], rel: f64) {
    const H: f64 = 1e-5;
    let n = model.gradient_count();
    let indices = model.layout().gradient_indices().to_vec();
    let size = model.size();

    model.initialise(params);
    let mut d1 = vec![vec![0.0; n]; size];
    let mut d2 = vec![vec![0.0; n]; size];
    for i in 0..size {
        let v2 = model.value_and_gradient2_at(i, &mut d1[i], &mut d2[i]);
        let mut g = vec![0.0; n];
        let v1 = model.value_and_gradient1_at(i, &mut g);
        assert_eq!(v1, v2, "value differs between gradient orders");
        assert_eq!(v1, model.value_at(i));
        assert_eq!(g, d1[i], "first derivatives differ between gradient orders");
    }

    for (k, &p) in indices.iter().enumerate() {
        let mut plus = params.to_vec();
        let mut minus = params.to_vec();
        plus[p] += H;
        minus[p] -= H;

        model.initialise(&plus);
        let (fp, gp): (Vec<f64>, Vec<f64>) = (0..size)
            .map(|i| {
                let mut g = vec![0.0; n];
                let v = model.value_and_gradient1_at(i, &mut g);
                (v, g[k])
            })
            .unzip();
        model.initialise(&minus);
        let (fm, gm): (Vec<f64>, Vec<f64>) = (0..size)
            .map(|i| {
                let mut g = vec![0.0; n];
                let v = model.value_and_gradient1_at(i, &mut g);
                (v, g[k])
            })
            .unzip();

        let scale1 = d1.iter().map(|g| g[k].abs()).fold(1e-3, f64::max);
        let scale2 = d2.iter().map(|g| g[k].abs()).fold(1e-3, f64::max);
        for i in 0..size {
            let fd1 = (fp[i] - fm[i]) / (2.0 * H);
            let fd2 = (gp[i] - gm[i]) / (2.0 * H);
            assert_near(
                d1[i][k],
                fd1,
                rel * scale1,
                &format!("d1 of slot {p} at sample {i}"),
            );
            assert_near(
                d2[i][k],
                fd2,
                rel * scale2,
                &format!("d2 of slot {p} at sample {i}"),
            );
        }
    }
    model.initialise(params);
}

fn spline_data() -> SplineData {
    SplineData::from_fn(21, 21, 9, 2.0, 2.0, |dx, dy, z| {
        let w = 1.0 + 0.1 * z * z;
        (-(dx * dx + dy * dy) / (2.0 * w * w)).exp() / (2.0 * core::f64::consts::PI * w * w)
    })
    .unwrap()
}

// ═══════════════════════════════════════════════════════════════════
// Layout and capabilities
// ═══════════════════════════════════════════════════════════════════

#[test]
fn kind_of_index_repeats_per_peak() {
    assert_eq!(ParameterKind::of_index(0), ParameterKind::Background);
    assert_eq!(ParameterKind::of_index(1), ParameterKind::Signal);
    assert_eq!(ParameterKind::of_index(7), ParameterKind::ZPosition);
    assert_eq!(ParameterKind::of_index(8), ParameterKind::Signal);
    assert_eq!(ParameterKind::of_index(12), ParameterKind::XWidth);
    assert_eq!(param::index(2, param::Y_POSITION), 17);
    assert_eq!(param::index(2, param::BACKGROUND), 0);
}

#[test]
fn elliptical_layout_two_peaks() {
    let model = GaussianModel::new(GaussianShape::Elliptical, 5, 5, 2).unwrap();
    assert_eq!(
        model.layout().gradient_indices(),
        &[0, 1, 2, 3, 4, 5, 6, 8, 9, 10, 11, 12, 13]
    );
    assert_eq!(model.layout().parameter_count(), 15);
    assert!(!model.layout().is_active(7));
}

#[test]
fn shape_layouts() {
    let fixed = GaussianModel::new(GaussianShape::FixedWidth, 5, 5, 1).unwrap();
    assert_eq!(fixed.layout().gradient_indices(), &[0, 1, 2, 3]);
    let circ = GaussianModel::new(GaussianShape::Circular, 5, 5, 1).unwrap();
    assert_eq!(circ.layout().gradient_indices(), &[0, 1, 2, 3, 5]);
    let free = GaussianModel::new(GaussianShape::FreeCircular, 5, 5, 1).unwrap();
    assert_eq!(free.layout().gradient_indices(), &[0, 1, 2, 3, 5, 6]);
    let kinds: Vec<_> = circ.layout().active_kinds().collect();
    assert_eq!(kinds.last(), Some(&ParameterKind::XWidth));
}

#[test]
fn shape_is_implied_by_capabilities() {
    let caps = Capabilities::SIGNAL | Capabilities::POSITION | Capabilities::WIDTH_X;
    let model = GaussianModel::with_capabilities(caps, 4, 4, 1).unwrap();
    assert_eq!(model.shape(), GaussianShape::Circular);
    assert_eq!(model.layout().gradient_indices(), &[1, 2, 3, 5]);
}

#[test]
fn invalid_gaussian_capabilities() {
    let angle_only = GaussianShape::Circular.capabilities() | Capabilities::ANGLE;
    assert!(matches!(
        GaussianModel::with_capabilities(angle_only, 4, 4, 1),
        Err(ModelError::UnsupportedCapabilities(_))
    ));
    let depth = GaussianShape::Circular.capabilities() | Capabilities::DEPTH;
    assert!(GaussianModel::with_capabilities(depth, 4, 4, 1).is_err());
    assert_eq!(
        GaussianModel::with_capabilities(Capabilities::empty(), 4, 4, 1).unwrap_err(),
        ModelError::NothingToFit
    );
    assert_eq!(
        GaussianModel::new(GaussianShape::Circular, 0, 4, 1).unwrap_err(),
        ModelError::EmptyWindow { width: 0, height: 4 }
    );
    assert_eq!(
        GaussianModel::new(GaussianShape::Circular, 4, 4, 0).unwrap_err(),
        ModelError::NoPeaks
    );
}

#[test]
fn capability_mask_ops() {
    let caps = Capabilities::BACKGROUND | Capabilities::SIGNAL;
    assert!(caps.contains(Capabilities::SIGNAL));
    assert!(!caps.contains(Capabilities::POSITION));
    assert_eq!(caps.without(Capabilities::SIGNAL), Capabilities::BACKGROUND);
    assert_eq!(Capabilities::empty().bits(), 0);
}

// ═══════════════════════════════════════════════════════════════════
// Gaussian values
// ═══════════════════════════════════════════════════════════════════

#[test]
fn gaussian_integrates_to_signal() {
    let mut model = GaussianModel::new(GaussianShape::Circular, 31, 31, 1).unwrap();
    model.initialise(&single_peak(2.0, 1000.0, 15.5, 15.5));
    let total: f64 = model.values().sum();
    assert_near(total, 1000.0 + 2.0 * 961.0, 1.0, "integrated signal");
}

#[test]
fn values_are_row_major() {
    let mut model = GaussianModel::new(GaussianShape::Circular, 4, 2, 1).unwrap();
    model.initialise(&single_peak(0.0, 100.0, 1.5, 0.5));
    let v: Vec<f64> = model.values().collect();
    assert_eq!(v.len(), 8);
    let brightest = (0..8).max_by(|&a, &b| v[a].total_cmp(&v[b])).unwrap();
    assert_eq!(brightest, 1);
    assert!(v[1] > v[5]);
}

#[test]
fn circular_matches_free_circular_at_equal_widths() {
    let a = single_peak(3.0, 500.0, 2.2, 2.9);
    let mut circ = GaussianModel::new(GaussianShape::Circular, 6, 6, 1).unwrap();
    let mut free = GaussianModel::new(GaussianShape::FreeCircular, 6, 6, 1).unwrap();
    circ.initialise(&a);
    free.initialise(&a);
    for (c, f) in circ.values().zip(free.values()) {
        assert_near(c, f, 1e-12, "circular vs free circular");
    }
}

#[test]
fn elliptical_rotation_by_half_turn_is_identity() {
    let mut a = single_peak(1.0, 800.0, 3.1, 3.4);
    a[param::X_WIDTH] = 0.9;
    a[param::Y_WIDTH] = 1.6;
    a[param::ANGLE] = 0.4;
    let mut model = GaussianModel::new(GaussianShape::Elliptical, 7, 7, 1).unwrap();
    model.initialise(&a);
    let before: Vec<f64> = model.values().collect();
    a[param::ANGLE] += core::f64::consts::PI;
    model.initialise(&a);
    for (x, y) in before.iter().zip(model.values()) {
        assert_near(*x, y, 1e-9, "rotation by π");
    }
}

#[test]
fn negative_widths_mirror_positive_ones() {
    for shape in [GaussianShape::FreeCircular, GaussianShape::Elliptical] {
        let mut a = single_peak(2.0, 700.0, 3.2, 2.8);
        a[param::X_WIDTH] = 1.1;
        a[param::Y_WIDTH] = 1.5;
        a[param::ANGLE] = 0.3;
        let mut model = GaussianModel::new(shape, 6, 6, 1).unwrap();
        model.initialise(&a);
        let positive: Vec<f64> = model.values().collect();

        a[param::Y_WIDTH] = -1.5;
        model.initialise(&a);
        for (p, v) in positive.iter().zip(model.values()) {
            assert!(v >= 2.0, "{shape:?}: value {v} below background");
            assert_near(*p, v, 1e-12, "mirrored width");
        }
        check_gradients(&mut model, &a, 1e-6);
    }
}

#[test]
fn cursor_matches_values() {
    let mut model = GaussianModel::new(GaussianShape::FreeCircular, 5, 4, 1).unwrap();
    model.initialise(&single_peak(4.0, 300.0, 2.0, 1.7));
    let values: Vec<f64> = model.values().collect();

    let mut cursor = model.samples1();
    for pass in 0..2 {
        let mut i = 0;
        while let Some((v, g)) = cursor.next_sample() {
            assert_eq!(v, values[i], "pass {pass}");
            assert_eq!(g.len(), 6);
            assert_eq!(g[0], 1.0);
            i += 1;
        }
        assert_eq!(i, 20);
        cursor.reset();
        assert_eq!(cursor.position(), 0);
    }

    let mut cursor2 = model.samples2();
    let mut i = 0;
    while let Some((v, _, d2)) = cursor2.next_sample() {
        assert_eq!(v, values[i]);
        assert_eq!(d2[0], 0.0);
        i += 1;
    }
    assert_eq!(i, 20);
}

#[test]
fn two_peaks_add() {
    let mut a = vec![0.0; param::count(2)];
    a[param::BACKGROUND] = 5.0;
    for (p, (x, y)) in [(2.0, 2.5), (5.5, 4.0)].into_iter().enumerate() {
        a[param::index(p, param::SIGNAL)] = 200.0 * (p + 1) as f64;
        a[param::index(p, param::X_POSITION)] = x;
        a[param::index(p, param::Y_POSITION)] = y;
        a[param::index(p, param::X_WIDTH)] = 1.1;
    }
    let mut pair = GaussianModel::new(GaussianShape::Circular, 8, 7, 2).unwrap();
    pair.initialise(&a);

    let mut one = GaussianModel::new(GaussianShape::Circular, 8, 7, 1).unwrap();
    one.initialise(&a[..param::count(1)]);
    let first: Vec<f64> = one.values().collect();
    let mut second = a[..1].to_vec();
    second.extend_from_slice(&a[param::count(1)..]);
    one.initialise(&second);
    for (i, (v, w)) in pair.values().zip(one.values()).enumerate() {
        assert_near(v, first[i] + w - 5.0, 1e-10, "peak superposition");
    }
}

// ═══════════════════════════════════════════════════════════════════
// Gaussian derivatives
// ═══════════════════════════════════════════════════════════════════

#[test]
fn fixed_width_gradients() {
    let mut model = GaussianModel::new(GaussianShape::FixedWidth, 7, 7, 1).unwrap();
    check_gradients(&mut model, &single_peak(10.0, 1000.0, 3.3, 3.6), 1e-6);
}

#[test]
fn circular_gradients() {
    let mut model = GaussianModel::new(GaussianShape::Circular, 7, 7, 1).unwrap();
    check_gradients(&mut model, &single_peak(10.0, 1000.0, 3.3, 3.6), 1e-6);
}

#[test]
fn free_circular_gradients() {
    let mut a = single_peak(10.0, 1000.0, 3.7, 3.2);
    a[param::X_WIDTH] = 1.1;
    a[param::Y_WIDTH] = 1.5;
    let mut model = GaussianModel::new(GaussianShape::FreeCircular, 7, 7, 1).unwrap();
    check_gradients(&mut model, &a, 1e-6);
}

#[test]
fn elliptical_gradients() {
    let mut a = single_peak(10.0, 1000.0, 3.7, 3.2);
    a[param::X_WIDTH] = 1.0;
    a[param::Y_WIDTH] = 1.7;
    a[param::ANGLE] = 0.6;
    let mut model = GaussianModel::new(GaussianShape::Elliptical, 8, 7, 1).unwrap();
    check_gradients(&mut model, &a, 1e-6);
}

#[test]
fn multi_peak_gradients() {
    let mut a = vec![0.0; param::count(2)];
    a[param::BACKGROUND] = 3.0;
    for (p, (x, y, sx, sy, t)) in [(2.4, 2.1, 1.0, 1.4, 0.3), (5.2, 4.3, 1.3, 0.8, -0.9)]
        .into_iter()
        .enumerate()
    {
        a[param::index(p, param::SIGNAL)] = 400.0 + 100.0 * p as f64;
        a[param::index(p, param::X_POSITION)] = x;
        a[param::index(p, param::Y_POSITION)] = y;
        a[param::index(p, param::X_WIDTH)] = sx;
        a[param::index(p, param::Y_WIDTH)] = sy;
        a[param::index(p, param::ANGLE)] = t;
    }
    let mut model = GaussianModel::new(GaussianShape::Elliptical, 8, 7, 2).unwrap();
    check_gradients(&mut model, &a, 1e-6);
}

// ═══════════════════════════════════════════════════════════════════
// Spline
// ═══════════════════════════════════════════════════════════════════

#[test]
fn spline_data_validation() {
    assert!(matches!(
        SplineData::new(2, 2, 1, vec![0.0; 3], 1.0, 1.0),
        Err(ModelError::InvalidSpline(_))
    ));
    assert!(SplineData::new(0, 2, 1, vec![], 1.0, 1.0).is_err());
    assert!(SplineData::new(1, 1, 1, vec![f64::NAN], 1.0, 1.0).is_err());
    assert!(SplineData::new(1, 1, 1, vec![1.0], 0.0, 1.0).is_err());
    let data = SplineData::new(3, 5, 7, vec![0.0; 105], 1.0, 1.0).unwrap();
    assert_eq!(data.centre(), [1.0, 2.0, 3.0]);
    assert_eq!(data.with_centre(0.5, 0.5, 0.5).centre(), [0.5, 0.5, 0.5]);
}

#[test]
fn spline_layout_and_capabilities() {
    let data = Arc::new(spline_data());
    let model = SplineModel::new(data.clone(), 7, 7, 1).unwrap();
    assert_eq!(model.layout().gradient_indices(), &[0, 1, 2, 3, 7]);

    let flat = SplineModel::with_capabilities(
        data.clone(),
        SplineModel::CAPABILITIES.without(Capabilities::DEPTH),
        7,
        7,
        1,
    )
    .unwrap();
    assert_eq!(flat.layout().gradient_indices(), &[0, 1, 2, 3]);

    assert!(SplineModel::with_capabilities(
        data,
        SplineModel::CAPABILITIES | Capabilities::WIDTH_X,
        7,
        7,
        1
    )
    .is_err());
}

#[test]
fn spline_reproduces_nodes() {
    // scale 1: pixel centres land exactly on grid nodes when the peak sits
    // on a pixel centre.
    let psf = |dx: f64, dy: f64, z: f64| (-(dx * dx + 2.0 * dy * dy) / 3.0 - 0.2 * z).exp();
    let data = Arc::new(SplineData::from_fn(21, 21, 5, 1.0, 1.0, psf).unwrap());
    let mut model = SplineModel::new(data, 7, 7, 1).unwrap();
    let mut a = single_peak(1.0, 50.0, 3.5, 2.5);
    a[param::Z_POSITION] = 1.0;
    model.initialise(&a);
    for (i, v) in model.values().enumerate() {
        let (px, py) = pixel_centre(i, 7);
        let expected = 1.0 + 50.0 * psf(px - 3.5, py - 2.5, 1.0);
        assert_near(v, expected, 1e-10, &format!("node value at {i}"));
    }
}

#[test]
fn spline_outside_grid_is_background() {
    let data = Arc::new(spline_data());
    let mut model = SplineModel::new(data, 7, 7, 1).unwrap();
    model.initialise(&single_peak(4.0, 1000.0, 100.0, 100.0));
    assert!(model.values().all(|v| v == 4.0));
}

#[test]
fn spline_extreme_coordinates_are_flat() {
    let data = Arc::new(spline_data());
    let mut model = SplineModel::new(data, 5, 5, 1).unwrap();
    let k = model.gradient_count();
    let (mut d1, mut d2) = (vec![0.0; k], vec![0.0; k]);
    for (x, y, z) in [(1e300, -1e300, 1e300), (-1e300, 1e300, -1e300), (f64::MAX, 2.5, f64::MIN)] {
        let mut a = single_peak(3.0, 1000.0, x, y);
        a[param::Z_POSITION] = z;
        model.initialise(&a);
        for i in 0..model.size() {
            let v = model.value_and_gradient2_at(i, &mut d1, &mut d2);
            assert_eq!(v, 3.0);
            assert_eq!(d1[0], 1.0);
            assert!(d1[1..].iter().chain(&d2).all(|&g| g == 0.0), "{d1:?} {d2:?}");
        }
    }
}

#[test]
fn spline_tracks_sampled_psf() {
    let data = Arc::new(spline_data());
    let mut model = SplineModel::new(data, 9, 9, 1).unwrap();
    let mut a = single_peak(0.0, 1000.0, 4.3, 4.6);
    a[param::Z_POSITION] = 0.3;
    model.initialise(&a);
    let w = 1.0 + 0.1 * 0.09;
    for (i, v) in model.values().enumerate() {
        let (px, py) = pixel_centre(i, 9);
        let (dx, dy) = (px - 4.3, py - 4.6);
        let exact =
            1000.0 * (-(dx * dx + dy * dy) / (2.0 * w * w)).exp() / (2.0 * core::f64::consts::PI * w * w);
        assert_near(v, exact, 5.0, &format!("interpolated sample {i}"));
    }
}

#[test]
fn spline_gradients() {
    let data = Arc::new(spline_data());
    let mut model = SplineModel::new(data, 7, 7, 1).unwrap();
    let mut a = single_peak(10.0, 1000.0, 3.3, 3.6);
    a[param::Z_POSITION] = 0.3;
    check_gradients(&mut model, &a, 1e-5);
}

#[test]
fn spline_two_peak_gradients() {
    let data = Arc::new(spline_data());
    let mut model = SplineModel::new(data, 8, 8, 2).unwrap();
    let mut a = vec![0.0; param::count(2)];
    a[param::BACKGROUND] = 2.0;
    for (p, (x, y, z)) in [(2.3, 3.1, 0.3), (5.4, 4.7, -0.6)].into_iter().enumerate() {
        a[param::index(p, param::SIGNAL)] = 600.0;
        a[param::index(p, param::X_POSITION)] = x;
        a[param::index(p, param::Y_POSITION)] = y;
        a[param::index(p, param::Z_POSITION)] = z;
    }
    check_gradients(&mut model, &a, 1e-5);
}
