use approx::assert_relative_eq;
use ppstat_core::{
    reference, ApproximationBuilder, CompositePolynomial, EngineParameters, HeEngine,
    MomentLibrary, SimScheme,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn engine(log_n: u32) -> HeEngine<SimScheme> {
    let params = EngineParameters::new(log_n, 11, 40, true).with_seed(11);
    HeEngine::new(SimScheme::new(params).unwrap())
}

fn uniform(rng: &mut StdRng, n: usize, lo: f64, hi: f64) -> Vec<f64> {
    (0..n).map(|_| rng.gen_range(lo..hi)).collect()
}

fn check_statistics(engine: &HeEngine<SimScheme>, n: usize, seed: u64) {
    let lib = MomentLibrary::new(
        engine,
        ApproximationBuilder::default(),
        CompositePolynomial::minimax_sign(),
    );
    let mut rng = StdRng::seed_from_u64(seed);
    let x = uniform(&mut rng, n, 0.0, 20.0);
    let noise = uniform(&mut rng, n, -5.0, 5.0);
    let y: Vec<f64> = x.iter().zip(&noise).map(|(a, e)| 20.0 - 0.7 * a + e).collect();
    let cx = engine.encrypt(&x).unwrap();
    let cy = engine.encrypt(&y).unwrap();

    let skew = engine.decrypt(&lib.skewness(&cx, None).unwrap())[0];
    // Uniform data has skewness near zero; compare absolutely.
    assert!((skew - reference::skewness(&x)).abs() < 1e-2);

    let kurt = engine.decrypt(&lib.kurtosis(&cx, None).unwrap())[0];
    assert_relative_eq!(kurt, reference::kurtosis(&x), max_relative = 1e-2);

    let cv = engine.decrypt(&lib.coeff_var(&cx, None).unwrap());
    assert_eq!(cv.len(), n);
    assert_relative_eq!(cv[n - 1], reference::coeff_var(&x), max_relative = 1e-2);

    let r = engine.decrypt(&lib.p_corr_coeff(&cx, &cy, None).unwrap())[0];
    assert_relative_eq!(r, reference::correlation(&x, &y), max_relative = 1e-2);
}

#[test]
fn statistics_match_plaintext() {
    check_statistics(&engine(10), 5000, 1);
}

#[test]
fn statistics_match_plaintext_with_partial_tail() {
    // Seven containers of 16384 slots, the last one partially filled.
    let engine = engine(15);
    let n: usize = 100_000;
    assert_eq!(n.div_ceil(engine.max_slots()), 7);
    assert_ne!(n % engine.max_slots(), 0);
    check_statistics(&engine, n, 6);
}

#[test]
#[ignore = "one million values; run with --ignored"]
fn statistics_match_plaintext_million() {
    check_statistics(&engine(16), 1_000_000, 2);
}

#[test]
fn z_score_has_zero_mean_unit_variance() {
    let engine = engine(9);
    let lib = MomentLibrary::new(
        &engine,
        ApproximationBuilder::default(),
        CompositePolynomial::minimax_sign(),
    );
    let mut rng = StdRng::seed_from_u64(3);
    let x = uniform(&mut rng, 1200, 0.0, 20.0);
    let z = engine.decrypt(&lib.z_score_norm(&engine.encrypt(&x).unwrap(), None).unwrap());
    assert_eq!(z.len(), x.len());
    assert!(reference::mean(&z).abs() < 1e-6);
    assert_relative_eq!(reference::variance(&z), 1.0, max_relative = 1e-4);
}

#[test]
fn coeff_var_restores_negative_sign() {
    let engine = engine(9);
    let lib = MomentLibrary::new(
        &engine,
        ApproximationBuilder::default(),
        CompositePolynomial::minimax_sign(),
    );
    let mut rng = StdRng::seed_from_u64(4);
    let x = uniform(&mut rng, 900, -20.0, 0.0);
    let cv = engine.decrypt(&lib.coeff_var(&engine.encrypt(&x).unwrap(), None).unwrap());
    let want = reference::coeff_var(&x);
    assert!(want < 0.0);
    assert_relative_eq!(cv[0], want, max_relative = 1e-3);
    assert_relative_eq!(cv[899], want, max_relative = 1e-3);
}

#[test]
fn round_trip_within_noise() {
    let engine = engine(7);
    let mut rng = StdRng::seed_from_u64(5);
    for n in [1, 127, 128, 129, 1000] {
        let v = uniform(&mut rng, n, -50.0, 50.0);
        let out = engine.decrypt(&engine.encrypt(&v).unwrap());
        assert_eq!(out.len(), n);
        for (a, b) in v.iter().zip(out) {
            assert_relative_eq!(*a, b, epsilon = 1e-6, max_relative = 1e-6);
        }
    }
}
