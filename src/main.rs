//! PP-Stat demo: accuracy and timing of the encrypted statistics on the
//! simulated scheme. Pass a TOML parameter file as the first argument to
//! override the defaults; set `RUST_LOG=debug` to see refreshes.

use std::error::Error;
use std::time::Instant;

use csv::Writer;
use ppstat_core::{
    reference, ApproximationBuilder, CompositePolynomial, EngineParameters, HeEngine,
    MomentLibrary, SimScheme,
};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::info;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let params = match std::env::args().nth(1) {
        Some(path) => EngineParameters::from_path(path)?,
        None => EngineParameters::default(),
    };
    info!(?params, "engine parameters");
    let engine = HeEngine::new(SimScheme::new(params)?);
    let lib = MomentLibrary::new(
        &engine,
        ApproximationBuilder::default(),
        CompositePolynomial::minimax_sign(),
    );

    let mut wtr = Writer::from_path("ppstat_results.csv")?;
    wtr.write_record(["operation", "size", "time_ms", "expected", "mean_rel_error"])?;

    // -------------- inverse square root over [0.001, 100] --------------
    let half = engine.max_slots() / 2;
    let mut xs = reference::linspace(0.001, 1.0, half);
    xs.extend(reference::linspace(1.0, 100.0, half));
    let ct = engine.encrypt(&xs)?;
    let start = Instant::now();
    let out = engine.decrypt(&lib.crypto_inv_sqrt(&ct, None)?);
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let want: Vec<f64> = xs.iter().map(|x| 1.0 / x.sqrt()).collect();
    let mre = reference::mean_relative_error(&out, &want);
    println!("inv_sqrt: n = {}, {elapsed_ms:.3} ms, MRE = {mre:e}", xs.len());
    wtr.write_record([
        "inv_sqrt".to_string(),
        xs.len().to_string(),
        format!("{elapsed_ms:.6}"),
        String::new(),
        format!("{mre:e}"),
    ])?;

    // -------------- statistics on uniform [0, 20] --------------
    let mut rng = StdRng::seed_from_u64(2024);
    let n = engine.max_slots();
    let x: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..20.0)).collect();
    let y: Vec<f64> = x.iter().map(|v| 0.5 * v + rng.gen_range(-4.0..4.0)).collect();
    let cx = engine.encrypt(&x)?;
    let cy = engine.encrypt(&y)?;

    let cases: [(&str, f64); 4] = [
        ("skewness", reference::skewness(&x)),
        ("kurtosis", reference::kurtosis(&x)),
        ("coeff_var", reference::coeff_var(&x)),
        ("p_corr_coeff", reference::correlation(&x, &y)),
    ];
    for (name, expected) in cases {
        let start = Instant::now();
        let handle = match name {
            "skewness" => lib.skewness(&cx, None)?,
            "kurtosis" => lib.kurtosis(&cx, None)?,
            "coeff_var" => lib.coeff_var(&cx, None)?,
            _ => lib.p_corr_coeff(&cx, &cy, None)?,
        };
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let got = engine.decrypt(&handle)[0];
        let rel = ((got - expected) / expected).abs();
        println!("{name}: got {got:.6}, expected {expected:.6}, rel err {rel:e}, {elapsed_ms:.3} ms");
        wtr.write_record([
            name.to_string(),
            n.to_string(),
            format!("{elapsed_ms:.6}"),
            format!("{expected}"),
            format!("{rel:e}"),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}
