//! Summary statistics over encrypted vectors.
//!
//! Every reciprocal or inverse square root is produced coarse-then-refine:
//! a Chebyshev guess is built against an input deliberately divided by the
//! scale bound `B` (so it lands inside the approximation interval before the
//! data scale is known), then Newton steps refine it against the true input.
//!
//! Reductions return full containers that logically hold one value; they are
//! narrowed with `select_one` and broadcast with `extend_to` before being
//! combined with wider vectors.

use tracing::info;

use crate::{
    backend::Backend,
    chebyshev::{self, chebyshev_inv_sqrt, ApproximationBuilder, InvSqrtVariant, SqrtVariant},
    comparison::ComparisonEvaluator,
    engine::{Handle, HeEngine},
    error::{Context, StatError, StatResult},
    newton::{self, RefinementEngine, RefinementParams, DEFAULT_REFRESH_DEPTH},
    polynomial::CompositePolynomial,
};

/// Scale bound used when a statistic is called without one.
pub const DEFAULT_SCALE_BOUND: f64 = 100.0;
const EXCESS_KURTOSIS_BIAS: f64 = 3.0;

const INV_STD_ITERATIONS: usize = 5;
const INV_STD_CORRELATION_ITERATIONS: usize = 6;

const CV_SIGN_REFRESH_LEVEL: usize = 10;
const CV_NEWTON_ITERATIONS: usize = 2;
const CV_SQRT_REFRESH_DEPTH: usize = 2;

/// The seven statistics plus the standalone reciprocal and root operations.
pub struct MomentLibrary<'e, B: Backend> {
    engine: &'e HeEngine<B>,
    approx: ApproximationBuilder,
    comparison: ComparisonEvaluator<'e, B>,
}

fn scale_bound(bound: Option<f64>) -> StatResult<f64> {
    let b = bound.unwrap_or(DEFAULT_SCALE_BOUND);
    if b.is_finite() && b > 0.0 {
        Ok(b)
    } else {
        Err(StatError::InvalidParameter(format!("scale bound {b}")))
    }
}

impl<'e, B: Backend> MomentLibrary<'e, B> {
    /// `sign` is the composite polynomial used wherever a sign is needed.
    pub fn new(engine: &'e HeEngine<B>, approx: ApproximationBuilder, sign: CompositePolynomial) -> Self {
        Self {
            engine,
            approx,
            comparison: ComparisonEvaluator::new(engine, sign),
        }
    }

    /// Mean as a reduction result.
    pub fn mean(&self, v: &Handle<B>) -> StatResult<Handle<B>> {
        self.engine.mean(v).context("compute mean")
    }

    /// Population variance as a reduction result.
    pub fn variance(&self, v: &Handle<B>) -> StatResult<Handle<B>> {
        self.engine.variance(v).context("compute variance")
    }

    /// `Sum(v²)/d2 − (Sum(v)/d1)²`.
    pub fn variance_with_denominators(&self, v: &Handle<B>, d1: f64, d2: f64) -> StatResult<Handle<B>> {
        self.engine
            .variance_with_denominators(v, d1, d2)
            .context("compute variance (custom denominators)")
    }

    /// `1/σ` as a one-container handle.
    ///
    /// The guess evaluates `1/√(B²·v')` on `v' = Var/B²`, which must fall in
    /// `(0, 2)`; the refinement then runs on the true variance.
    fn inv_std(&self, v: &Handle<B>, b: f64, iterations: usize) -> StatResult<Handle<B>> {
        let e = self.engine;
        let n = v.size() as f64;
        let approx_var = e
            .variance_with_denominators(v, n * b, n * b * b)
            .context("compute variance (approx)")?;
        let approx_var = e.select_one(&approx_var);
        let guess = chebyshev_inv_sqrt(e, &self.approx, &approx_var, InvSqrtVariant::Scaled { factor: b * b })
            .context("initial inverse std")?;
        let guess = e.refresh_below(guess, DEFAULT_REFRESH_DEPTH)?;

        let var = e.variance(v).context("compute variance (refined)")?;
        let var = e.select_one(&var);
        RefinementEngine::new(e)
            .refine(&var, &guess, &RefinementParams::inv_sqrt(iterations))
            .context("refine inverse std")
    }

    fn centred(&self, v: &Handle<B>) -> StatResult<Handle<B>> {
        let mean = self.mean(v)?;
        self.engine.sub(v, &mean).context("center input")
    }

    /// `(v − mean)/σ`.
    pub fn z_score_norm(&self, v: &Handle<B>, bound: Option<f64>) -> StatResult<Handle<B>> {
        let b = scale_bound(bound)?;
        info!(size = v.size(), bound = b, "z-score normalisation");
        let e = self.engine;
        let centred = self.centred(v)?;
        let inv_std = self.inv_std(v, b, INV_STD_ITERATIONS)?;
        let inv_std = e.broadcast_like(&inv_std, &centred);
        let z = e.mul(&centred, &inv_std).context("scale by inverse std")?;
        info!(level = z.level(), "z-score normalisation done");
        Ok(z)
    }

    /// `E[(v − mean)³]/σ³`.
    pub fn skewness(&self, v: &Handle<B>, bound: Option<f64>) -> StatResult<Handle<B>> {
        let b = scale_bound(bound)?;
        info!(size = v.size(), bound = b, "skewness");
        let e = self.engine;
        let centred = self.centred(v)?;
        let sq = e.square(&centred).context("x^2")?;
        let cube = e.mul(&centred, &sq).context("x^3")?;
        let numerator = e.mean(&cube).context("mean of x^3")?;

        let inv_std = self.inv_std(v, b, INV_STD_ITERATIONS)?;
        let inv_var = e.square(&inv_std).context("inverse variance")?;
        let inv_cube = e.mul(&inv_std, &inv_var).context("inverse std cubed")?;
        let inv_cube = e.broadcast_like(&inv_cube, &numerator);
        let skew = e.mul(&numerator, &inv_cube).context("final multiply")?;
        info!(level = skew.level(), "skewness done");
        Ok(skew)
    }

    /// Excess kurtosis, `E[(v − mean)⁴]/σ⁴ − 3`.
    pub fn kurtosis(&self, v: &Handle<B>, bound: Option<f64>) -> StatResult<Handle<B>> {
        let b = scale_bound(bound)?;
        info!(size = v.size(), bound = b, "kurtosis");
        let e = self.engine;
        let centred = self.centred(v)?;
        let sq = e.square(&centred).context("x^2")?;
        let fourth = e.square(&sq).context("x^4")?;
        let numerator = e.mean(&fourth).context("mean of x^4")?;

        let inv_std = self.inv_std(v, b, INV_STD_ITERATIONS)?;
        let inv_var = e.square(&inv_std).context("inverse variance")?;
        let inv_fourth = e.square(&inv_var).context("inverse variance squared")?;
        let inv_fourth = e.broadcast_like(&inv_fourth, &numerator);
        let kurt = e.mul(&numerator, &inv_fourth).context("final multiply")?;
        let kurt = e.sub_const(&kurt, EXCESS_KURTOSIS_BIAS).context("subtract bias")?;
        info!(level = kurt.level(), "kurtosis done");
        Ok(kurt)
    }

    /// `σ/μ`, the reciprocal of `|μ|` carrying the sign of the mean back in.
    ///
    /// Needs `|mean|/B ≤ 1` and clear of zero for the sign, and `Var/B² < 2`
    /// for the square root.
    pub fn coeff_var(&self, v: &Handle<B>, bound: Option<f64>) -> StatResult<Handle<B>> {
        let b = scale_bound(bound)?;
        info!(size = v.size(), bound = b, "coefficient of variation");
        let e = self.engine;
        let base = v.size() as f64 * b;

        let mean = e.mean_with_denominator(v, base).context("mean")?;
        let sign = self
            .comparison
            .sign(&e.select_one(&mean))
            .context("sign(mean)")?;
        let sign = e.refresh_below(sign, CV_SIGN_REFRESH_LEVEL)?;
        let sign_mean = e.broadcast_like(&sign, &mean);
        let abs_mean = e.mul(&mean, &sign_mean).context("signed mean")?;
        let abs_mean = e.select_one(&abs_mean);

        let guess = chebyshev_inv_sqrt(e, &self.approx, &abs_mean, InvSqrtVariant::Scaled { factor: b })
            .context("inverse sqrt of |mean|")?;
        let guess = e.refresh_below(guess, DEFAULT_REFRESH_DEPTH)?;
        let guess = e.square(&guess).context("square inverse sqrt")?;
        let params = RefinementParams::reciprocal(CV_NEWTON_ITERATIONS).with_prescale(b);
        let inv_abs_mean = RefinementEngine::new(e)
            .refine(&abs_mean, &guess, &params)
            .context("refine inverse |mean|")?;
        let sign_one = e.select_one(&sign_mean);
        let inv_mean = e.mul(&inv_abs_mean, &sign_one).context("restore sign to inverse mean")?;

        let var = e
            .variance_with_denominators(v, base, base * b)
            .context("variance")?;
        let var = e.select_one(&var);
        let std = chebyshev::crypto_sqrt(e, &self.approx, &var, SqrtVariant::Unit)
            .context("sqrt(variance)")?;
        let std = e.refresh_below(std, CV_SQRT_REFRESH_DEPTH)?;
        let std = e.mul_const(&std, b).context("rescale sqrt(variance)")?;

        let cv = e.mul(&std, &inv_mean).context("final multiply")?;
        let cv = e.broadcast_like(&cv, v);
        info!(level = cv.level(), "coefficient of variation done");
        Ok(cv)
    }

    /// Pearson correlation of `x` and `y`.
    pub fn p_corr_coeff(&self, x: &Handle<B>, y: &Handle<B>, bound: Option<f64>) -> StatResult<Handle<B>> {
        let b = scale_bound(bound)?;
        info!(size = x.size(), bound = b, "pearson correlation");
        let e = self.engine;
        let xc = self.centred(x).context("center x")?;
        let yc = self.centred(y).context("center y")?;
        let prod = e.mul(&xc, &yc).context("x·y")?;
        let numerator = e.mean(&prod).context("mean of x·y")?;

        let inv_x = self.inv_std(x, b, INV_STD_CORRELATION_ITERATIONS).context("inverse std (x)")?;
        let inv_y = self.inv_std(y, b, INV_STD_CORRELATION_ITERATIONS).context("inverse std (y)")?;
        let denom = e.mul(&inv_x, &inv_y).context("inverse std product")?;
        let denom = e.broadcast_like(&denom, &numerator);
        let corr = e.mul(&numerator, &denom).context("final multiply")?;
        info!(level = corr.level(), "pearson correlation done");
        Ok(corr)
    }

    /// `1/x` for `x ∈ (0, bound)`, bound 2 by default.
    pub fn crypto_inv(&self, x: &Handle<B>, bound: Option<f64>) -> StatResult<Handle<B>> {
        newton::crypto_inv(self.engine, &self.approx, x, bound)
    }

    /// `1/√x` for `x ∈ (0.001, bound)`, bound 100 by default.
    pub fn crypto_inv_sqrt(&self, x: &Handle<B>, bound: Option<f64>) -> StatResult<Handle<B>> {
        newton::crypto_inv_sqrt(self.engine, &self.approx, x, bound)
    }

    /// `√x` for `x ∈ (0, 2)`, or for `x ∈ (0, bound)` when a bound is given.
    pub fn crypto_sqrt(&self, x: &Handle<B>, bound: Option<f64>) -> StatResult<Handle<B>> {
        let e = self.engine;
        info!(size = x.size(), ?bound, "square root");
        match bound {
            None => chebyshev::crypto_sqrt(e, &self.approx, x, SqrtVariant::Unit),
            Some(b) => {
                let b = scale_bound(Some(b))?;
                let normalised = chebyshev::crypto_sqrt(e, &self.approx, x, SqrtVariant::Normalized { bound: b })?;
                e.mul_const(&normalised, (b / 2.0).sqrt()).context("undo normalisation")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, params::EngineParameters, reference, scheme::SimScheme};
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn engine(log_n: u32) -> HeEngine<SimScheme> {
        let params = EngineParameters::new(log_n, 11, 40, true).with_seed(7);
        HeEngine::new(SimScheme::new(params).unwrap())
    }

    fn uniform(n: usize, lo: f64, hi: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| rng.gen_range(lo..hi)).collect()
    }

    fn library(e: &HeEngine<SimScheme>) -> MomentLibrary<'_, SimScheme> {
        MomentLibrary::new(e, ApproximationBuilder::default(), CompositePolynomial::minimax_sign())
    }

    #[test]
    fn test_mean_and_variance() {
        let e = engine(8);
        let lib = library(&e);
        let values = uniform(600, 0.0, 20.0, 1);
        let v = e.encrypt(&values).unwrap();
        let mean = e.decrypt(&lib.mean(&v).unwrap());
        assert_eq!(mean.len(), 600);
        assert_relative_eq!(mean[599], reference::mean(&values), max_relative = 1e-6);
        let var = e.decrypt(&lib.variance(&v).unwrap());
        assert_relative_eq!(var[0], reference::variance(&values), max_relative = 1e-6);
    }

    #[test]
    fn test_z_score_norm() {
        let e = engine(8);
        let lib = library(&e);
        let values = uniform(300, 0.0, 20.0, 2);
        let v = e.encrypt(&values).unwrap();
        let z = e.decrypt(&lib.z_score_norm(&v, None).unwrap());
        for (got, want) in z.iter().zip(reference::z_score_norm(&values)) {
            assert_relative_eq!(*got, want, epsilon = 1e-4, max_relative = 1e-4);
        }
    }

    #[test]
    fn test_higher_moments() {
        let e = engine(8);
        let lib = library(&e);
        let values = uniform(400, 0.0, 20.0, 3);
        let v = e.encrypt(&values).unwrap();
        let skew = e.decrypt(&lib.skewness(&v, None).unwrap())[0];
        assert_relative_eq!(skew, reference::skewness(&values), epsilon = 1e-3);
        let kurt = e.decrypt(&lib.kurtosis(&v, None).unwrap())[0];
        assert_relative_eq!(kurt, reference::kurtosis(&values), max_relative = 1e-3);
    }

    #[test]
    fn test_coeff_var_keeps_sign_of_mean() {
        let e = engine(8);
        let lib = library(&e);
        let values = uniform(300, 0.0, 20.0, 4);
        let v = e.encrypt(&values).unwrap();
        let cv = lib.coeff_var(&v, None).unwrap();
        assert_eq!(cv.container_count(), v.container_count());
        assert_relative_eq!(e.decrypt(&cv)[0], reference::coeff_var(&values), max_relative = 1e-3);

        let negative: Vec<f64> = values.iter().map(|x| -x).collect();
        let cv = lib.coeff_var(&e.encrypt(&negative).unwrap(), None).unwrap();
        let got = e.decrypt(&cv)[0];
        assert!(got < 0.0);
        assert_relative_eq!(got, reference::coeff_var(&negative), max_relative = 1e-3);
    }

    #[test]
    fn test_p_corr_coeff() {
        let e = engine(8);
        let lib = library(&e);
        let x = uniform(250, 0.0, 20.0, 5);
        let noise = uniform(250, -4.0, 4.0, 6);
        let y: Vec<f64> = x.iter().zip(&noise).map(|(a, n)| 0.5 * a + n + 3.0).collect();
        let cx = e.encrypt(&x).unwrap();
        let cy = e.encrypt(&y).unwrap();
        let r = e.decrypt(&lib.p_corr_coeff(&cx, &cy, None).unwrap())[0];
        assert_relative_eq!(r, reference::correlation(&x, &y), max_relative = 1e-3);

        let short = e.encrypt(&x[..100]).unwrap();
        let err = lib.p_corr_coeff(&cx, &short, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    }

    #[test]
    fn test_crypto_sqrt() {
        let e = engine(6);
        let lib = library(&e);
        let unit = [0.05, 0.6, 1.3, 1.9];
        let out = e.decrypt(&lib.crypto_sqrt(&e.encrypt(&unit).unwrap(), None).unwrap());
        for (x, y) in unit.iter().zip(out) {
            assert_relative_eq!(y, x.sqrt(), max_relative = 1e-3);
        }
        let wide = [2.0, 30.0, 85.0];
        let out = e.decrypt(&lib.crypto_sqrt(&e.encrypt(&wide).unwrap(), Some(100.0)).unwrap());
        for (x, y) in wide.iter().zip(out) {
            assert_relative_eq!(y, x.sqrt(), max_relative = 1e-3);
        }
    }

    #[test]
    fn test_invalid_bound() {
        let e = engine(6);
        let lib = library(&e);
        let v = e.encrypt(&[1.0, 2.0, 3.0]).unwrap();
        let err = lib.skewness(&v, Some(0.0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }
}
