//! Sign, step and smooth max/min on encrypted vectors.

use crate::{
    backend::Backend,
    engine::{Handle, HeEngine},
    error::{Context, StatResult},
    poly_eval::PolynomialEvaluator,
    polynomial::CompositePolynomial,
};

/// Comparison by a composite minimax approximation of `sign`.
///
/// Inputs must be prescaled into `[-1, 1]`; the resolution near zero is
/// whatever the supplied composite polynomial provides.
pub struct ComparisonEvaluator<'e, B: Backend> {
    engine: &'e HeEngine<B>,
    evaluator: PolynomialEvaluator<'e, B>,
    sign: CompositePolynomial,
    step: CompositePolynomial,
}

impl<'e, B: Backend> ComparisonEvaluator<'e, B> {
    /// Evaluator for `sign`; the step polynomial is derived from it.
    pub fn new(engine: &'e HeEngine<B>, sign: CompositePolynomial) -> Self {
        let step = sign.to_step();
        Self {
            engine,
            evaluator: PolynomialEvaluator::new(engine),
            sign,
            step,
        }
    }

    /// ≈ 1 for positive, −1 for negative, 0 at zero.
    pub fn sign(&self, x: &Handle<B>) -> StatResult<Handle<B>> {
        self.evaluator.evaluate_composite(x, &self.sign).context("evaluate sign")
    }

    /// `(sign(x) + 1) / 2`, with the affine map folded into the last stage.
    pub fn step(&self, x: &Handle<B>) -> StatResult<Handle<B>> {
        self.evaluator.evaluate_composite(x, &self.step).context("evaluate step")
    }

    /// `step(a − b)·(a − b) + b`. Requires `a + b ∈ [-1, 1]` and equal scales.
    pub fn max(&self, a: &Handle<B>, b: &Handle<B>) -> StatResult<Handle<B>> {
        let gated = self.step_diff(a, b)?;
        self.engine.add(&gated, b).context("max: add second operand")
    }

    /// `a − step(a − b)·(a − b)`. Same preconditions as [`Self::max`].
    pub fn min(&self, a: &Handle<B>, b: &Handle<B>) -> StatResult<Handle<B>> {
        let gated = self.step_diff(a, b)?;
        self.engine.sub(a, &gated).context("min: subtract gate")
    }

    fn step_diff(&self, a: &Handle<B>, b: &Handle<B>) -> StatResult<Handle<B>> {
        let e = self.engine;
        let diff = e.sub(a, b).context("difference")?;
        let diff = e.ensure_level(&diff, 1, "extremum gate")?.into_owned();
        let step = self.step(&diff)?;
        let step = e.ensure_level(&step, 1, "extremum gate")?;
        e.mul(&diff, &step).context("step times difference")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, params::EngineParameters, scheme::SimScheme};
    use approx::assert_abs_diff_eq;

    fn engine(bootstrapping: bool) -> HeEngine<SimScheme> {
        let params = EngineParameters::new(8, 11, 40, bootstrapping);
        HeEngine::new(SimScheme::new(params).unwrap())
    }

    #[test]
    fn test_sign_boundary() {
        let e = engine(true);
        let cmp = ComparisonEvaluator::new(&e, CompositePolynomial::minimax_sign());
        let xs: Vec<f64> = (0..=200).map(|i| -1.0 + f64::from(i) * 0.01).collect();
        let out = e.decrypt(&cmp.sign(&e.encrypt(&xs).unwrap()).unwrap());
        for (x, y) in xs.iter().zip(out) {
            if x.abs() > 0.1 {
                assert_abs_diff_eq!(y, x.signum(), epsilon = 1e-2);
            } else {
                assert!((-1.0 - 1e-6..=1.0 + 1e-6).contains(&y), "sign({x}) = {y}");
            }
        }
    }

    #[test]
    fn test_step() {
        let e = engine(true);
        let cmp = ComparisonEvaluator::new(&e, CompositePolynomial::minimax_sign());
        let xs = [-0.8, -0.05, 0.0, 0.05, 0.8];
        let out = e.decrypt(&cmp.step(&e.encrypt(&xs).unwrap()).unwrap());
        let expected = [0.0, 0.0, 0.5, 1.0, 1.0];
        for (i, (y, want)) in out.iter().zip(expected).enumerate() {
            if i == 2 {
                // Noise at zero is amplified by the steep transition.
                assert!((0.0..=1.0).contains(y), "step(0) = {y}");
            } else {
                assert_abs_diff_eq!(*y, want, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_step_at_zero_is_half_without_noise() {
        let params = EngineParameters::new(8, 11, 40, true).noiseless();
        let e = HeEngine::new(SimScheme::new(params).unwrap());
        let cmp = ComparisonEvaluator::new(&e, CompositePolynomial::minimax_sign());
        let out = e.decrypt(&cmp.step(&e.encrypt(&[0.0]).unwrap()).unwrap());
        assert_abs_diff_eq!(out[0], 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_max_min() {
        let e = engine(true);
        let cmp = ComparisonEvaluator::new(&e, CompositePolynomial::minimax_sign());
        let a = [0.4, -0.3, 0.1, -0.45, 0.2];
        let b = [0.1, 0.5, -0.6, -0.2, 0.2];
        let ca = e.encrypt(&a).unwrap();
        let cb = e.encrypt(&b).unwrap();
        let hi = e.decrypt(&cmp.max(&ca, &cb).unwrap());
        let lo = e.decrypt(&cmp.min(&ca, &cb).unwrap());
        for i in 0..a.len() {
            assert_abs_diff_eq!(hi[i], a[i].max(b[i]), epsilon = 1e-3);
            assert_abs_diff_eq!(lo[i], a[i].min(b[i]), epsilon = 1e-3);
        }
    }

    #[test]
    fn test_needs_refresh_for_composite() {
        let e = engine(false);
        let cmp = ComparisonEvaluator::new(&e, CompositePolynomial::minimax_sign());
        let x = e.encrypt(&[0.5]).unwrap();
        let err = cmp.sign(&x).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientLevel);
        assert!(err.to_string().starts_with("evaluate sign: composite stage"));
    }

    #[test]
    fn test_max_min_insufficient_level_without_refresh() {
        let e = engine(false);
        let cmp = ComparisonEvaluator::new(&e, CompositePolynomial::minimax_sign());
        let a = e.encrypt(&[0.3, -0.1]).unwrap();
        let b = e.encrypt(&[0.1, 0.2]).unwrap();
        let err = cmp.max(&a, &b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientLevel);
        let err = cmp.min(&a, &b).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientLevel);
        assert!(err.to_string().starts_with("evaluate step"));
    }

    #[test]
    fn test_custom_sign_table() {
        // p(x) = (3x − x³)/2 in the Chebyshev basis: 9/8·T1 − 1/8·T3.
        let single = CompositePolynomial::from_rows(&[&[0.0, 1.125, 0.0, -0.125]]).unwrap();
        let e = engine(false);
        let cmp = ComparisonEvaluator::new(&e, single);
        let xs = [-0.5, 0.0, 0.5];
        let out = e.decrypt(&cmp.sign(&e.encrypt(&xs).unwrap()).unwrap());
        for (x, y) in xs.iter().zip(out) {
            assert_abs_diff_eq!(y, (3.0 * x - x * x * x) / 2.0, epsilon = 1e-6);
        }
        assert!(CompositePolynomial::from_rows(&[]).is_err());
    }
}
