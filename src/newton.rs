//! Fixed-iteration Newton-Raphson refinement of reciprocals and inverse
//! square roots, and the two end-to-end entry points built on it.
//!
//! No convergence test runs under encryption. Callers choose the iteration
//! count from how good the initial guess is known to be: the update
//! converges quadratically once `|1 − x·y₀^N| < 1` for order `N`.

use tracing::{info, trace};

use crate::{
    backend::Backend,
    chebyshev::{chebyshev_inv_sqrt, ApproximationBuilder, InvSqrtVariant},
    engine::{Handle, HeEngine},
    error::{Context, StatError, StatResult},
};

/// Bound used by [`crypto_inv_sqrt`] when none is given.
pub const DEFAULT_INV_SQRT_BOUND: f64 = 100.0;
/// Bound used by [`crypto_inv`] when none is given.
pub const DEFAULT_INV_BOUND: f64 = 2.0;
/// Depth below which the running estimate is refreshed.
pub const DEFAULT_REFRESH_DEPTH: usize = 3;

const INV_SQRT_ITERATIONS: usize = 6;
const INV_ITERATIONS: usize = 4;

/// Function a refinement converges to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefinementTarget {
    /// `y ← y·(2 − x·y)`, converging to `1/x`.
    Reciprocal,
    /// `y ← 1.5·y − 0.5·x·y³`, converging to `1/√x`.
    InvSqrt,
}

impl RefinementTarget {
    fn order(self) -> f64 {
        match self {
            Self::Reciprocal => 1.0,
            Self::InvSqrt => 2.0,
        }
    }
}

/// Iteration count, update family and input scaling of one refinement.
///
/// The iterate converges to the target of `prescale · x`, so a guess built
/// for an input already divided by `B` is refined against the true input by
/// setting `prescale = B`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RefinementParams {
    /// Update family.
    pub target: RefinementTarget,
    /// Newton steps to run.
    pub iterations: usize,
    /// Factor applied to `x` before iterating.
    pub prescale: f64,
    /// The iterate is refreshed when its level drops below this.
    pub refresh_depth: usize,
}

impl RefinementParams {
    /// `iterations` reciprocal steps on the unscaled input.
    pub fn reciprocal(iterations: usize) -> Self {
        Self {
            target: RefinementTarget::Reciprocal,
            iterations,
            prescale: 1.0,
            refresh_depth: DEFAULT_REFRESH_DEPTH,
        }
    }

    /// `iterations` inverse-square-root steps on the unscaled input.
    pub fn inv_sqrt(iterations: usize) -> Self {
        Self {
            target: RefinementTarget::InvSqrt,
            ..Self::reciprocal(iterations)
        }
    }

    /// Refines against `prescale · x` instead of `x`.
    #[must_use]
    pub fn with_prescale(mut self, prescale: f64) -> Self {
        self.prescale = prescale;
        self
    }

    /// Overrides the level below which the iterate is refreshed.
    #[must_use]
    pub fn with_refresh_depth(mut self, depth: usize) -> Self {
        self.refresh_depth = depth;
        self
    }

    /// Legacy integer modes: 0 reciprocal, 1 reciprocal of `b·x`,
    /// 2 inverse square root, 3 inverse square root of `b·x`.
    pub fn from_mode(mode: i32, b: f64, iterations: usize) -> StatResult<Self> {
        match mode {
            0 => Ok(Self::reciprocal(iterations)),
            1 => Ok(Self::reciprocal(iterations).with_prescale(b)),
            2 => Ok(Self::inv_sqrt(iterations)),
            3 => Ok(Self::inv_sqrt(iterations).with_prescale(b)),
            _ => Err(StatError::InvalidParameter(format!("newton mode {mode}"))),
        }
    }

    /// Factor applied to `x` before iterating: `prescale / N`.
    pub fn input_factor(&self) -> f64 {
        self.prescale / self.target.order()
    }

    fn validate(&self) -> StatResult<()> {
        if !(self.prescale.is_finite() && self.prescale > 0.0) {
            return Err(StatError::InvalidParameter(format!(
                "refinement prescale {}",
                self.prescale
            )));
        }
        Ok(())
    }
}

/// Runs [`RefinementParams`] against encrypted values.
pub struct RefinementEngine<'e, B: Backend> {
    engine: &'e HeEngine<B>,
}

impl<'e, B: Backend> RefinementEngine<'e, B> {
    /// Refinement running on `engine`.
    pub fn new(engine: &'e HeEngine<B>) -> Self {
        Self { engine }
    }

    /// Refines `init` towards the target of `x`.
    ///
    /// Every iteration costs two levels. With refresh disabled, the whole
    /// budget is checked before any work is done.
    pub fn refine(
        &self,
        x: &Handle<B>,
        init: &Handle<B>,
        params: &RefinementParams,
    ) -> StatResult<Handle<B>> {
        params.validate()?;
        let e = self.engine;
        let factor = params.input_factor();
        let scaled = factor != 1.0;

        if !e.bootstrapping() {
            let needed = 2 * params.iterations;
            let available = x
                .level()
                .saturating_sub(usize::from(scaled))
                .min(init.level());
            if available < needed {
                return Err(StatError::InsufficientLevel {
                    op: "newton refinement",
                    needed,
                    available,
                });
            }
        }

        let x = if scaled {
            e.mul_const(x, factor).context("prescale newton input")?
        } else {
            x.clone()
        };
        let x = e.refresh_below(x, 2)?;

        let order = params.target.order();
        let mut y = init.clone();
        for i in 0..params.iterations {
            y = e.refresh_below(y, params.refresh_depth)?;
            let lead = e.mul_const(&y, (order + 1.0) / order)?;
            let mut tail = e.mul(&x, &y)?;
            if params.target == RefinementTarget::InvSqrt {
                y = e.square(&y)?;
            }
            tail = e.mul(&tail, &y)?;
            y = e.sub(&lead, &tail)?;
            trace!(iteration = i, level = y.level(), "newton step");
        }
        Ok(y)
    }
}

/// `1/√x` for `x ∈ (0.001, bound)`: Chebyshev guess on the bounded input,
/// then six inverse-square-root Newton steps.
pub fn crypto_inv_sqrt<B: Backend>(
    engine: &HeEngine<B>,
    approx: &ApproximationBuilder,
    x: &Handle<B>,
    bound: Option<f64>,
) -> StatResult<Handle<B>> {
    let bound = bound.unwrap_or(DEFAULT_INV_SQRT_BOUND);
    info!(size = x.size(), bound, "inverse square root");
    let init = chebyshev_inv_sqrt(engine, approx, x, InvSqrtVariant::Bounded { bound })
        .context("initial inverse sqrt")?;
    let init = engine.refresh_below(init, DEFAULT_REFRESH_DEPTH)?;
    RefinementEngine::new(engine)
        .refine(x, &init, &RefinementParams::inv_sqrt(INV_SQRT_ITERATIONS))
        .context("refine inverse sqrt")
}

/// `1/x` for `x ∈ (0, bound)`: the squared inverse-square-root guess, then
/// four reciprocal Newton steps.
pub fn crypto_inv<B: Backend>(
    engine: &HeEngine<B>,
    approx: &ApproximationBuilder,
    x: &Handle<B>,
    bound: Option<f64>,
) -> StatResult<Handle<B>> {
    let bound = bound.unwrap_or(DEFAULT_INV_BOUND);
    info!(size = x.size(), bound, "reciprocal");
    let init = chebyshev_inv_sqrt(engine, approx, x, InvSqrtVariant::Bounded { bound })
        .context("initial inverse sqrt")?;
    let init = engine.square(&init).context("square initial guess")?;
    RefinementEngine::new(engine)
        .refine(x, &init, &RefinementParams::reciprocal(INV_ITERATIONS))
        .context("refine reciprocal")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, params::EngineParameters, scheme::SimScheme};
    use approx::assert_relative_eq;

    fn engine(log_n: u32, max_level: usize, bootstrapping: bool) -> HeEngine<SimScheme> {
        let params = EngineParameters::new(log_n, max_level, 40, bootstrapping);
        HeEngine::new(SimScheme::new(params).unwrap())
    }

    /// Plaintext form of the legacy update with integer mode.
    fn legacy(x: f64, y0: f64, b: f64, iter: usize, mode: i32) -> f64 {
        let (n, x) = match mode {
            1 => (1.0, b * x),
            2 => (2.0, x / 2.0),
            3 => (2.0, b * x / 2.0),
            _ => (1.0, x),
        };
        let mut y = y0;
        for _ in 0..iter {
            let a = y * (n + 1.0) / n;
            let mut t = x * y;
            if n == 2.0 {
                y *= y;
            }
            t *= y;
            y = a - t;
        }
        y
    }

    #[test]
    fn test_modes_reproduce_legacy_updates() {
        let e = engine(4, 30, false);
        let refine = RefinementEngine::new(&e);
        let b = 10.0;
        let cases = [(0, 0.8, 1.1), (1, 0.08, 1.1), (2, 0.5, 1.3), (3, 0.03, 1.2)];
        for (mode, x, y0) in cases {
            let params = RefinementParams::from_mode(mode, b, 3).unwrap();
            let cx = e.encrypt(&[x]).unwrap();
            let cy = e.encrypt(&[y0]).unwrap();
            let out = e.decrypt(&refine.refine(&cx, &cy, &params).unwrap())[0];
            assert_relative_eq!(out, legacy(x, y0, b, 3, mode), max_relative = 1e-7);
        }
        assert_eq!(RefinementParams::from_mode(3, b, 1).unwrap().input_factor(), 5.0);
        assert!(RefinementParams::from_mode(4, b, 1).is_err());
    }

    #[test]
    fn test_converges_to_targets() {
        let e = engine(4, 30, false);
        let refine = RefinementEngine::new(&e);
        let x = e.encrypt(&[0.5, 1.0, 1.7]).unwrap();
        let y0 = e.encrypt(&[1.3, 0.9, 0.6]).unwrap();
        let inv = e.decrypt(&refine.refine(&x, &y0, &RefinementParams::reciprocal(6)).unwrap());
        let isq = e.decrypt(&refine.refine(&x, &y0, &RefinementParams::inv_sqrt(6)).unwrap());
        for (i, v) in [0.5f64, 1.0, 1.7].iter().enumerate() {
            assert_relative_eq!(inv[i], 1.0 / v, max_relative = 1e-8);
            assert_relative_eq!(isq[i], 1.0 / v.sqrt(), max_relative = 1e-8);
        }
    }

    #[test]
    fn test_insufficient_level_is_checked_up_front() {
        let e = engine(4, 8, false);
        let refine = RefinementEngine::new(&e);
        let x = e.encrypt(&[0.5]).unwrap();
        let y0 = e.encrypt(&[1.3]).unwrap();
        // The inverse-sqrt update halves `x` first, which costs one level.
        let err = refine.refine(&x, &y0, &RefinementParams::inv_sqrt(5)).unwrap_err();
        assert!(matches!(
            err,
            StatError::InsufficientLevel { needed: 10, available: 7, .. }
        ));
        assert!(refine.refine(&x, &y0, &RefinementParams::inv_sqrt(4)).is_err());
        assert!(refine.refine(&x, &y0, &RefinementParams::inv_sqrt(3)).is_ok());

        // The reciprocal update leaves `x` untouched unless prescaled.
        assert!(refine.refine(&x, &y0, &RefinementParams::reciprocal(4)).is_ok());
        let err = refine
            .refine(&x, &y0, &RefinementParams::reciprocal(4).with_prescale(3.0))
            .unwrap_err();
        assert!(matches!(
            err,
            StatError::InsufficientLevel { needed: 8, available: 7, .. }
        ));
    }

    #[test]
    fn test_refresh_keeps_iterating() {
        let e = engine(4, 5, true);
        let refine = RefinementEngine::new(&e);
        let x = e.encrypt(&[3.0]).unwrap();
        let y0 = e.encrypt(&[0.5]).unwrap();
        let out = refine.refine(&x, &y0, &RefinementParams::inv_sqrt(8)).unwrap();
        assert_relative_eq!(e.decrypt(&out)[0], 1.0 / 3f64.sqrt(), max_relative = 1e-6);

        let eager = RefinementParams::inv_sqrt(8).with_refresh_depth(5);
        assert_eq!(eager.refresh_depth, 5);
        let out = refine.refine(&x, &y0, &eager).unwrap();
        assert_relative_eq!(e.decrypt(&out)[0], 1.0 / 3f64.sqrt(), max_relative = 1e-6);
    }

    #[test]
    fn test_crypto_inv_sqrt_accuracy() {
        let e = engine(10, 11, true);
        let approx = ApproximationBuilder::default();
        let values: Vec<f64> = (0..500).map(|i| 0.001 + f64::from(i) * (99.999 / 499.0)).collect();
        let x = e.encrypt(&values).unwrap();
        let out = e.decrypt(&crypto_inv_sqrt(&e, &approx, &x, None).unwrap());
        for (v, y) in values.iter().zip(out) {
            assert_relative_eq!(y, 1.0 / v.sqrt(), max_relative = 1e-3);
        }
    }

    #[test]
    fn test_crypto_inv() {
        let e = engine(6, 11, true);
        let approx = ApproximationBuilder::default();
        let values = [0.05, 0.3, 0.9, 1.4, 1.95];
        let x = e.encrypt(&values).unwrap();
        let out = e.decrypt(&crypto_inv(&e, &approx, &x, None).unwrap());
        for (v, y) in values.iter().zip(out) {
            assert_relative_eq!(y, 1.0 / v, max_relative = 1e-4);
        }
        let wide = e.encrypt(&[12.0, 40.0]).unwrap();
        let out = e.decrypt(&crypto_inv(&e, &approx, &wide, Some(50.0)).unwrap());
        assert_relative_eq!(out[0], 1.0 / 12.0, max_relative = 1e-4);
        assert_relative_eq!(out[1], 1.0 / 40.0, max_relative = 1e-4);
    }
}
