//! Pivot-tangent inverse square root.
//!
//! The initial guess blends two tangents of `K2/√x` taken at `X1` and `X2`,
//! switching from the first to the second around `pivot` with an encrypted
//! step, and is then refined by inverse-square-root Newton steps.

use tracing::info;

use crate::{
    backend::Backend,
    comparison::ComparisonEvaluator,
    engine::{Handle, HeEngine},
    error::{Context, StatError, StatResult},
    newton::{RefinementEngine, RefinementParams},
};

/// Tangent interval; the step input is normalised by its width.
const INTERVAL: (f64, f64) = (0.001, 1000.0);
/// Depth the blended guess is refreshed to before refinement.
const GUESS_REFRESH_DEPTH: usize = 10;

/// Tangent table used when none is chosen.
pub const DEFAULT_PIVOT_DEPTH: u32 = 7;
/// Newton steps after the tangent guess.
pub const DEFAULT_PIVOT_ITERATIONS: usize = 12;

/// Tangent points and blend pivot, tuned per evaluation depth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TangentParams {
    /// Scale of the tangent target `k2/√x`.
    pub k2: f64,
    /// First tangent point.
    pub x1: f64,
    /// Second tangent point.
    pub x2: f64,
    /// Input where the guess switches tangents.
    pub pivot: f64,
}

impl TangentParams {
    /// Tuned parameters for evaluation depth 7, 8 or 9.
    pub fn for_depth(depth: u32) -> StatResult<Self> {
        let (k2, x1, x2, pivot) = match depth {
            7 => (1.6645, 0.3111, 343.6645, 0.9053),
            8 => (1.6876, 0.1322, 340.035, 0.3887),
            9 => (1.6958, 0.0876, 338.781, 0.2587),
            _ => {
                return Err(StatError::InvalidParameter(format!(
                    "pivot tangent depth {depth}; expected 7, 8 or 9"
                )))
            }
        };
        Ok(Self { k2, x1, x2, pivot })
    }

    /// `(slope, intercept)` of the tangent of `k2/√x` at `at`.
    fn tangent(&self, at: f64) -> (f64, f64) {
        (-0.5 * self.k2 * at.powf(-1.5), 1.5 * self.k2 / at.sqrt())
    }

    /// Plaintext form of the blended guess, with an exact step.
    pub fn initial_guess(&self, x: f64) -> f64 {
        let (s1, b1) = self.tangent(self.x1);
        let (s2, b2) = self.tangent(self.x2);
        let (slope, intercept) = if x >= self.pivot { (s2, b2) } else { (s1, b1) };
        slope * x + intercept
    }
}

/// `L1 + step((x − pivot)/(b − a))·(L2 − L1)`.
fn blended_guess<B: Backend>(
    engine: &HeEngine<B>,
    cmp: &ComparisonEvaluator<'_, B>,
    x: &Handle<B>,
    params: &TangentParams,
) -> StatResult<Handle<B>> {
    let (s1, b1) = params.tangent(params.x1);
    let (s2, b2) = params.tangent(params.x2);
    let first = engine.add_const(&engine.mul_const(x, s1)?, b1).context("first tangent")?;
    let gap = engine
        .add_const(&engine.mul_const(x, s2 - s1)?, b2 - b1)
        .context("tangent gap")?;

    let width = 1.0 / (INTERVAL.1 - INTERVAL.0);
    let centred = engine
        .sub_const(&engine.mul_const(x, width)?, params.pivot * width)
        .context("step input")?;
    let beta = cmp.step(&centred)?;
    let switched = engine.mul(&beta, &gap).context("gate tangent gap")?;
    engine.add(&first, &switched).context("blend tangents")
}

/// `1/√x` for `x ∈ [0.001, 1000]` from the pivot-tangent guess.
pub fn pivot_tangent<B: Backend>(
    engine: &HeEngine<B>,
    cmp: &ComparisonEvaluator<'_, B>,
    x: &Handle<B>,
    iterations: usize,
    depth: u32,
) -> StatResult<Handle<B>> {
    let params = TangentParams::for_depth(depth)?;
    info!(size = x.size(), iterations, depth, "pivot tangent inverse square root");
    let guess = blended_guess(engine, cmp, x, &params).context("pivot tangent guess")?;
    let guess = engine.refresh_below(guess, GUESS_REFRESH_DEPTH)?;
    RefinementEngine::new(engine)
        .refine(x, &guess, &RefinementParams::inv_sqrt(iterations))
        .context("refine pivot tangent")
}
