//! Chebyshev interpolation of scalar targets, and the square-root /
//! inverse-square-root approximations built from it.

use std::sync::OnceLock;

use tracing::debug;

use crate::{
    backend::Backend,
    bigfixed::Fixed,
    engine::{Handle, HeEngine},
    error::{Context, StatError, StatResult},
    poly_eval::PolynomialEvaluator,
    polynomial::Polynomial,
};

/// Default precision parameter `d`.
pub const DEFAULT_PRECISION: u32 = 9;

/// Node count `2^d − 2` for precision parameter `d`.
pub fn nodes_for_precision(d: u32) -> usize {
    (1usize << d).saturating_sub(2)
}

/// `cos(π·m / 2n)` for every `m`, from a quarter-period table.
struct CosineTable {
    n: usize,
    quarter: Vec<Fixed>,
}

impl CosineTable {
    fn new(n: usize) -> Self {
        let step = Fixed::pi().div_int(2 * n as i64);
        let quarter = (0..=n).map(|m| step.mul_int(m as i64).cos()).collect();
        Self { n, quarter }
    }

    fn get(&self, m: usize) -> Fixed {
        let n = self.n;
        let m = m % (4 * n);
        if m <= n {
            self.quarter[m].clone()
        } else if m <= 2 * n {
            -&self.quarter[2 * n - m]
        } else if m <= 3 * n {
            -&self.quarter[m - 2 * n]
        } else {
            self.quarter[4 * n - m].clone()
        }
    }
}

/// Synthesises Chebyshev approximations.
///
/// Interpolation sums run in 192-bit fixed point so that coefficient
/// rounding stays far below the approximation error. The two unit targets
/// `1/√(x+1)` and `√(x+1)` on `[-1, 1]` are synthesised once per builder
/// and rescaled for each variant.
pub struct ApproximationBuilder {
    nodes: usize,
    inv_sqrt: OnceLock<Polynomial>,
    sqrt: OnceLock<Polynomial>,
}

impl Default for ApproximationBuilder {
    fn default() -> Self {
        Self::with_precision(DEFAULT_PRECISION)
    }
}

impl ApproximationBuilder {
    /// Builder with `2^d − 2` nodes.
    pub fn with_precision(d: u32) -> Self {
        Self::with_nodes(nodes_for_precision(d))
    }

    /// Builder interpolating at `nodes` points.
    pub fn with_nodes(nodes: usize) -> Self {
        Self {
            nodes,
            inv_sqrt: OnceLock::new(),
            sqrt: OnceLock::new(),
        }
    }

    /// Interpolation node count (degree plus one).
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Interpolates `f` at the `nodes` Chebyshev points of `[-bound, bound]`.
    ///
    /// `f` must be finite at every node.
    pub fn chebyshev(bound: f64, nodes: usize, f: impl Fn(f64) -> f64) -> StatResult<Polynomial> {
        if nodes == 0 {
            return Err(StatError::InvalidParameter("chebyshev needs at least one node".into()));
        }
        if !(bound.is_finite() && bound > 0.0) {
            return Err(StatError::InvalidParameter(format!("interval bound {bound}")));
        }
        let table = CosineTable::new(nodes);
        let mut values = Vec::with_capacity(nodes);
        for k in 0..nodes {
            let x = bound * table.get(2 * k + 1).to_f64();
            let y = f(x);
            let fixed = Fixed::from_f64(y).ok_or_else(|| {
                StatError::InvalidParameter(format!("target is not finite at x = {x}"))
            })?;
            values.push(fixed);
        }
        let n = nodes as i64;
        let coeffs = (0..nodes)
            .map(|j| {
                let mut acc = Fixed::zero();
                for (k, v) in values.iter().enumerate() {
                    acc = &acc + &(v * &table.get(j * (2 * k + 1)));
                }
                let c = acc.mul_int(2).div_int(n);
                let c = if j == 0 { c.div_int(2) } else { c };
                c.to_f64()
            })
            .collect();
        debug!(nodes, bound, "synthesised chebyshev approximation");
        Ok(Polynomial::new(coeffs, bound))
    }

    fn cached(
        &self,
        cell: &OnceLock<Polynomial>,
        f: impl Fn(f64) -> f64,
    ) -> StatResult<Polynomial> {
        if let Some(p) = cell.get() {
            return Ok(p.clone());
        }
        let p = Self::chebyshev(1.0, self.nodes, f)?;
        Ok(cell.get_or_init(|| p).clone())
    }

    /// `1/√(x+1)` on `[-1, 1]`.
    pub fn unit_inv_sqrt(&self) -> StatResult<Polynomial> {
        self.cached(&self.inv_sqrt, |x| 1.0 / (x + 1.0).sqrt())
    }

    /// `√(x+1)` on `[-1, 1]`.
    pub fn unit_sqrt(&self) -> StatResult<Polynomial> {
        self.cached(&self.sqrt, |x| (x + 1.0).sqrt())
    }

    /// Polynomial evaluated on `x' − 1` by [`chebyshev_inv_sqrt`].
    pub fn inv_sqrt(&self, variant: InvSqrtVariant) -> StatResult<Polynomial> {
        Ok(&self.unit_inv_sqrt()? * variant.output_factor())
    }

    /// Polynomial evaluated on `x' − 1` by [`crypto_sqrt`].
    pub fn sqrt(&self, variant: SqrtVariant) -> StatResult<Polynomial> {
        Ok(&self.unit_sqrt()? * variant.output_factor())
    }
}

/// Input conventions for the inverse-square-root approximation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InvSqrtVariant {
    /// `1/√x` for `x ∈ (0, 2)`.
    Unit,
    /// `1/√x` for `x ∈ (0, bound)`; the input is prescaled by `2/bound`.
    Bounded {
        /// Upper end of the input range.
        bound: f64,
    },
    /// `1/√(factor·x)` for `x ∈ (0, 2)`.
    Scaled {
        /// Multiplier under the root.
        factor: f64,
    },
}

impl InvSqrtVariant {
    /// Legacy integer modes: 0 = unit, 1 = bounded by `b`, 2 = scaled by `b`.
    pub fn from_mode(mode: i32, b: f64) -> StatResult<Self> {
        let variant = match mode {
            0 => Self::Unit,
            1 => Self::Bounded { bound: b },
            2 => Self::Scaled { factor: b },
            _ => return Err(StatError::InvalidParameter(format!("inverse sqrt mode {mode}"))),
        };
        variant.validate()?;
        Ok(variant)
    }

    fn validate(self) -> StatResult<()> {
        match self {
            Self::Unit => Ok(()),
            Self::Bounded { bound: v } | Self::Scaled { factor: v } if v.is_finite() && v > 0.0 => {
                Ok(())
            }
            _ => Err(StatError::InvalidParameter(format!("{self:?} needs a positive scale"))),
        }
    }

    fn prescale(self) -> Option<f64> {
        match self {
            Self::Bounded { bound } => Some(2.0 / bound),
            _ => None,
        }
    }

    fn output_factor(self) -> f64 {
        match self {
            Self::Unit => 1.0,
            Self::Bounded { bound } => 1.0 / (bound / 2.0).sqrt(),
            Self::Scaled { factor } => 1.0 / factor.sqrt(),
        }
    }

    /// The function this variant approximates.
    pub fn target(self, x: f64) -> f64 {
        match self {
            Self::Unit | Self::Bounded { .. } => 1.0 / x.sqrt(),
            Self::Scaled { factor } => 1.0 / (factor * x).sqrt(),
        }
    }
}

/// Input conventions for the square-root approximation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SqrtVariant {
    /// `√x` for `x ∈ (0, 2)`.
    Unit,
    /// `√(2x/bound)` for `x ∈ (0, bound)`: prescaled, output left normalised.
    Normalized {
        /// Upper end of the input range.
        bound: f64,
    },
    /// `√(factor·x)` for `x ∈ (0, 2)`.
    Scaled {
        /// Multiplier under the root.
        factor: f64,
    },
}

impl SqrtVariant {
    /// Legacy integer types: 0 = unit, 1 = normalised by `b`, 2 = scaled by `b`.
    pub fn from_mode(mode: i32, b: f64) -> StatResult<Self> {
        let variant = match mode {
            0 => Self::Unit,
            1 => Self::Normalized { bound: b },
            2 => Self::Scaled { factor: b },
            _ => return Err(StatError::InvalidParameter(format!("sqrt type {mode}"))),
        };
        variant.validate()?;
        Ok(variant)
    }

    fn validate(self) -> StatResult<()> {
        match self {
            Self::Unit => Ok(()),
            Self::Normalized { bound: v } | Self::Scaled { factor: v } if v.is_finite() && v > 0.0 => {
                Ok(())
            }
            _ => Err(StatError::InvalidParameter(format!("{self:?} needs a positive scale"))),
        }
    }

    fn prescale(self) -> Option<f64> {
        match self {
            Self::Normalized { bound } => Some(2.0 / bound),
            _ => None,
        }
    }

    fn output_factor(self) -> f64 {
        match self {
            Self::Scaled { factor } => factor.sqrt(),
            _ => 1.0,
        }
    }

    /// The function this variant approximates.
    pub fn target(self, x: f64) -> f64 {
        match self {
            Self::Unit => x.sqrt(),
            Self::Normalized { bound } => (2.0 * x / bound).sqrt(),
            Self::Scaled { factor } => (factor * x).sqrt(),
        }
    }
}

/// Optional prescale, then the `x − 1` shift onto the approximation interval.
fn shifted<B: Backend>(
    engine: &HeEngine<B>,
    x: &Handle<B>,
    prescale: Option<f64>,
) -> StatResult<Handle<B>> {
    let x = match prescale {
        Some(s) if s != 1.0 => engine.mul_const(x, s).context("prescale input")?,
        _ => x.clone(),
    };
    engine.sub_const(&x, 1.0)
}

/// Coarse inverse square root by a single Chebyshev evaluation.
pub fn chebyshev_inv_sqrt<B: Backend>(
    engine: &HeEngine<B>,
    approx: &ApproximationBuilder,
    x: &Handle<B>,
    variant: InvSqrtVariant,
) -> StatResult<Handle<B>> {
    variant.validate()?;
    let poly = approx.inv_sqrt(variant)?;
    let input = shifted(engine, x, variant.prescale())?;
    PolynomialEvaluator::new(engine)
        .evaluate_real(&input, &poly)
        .context("evaluate inverse sqrt polynomial")
}

/// Square root by a single Chebyshev evaluation.
pub fn crypto_sqrt<B: Backend>(
    engine: &HeEngine<B>,
    approx: &ApproximationBuilder,
    x: &Handle<B>,
    variant: SqrtVariant,
) -> StatResult<Handle<B>> {
    variant.validate()?;
    let poly = approx.sqrt(variant)?;
    let input = shifted(engine, x, variant.prescale())?;
    PolynomialEvaluator::new(engine)
        .evaluate_real(&input, &poly)
        .context("evaluate sqrt polynomial")
}
