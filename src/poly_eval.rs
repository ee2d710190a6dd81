//! Encrypted evaluation of Chebyshev series in logarithmic depth.
//!
//! Baby-step/giant-step: the series is split recursively as
//! `p = q·T_m + r` on giant powers `T_m`, down to leaves of fewer than
//! `baby` coefficients, which are linear combinations of the baby powers.

use std::collections::HashMap;

use crate::{
    backend::Backend,
    engine::{Handle, HeEngine},
    error::{Context, StatResult},
    polynomial::{CompositePolynomial, Polynomial},
};

fn ceil_log2(i: usize) -> usize {
    if i <= 1 {
        0
    } else {
        (usize::BITS - (i - 1).leading_zeros()) as usize
    }
}

/// Number of baby-step powers for a series of the given degree.
fn baby_steps(degree: usize) -> usize {
    let bits = (usize::BITS - degree.leading_zeros()) as usize;
    (1usize << ((bits + 1) / 2)).max(2)
}

/// Largest `baby · 2^k` below `n`.
fn giant_step(n: usize, baby: usize) -> usize {
    let mut m = baby;
    while 2 * m < n {
        m *= 2;
    }
    m
}

/// Levels consumed by a leaf or split, mirroring [`PolynomialEvaluator`].
/// `None` when the series reduces to a constant.
fn consumed(coeffs: &[f64], baby: usize) -> Option<usize> {
    let n = coeffs.len();
    if n <= baby {
        return coeffs
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, c)| **c != 0.0)
            .map(|(i, _)| ceil_log2(i) + 1)
            .max();
    }
    let m = giant_step(n, baby);
    let (q, r) = Polynomial::unit(coeffs.to_vec()).split(m);
    let product = match consumed(&q.coeffs, baby) {
        Some(c) => Some(c.max(ceil_log2(m)) + 1),
        None if q.coeffs[0] != 0.0 => Some(ceil_log2(m) + 1),
        None => None,
    };
    match (product, consumed(&r.coeffs, baby)) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Coefficients up to the degree (trailing zeros dropped).
fn significant(poly: &Polynomial) -> &[f64] {
    let len = poly.coeffs.len().min(poly.degree() + 1);
    &poly.coeffs[..len]
}

/// Levels an evaluation of `poly` consumes, including the input rescaling
/// for bounds other than 1.
pub fn evaluation_depth(poly: &Polynomial) -> usize {
    let body = consumed(significant(poly), baby_steps(poly.degree())).unwrap_or(0);
    body + usize::from(poly.bound != 1.0)
}

/// Sum of the stage depths of `poly`.
pub fn composite_depth(poly: &CompositePolynomial) -> usize {
    poly.stages().iter().map(evaluation_depth).sum()
}

enum Term<B: Backend> {
    Const(f64),
    Cipher(Handle<B>),
}

/// Chebyshev powers `T_i(x)` computed on demand.
struct PowerBasis<'e, B: Backend> {
    engine: &'e HeEngine<B>,
    powers: HashMap<usize, Handle<B>>,
}

impl<'e, B: Backend> PowerBasis<'e, B> {
    fn new(engine: &'e HeEngine<B>, x: Handle<B>) -> Self {
        let mut powers = HashMap::new();
        powers.insert(1, x);
        Self { engine, powers }
    }

    /// `T_{2k} = 2T_k² − 1`, `T_{a+b} = 2T_aT_b − T_{a−b}`.
    fn get(&mut self, i: usize) -> StatResult<&Handle<B>> {
        if !self.powers.contains_key(&i) {
            let e = self.engine;
            let t = if i % 2 == 0 {
                let half = self.get(i / 2)?.clone();
                let sq = e.square(&half)?;
                e.sub_const(&e.add(&sq, &sq)?, 1.0)?
            } else {
                let a = 1usize << (usize::BITS - 1 - i.leading_zeros());
                let b = i - a;
                let ta = self.get(a)?.clone();
                let tb = self.get(b)?.clone();
                let diff = self.get(a - b)?.clone();
                let prod = e.mul(&ta, &tb)?;
                e.sub(&e.add(&prod, &prod)?, &diff)?
            };
            self.powers.insert(i, t);
        }
        Ok(&self.powers[&i])
    }
}

/// Evaluates Chebyshev series on encrypted vectors.
///
/// Holds only the engine it delegates to; the scheduler of that engine
/// refreshes the input when fewer levels remain than the series needs.
pub struct PolynomialEvaluator<'e, B: Backend> {
    engine: &'e HeEngine<B>,
}

impl<'e, B: Backend> PolynomialEvaluator<'e, B> {
    /// Evaluator delegating to `engine`.
    pub fn new(engine: &'e HeEngine<B>) -> Self {
        Self { engine }
    }

    /// `poly(x)` slotwise, consuming [`evaluation_depth`] levels.
    pub fn evaluate(&self, x: &Handle<B>, poly: &Polynomial) -> StatResult<Handle<B>> {
        let e = self.engine;
        let needed = evaluation_depth(poly);
        let x = e.ensure_level(x, needed, "evaluate polynomial")?;
        let x = if poly.bound == 1.0 {
            x.into_owned()
        } else {
            e.mul_const(&x, 1.0 / poly.bound)?
        };
        let baby = baby_steps(poly.degree());
        let mut basis = PowerBasis::new(e, x);
        match self.recurse(&mut basis, significant(poly), baby)? {
            Term::Cipher(h) => Ok(h),
            Term::Const(c) => {
                let x = basis.get(1)?;
                e.add_const(&e.sub(x, x)?, c)
            }
        }
    }

    /// Real-part evaluation: the series is evaluated with halved
    /// coefficients and added to its conjugate.
    pub fn evaluate_real(&self, x: &Handle<B>, poly: &Polynomial) -> StatResult<Handle<B>> {
        let half = self.evaluate(x, &(poly * 0.5))?;
        let conj = self.engine.conjugate(&half)?;
        self.engine.add(&half, &conj)
    }

    /// Stages in sequence; each stage is refreshed as needed beforehand.
    pub fn evaluate_composite(
        &self,
        x: &Handle<B>,
        poly: &CompositePolynomial,
    ) -> StatResult<Handle<B>> {
        let mut acc = x.clone();
        for stage in poly.stages() {
            acc = self.evaluate(&acc, stage).context("composite stage")?;
        }
        Ok(acc)
    }

    fn recurse(
        &self,
        basis: &mut PowerBasis<'e, B>,
        coeffs: &[f64],
        baby: usize,
    ) -> StatResult<Term<B>> {
        let e = self.engine;
        let n = coeffs.len();
        if n <= baby {
            let mut acc: Option<Handle<B>> = None;
            for (i, c) in coeffs.iter().enumerate().skip(1) {
                if *c == 0.0 {
                    continue;
                }
                let term = e.mul_const(basis.get(i)?, *c)?;
                acc = Some(match acc {
                    Some(a) => e.add(&a, &term)?,
                    None => term,
                });
            }
            let c0 = coeffs.first().copied().unwrap_or(0.0);
            return Ok(match acc {
                Some(a) => Term::Cipher(e.add_const(&a, c0)?),
                None => Term::Const(c0),
            });
        }
        let m = giant_step(n, baby);
        let (q, r) = Polynomial::unit(coeffs.to_vec()).split(m);
        let high = self.recurse(basis, &q.coeffs, baby)?;
        let low = self.recurse(basis, &r.coeffs, baby)?;
        let product = match high {
            Term::Const(c) if c == 0.0 => None,
            Term::Const(c) => Some(e.mul_const(basis.get(m)?, c)?),
            Term::Cipher(h) => Some(e.mul(&h, basis.get(m)?)?),
        };
        Ok(match (product, low) {
            (None, low) => low,
            (Some(p), Term::Const(c)) => Term::Cipher(e.add_const(&p, c)?),
            (Some(p), Term::Cipher(h)) => Term::Cipher(e.add(&p, &h)?),
        })
    }
}
