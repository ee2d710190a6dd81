//! Signed binary fixed-point numbers with 192 fractional bits, used while
//! synthesising approximation coefficients.

use std::ops::{Add, Mul, Neg, Sub};

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

/// Fractional bits of [`Fixed`].
pub const FRAC_BITS: usize = 192;

/// A value `v` stored as the integer `v · 2^FRAC_BITS`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fixed(BigInt);

impl Fixed {
    /// Zero.
    pub fn zero() -> Self {
        Fixed(BigInt::zero())
    }

    /// One.
    pub fn one() -> Self {
        Fixed(BigInt::from(1u8) << FRAC_BITS)
    }

    /// Exact conversion from an integer.
    pub fn from_int(v: i64) -> Self {
        Fixed(BigInt::from(v) << FRAC_BITS)
    }

    /// Exact conversion; `None` for NaN and infinities.
    pub fn from_f64(x: f64) -> Option<Self> {
        if !x.is_finite() {
            return None;
        }
        let bits = x.to_bits();
        let negative = bits >> 63 == 1;
        let exp = i64::try_from((bits >> 52) & 0x7ff).ok()?;
        let frac = bits & ((1u64 << 52) - 1);
        let (mantissa, e) = if exp == 0 {
            (frac, -1074)
        } else {
            (frac | (1u64 << 52), exp - 1075)
        };
        let shift = e + FRAC_BITS as i64;
        let v = BigInt::from(mantissa);
        let v = if shift >= 0 {
            v << usize::try_from(shift).ok()?
        } else {
            v >> usize::try_from(-shift).ok()?
        };
        Some(Fixed(if negative { -v } else { v }))
    }

    /// Nearest `f64` (after truncation to 53 significant bits).
    pub fn to_f64(&self) -> f64 {
        let scale = 2f64.powi(-(FRAC_BITS as i32));
        self.0.to_f64().map_or(f64::NAN, |v| v * scale)
    }

    /// Truncating division by an integer.
    pub fn div_int(&self, d: i64) -> Self {
        Fixed(&self.0 / BigInt::from(d))
    }

    /// Exact product with an integer.
    pub fn mul_int(&self, m: i64) -> Self {
        Fixed(&self.0 * BigInt::from(m))
    }

    /// Whether the value is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// `atan(1/x)` for an integer `x > 1`.
    fn atan_inv(x: i64) -> Self {
        let x2 = BigInt::from(x * x);
        let mut power = Self::one().0 / BigInt::from(x);
        let mut sum = BigInt::zero();
        let mut k = 0i64;
        while !power.is_zero() {
            let term = &power / BigInt::from(2 * k + 1);
            if k % 2 == 0 {
                sum += term;
            } else {
                sum -= term;
            }
            power /= &x2;
            k += 1;
        }
        Fixed(sum)
    }

    /// Machin's formula: `π = 16·atan(1/5) − 4·atan(1/239)`.
    pub fn pi() -> Self {
        &Self::atan_inv(5).mul_int(16) - &Self::atan_inv(239).mul_int(4)
    }

    /// Taylor series; intended for `|self| ≤ π/2`.
    pub fn cos(&self) -> Self {
        let x2 = self * self;
        let mut term = Self::one();
        let mut sum = Self::one();
        let mut k = 1i64;
        loop {
            term = (&term * &x2).div_int((2 * k - 1) * (2 * k));
            if term.is_zero() {
                break;
            }
            sum = if k % 2 == 1 { &sum - &term } else { &sum + &term };
            k += 1;
        }
        sum
    }
}

impl Add for &Fixed {
    type Output = Fixed;
    fn add(self, rhs: Self) -> Fixed {
        Fixed(&self.0 + &rhs.0)
    }
}

impl Sub for &Fixed {
    type Output = Fixed;
    fn sub(self, rhs: Self) -> Fixed {
        Fixed(&self.0 - &rhs.0)
    }
}

impl Mul for &Fixed {
    type Output = Fixed;
    fn mul(self, rhs: Self) -> Fixed {
        Fixed((&self.0 * &rhs.0) >> FRAC_BITS)
    }
}

impl Neg for &Fixed {
    type Output = Fixed;
    fn neg(self) -> Fixed {
        Fixed(-&self.0)
    }
}
