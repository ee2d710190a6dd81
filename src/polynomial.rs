//! Chebyshev series and composite (multi-stage) polynomials.

use std::ops::{Add, Mul, Neg};

use crate::error::{StatError, StatResult};

/// `p(x) = Σ coeffs[j] · T_j(x / bound)` for `x ∈ [-bound, bound]`.
///
/// The number of coefficients is the node count of the interpolation the
/// series came from; the degree is one less.
#[derive(Clone, Debug, PartialEq)]
pub struct Polynomial {
    /// Chebyshev coefficients, constant term first.
    pub coeffs: Vec<f64>,
    /// Half-width of the approximation interval.
    pub bound: f64,
}

impl Polynomial {
    /// Series on `[-bound, bound]`.
    pub fn new(coeffs: Vec<f64>, bound: f64) -> Self {
        Self { coeffs, bound }
    }

    /// Series on `[-1, 1]`.
    pub fn unit(coeffs: Vec<f64>) -> Self {
        Self::new(coeffs, 1.0)
    }

    /// Coefficient count.
    pub fn nodes(&self) -> usize {
        self.coeffs.len()
    }

    /// Index of the highest non-zero coefficient.
    pub fn degree(&self) -> usize {
        self.coeffs.iter().rposition(|c| *c != 0.0).unwrap_or(0)
    }

    /// True when every even-indexed coefficient vanishes.
    pub fn is_odd(&self) -> bool {
        self.coeffs.iter().step_by(2).all(|c| *c == 0.0)
    }

    /// Clenshaw recurrence.
    pub fn eval(&self, x: f64) -> f64 {
        let t = x / self.bound;
        let mut b1 = 0.0;
        let mut b2 = 0.0;
        for c in self.coeffs.iter().skip(1).rev() {
            let b0 = 2.0 * t * b1 - b2 + c;
            b2 = b1;
            b1 = b0;
        }
        let c0 = self.coeffs.first().copied().unwrap_or(0.0);
        t * b1 - b2 + c0
    }

    /// Writes `self = q · T_m + r` using `T_m T_j = (T_{m+j} + T_{|m-j|}) / 2`.
    /// `q` keeps the coefficients from index `m` on, `r` those below `m`.
    pub fn split(&self, m: usize) -> (Polynomial, Polynomial) {
        let n = self.coeffs.len();
        if m >= n {
            return (Polynomial::new(vec![0.0], self.bound), self.clone());
        }
        let mut r = self.coeffs[..m].to_vec();
        let mut q = Vec::with_capacity(n - m);
        q.push(self.coeffs[m]);
        for j in 1..n - m {
            let c = self.coeffs[m + j];
            q.push(2.0 * c);
            r[m.abs_diff(j)] -= c;
        }
        (Polynomial::new(q, self.bound), Polynomial::new(r, self.bound))
    }
}

impl Mul<f64> for &Polynomial {
    type Output = Polynomial;
    fn mul(self, rhs: f64) -> Polynomial {
        Polynomial::new(self.coeffs.iter().map(|c| c * rhs).collect(), self.bound)
    }
}

impl Mul<f64> for Polynomial {
    type Output = Polynomial;
    fn mul(self, rhs: f64) -> Polynomial {
        (&self).mul(rhs)
    }
}

/// Adds a constant (the `T_0` coefficient).
impl Add<f64> for &Polynomial {
    type Output = Polynomial;
    fn add(self, rhs: f64) -> Polynomial {
        let mut coeffs = self.coeffs.clone();
        match coeffs.first_mut() {
            Some(c0) => *c0 += rhs,
            None => coeffs.push(rhs),
        }
        Polynomial::new(coeffs, self.bound)
    }
}

impl Add<f64> for Polynomial {
    type Output = Polynomial;
    fn add(self, rhs: f64) -> Polynomial {
        (&self).add(rhs)
    }
}

impl Neg for &Polynomial {
    type Output = Polynomial;
    fn neg(self) -> Polynomial {
        self * -1.0
    }
}

/// Stages evaluated in sequence, each feeding the next.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositePolynomial {
    stages: Vec<Polynomial>,
}

impl CompositePolynomial {
    /// Fails on an empty stage list.
    pub fn new(stages: Vec<Polynomial>) -> StatResult<Self> {
        if stages.is_empty() {
            return Err(StatError::InvalidParameter(
                "composite polynomial needs at least one stage".into(),
            ));
        }
        Ok(Self { stages })
    }

    /// Stages given as Chebyshev coefficient rows on `[-1, 1]`.
    pub fn from_rows(rows: &[&[f64]]) -> StatResult<Self> {
        Self::new(rows.iter().map(|r| Polynomial::unit(r.to_vec())).collect())
    }

    /// Eight odd minimax stages (degrees 7, 7, 15, 15, 15, 15, 31, 31)
    /// approximating `sign(x)` on `[-1, 1]`: about 30 bits of distinguishing
    /// resolution with tolerance for 35-bit scheme error.
    pub fn minimax_sign() -> Self {
        Self {
            stages: MINIMAX_SIGN.iter().map(|r| Polynomial::unit(r.to_vec())).collect(),
        }
    }

    /// Stages in evaluation order.
    pub fn stages(&self) -> &[Polynomial] {
        &self.stages
    }

    /// Plaintext evaluation of every stage in turn.
    pub fn eval(&self, x: f64) -> f64 {
        self.stages.iter().fold(x, |acc, p| p.eval(acc))
    }

    /// `(self + 1) / 2` with the affine map folded into the last stage.
    #[must_use]
    pub fn to_step(&self) -> Self {
        let mut stages = self.stages.clone();
        if let Some(last) = stages.last_mut() {
            *last = &(&*last * 0.5) + 0.5;
        }
        Self { stages }
    }
}

#[allow(clippy::unreadable_literal, clippy::excessive_precision)]
const MINIMAX_SIGN: [&[f64]; 8] = [
    &[
        0.0, 0.639028938435711219, 0.0, -0.219806118878047092, 0.0, 0.141440053455946451, 0.0,
        -0.560662696277302517,
    ],
    &[
        0.0, 0.639029489633228222, 0.0, -0.219806297800259927, 0.0, 0.141440154749489224, 0.0,
        -0.560662301247238699,
    ],
    &[
        0.0, 0.637154696201570660, 0.0, -0.213806030962452086, 0.0, 0.130045580652836942, 0.0,
        -0.094885435152665168, 0.0, 0.076042662624281770, 0.0, -0.064772177102166506, 0.0,
        0.057791006255316676, 0.0, -0.527557080198263608,
    ],
    &[
        0.0, 0.637252723778154157, 0.0, -0.213838525423059134, 0.0, 0.130064857400618902, 0.0,
        -0.094898964641665779, 0.0, 0.076052931457460596, 0.0, -0.064780312107983876, 0.0,
        0.057797611601832795, 0.0, -0.527483011957071916,
    ],
    &[
        0.0, 0.638492548163143535, 0.0, -0.214249489332586510, 0.0, 0.130308633915153971, 0.0,
        -0.095070037868134732, 0.0, 0.076182750613643440, 0.0, -0.064883127935866152, 0.0,
        0.057881063854726339, 0.0, -0.526546163851403631,
    ],
    &[
        0.0, 0.654072536322215222, 0.0, -0.219411111586902031, 0.0, 0.133367149639755852, 0.0,
        -0.097212758106646793, 0.0, 0.077804778872091079, 0.0, -0.066163376778950260, 0.0,
        0.058915286191840665, 0.0, -0.514764737657234364,
    ],
    &[
        0.0, 0.985321201923117642, 0.0, -0.328119170883870823, 0.0, 0.196617511234660686, 0.0,
        -0.140045613570337270, 0.0, 0.108634034466585055, 0.0, -0.088498752002149384, 0.0,
        0.074572306762014301, 0.0, -0.064287415234822877, 0.0, 0.056401814845377282, 0.0,
        -0.050183389367761095, 0.0, 0.045086211659977983, 0.0, -0.040959900956987588, 0.0,
        0.037395730021827179, 0.0, -0.034512330854589498, 0.0, 0.031915520720098515, 0.0,
        -0.241509663775553008,
    ],
    &[
        0.0, 1.262673861720083096, 0.0, -0.393697035515367173, 0.0, 0.206535085221700125, 0.0,
        -0.120395410087615135, 0.0, 0.071169308776617400, 0.0, -0.041082546981498569, 0.0,
        0.022667637149739957, 0.0, -0.011770429894589077, 0.0, 0.005672674575918509, 0.0,
        -0.002500516475970389, 0.0, 0.000990582083790523, 0.0, -0.000344556747529926, 0.0,
        0.000101727287456808, 0.0, -0.000024132899916296, 0.0, 0.000004146320405856, 0.0,
        -0.000000395353444811,
    ],
];

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_clenshaw_matches_basis() {
        // T_3(x) = 4x³ - 3x
        let p = Polynomial::unit(vec![0.0, 0.0, 0.0, 1.0]);
        for x in [-1.0, -0.3, 0.0, 0.5, 0.9] {
            assert_abs_diff_eq!(p.eval(x), 4.0 * x * x * x - 3.0 * x, epsilon = 1e-12);
        }
        let scaled = Polynomial::new(vec![1.0, 2.0], 4.0);
        assert_abs_diff_eq!(scaled.eval(2.0), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_split_reconstructs() {
        let p = Polynomial::unit((0..11).map(|i| 1.0 / f64::from(i + 1)).collect());
        let t4 = Polynomial::unit(vec![0.0, 0.0, 0.0, 0.0, 1.0]);
        for m in [4, 8] {
            let tm = Polynomial::unit((0..=m).map(|i| if i == m { 1.0 } else { 0.0 }).collect());
            let (q, r) = p.split(m);
            assert_eq!(q.nodes(), 11 - m);
            for x in [-0.9, -0.2, 0.4, 1.0] {
                assert_abs_diff_eq!(q.eval(x) * tm.eval(x) + r.eval(x), p.eval(x), epsilon = 1e-12);
            }
        }
        assert_abs_diff_eq!(t4.eval(0.5), -0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_operators() {
        let p = Polynomial::unit(vec![1.0, 2.0, 3.0]);
        assert_eq!((&p * 2.0).coeffs, vec![2.0, 4.0, 6.0]);
        assert_eq!((&p + 0.5).coeffs, vec![1.5, 2.0, 3.0]);
        assert_eq!((-&p).coeffs, vec![-1.0, -2.0, -3.0]);
        assert_eq!(p.degree(), 2);
        assert!(!p.is_odd());
    }

    #[test]
    fn test_minimax_sign_shape() {
        let sign = CompositePolynomial::minimax_sign();
        let degrees: Vec<usize> = sign.stages().iter().map(Polynomial::degree).collect();
        assert_eq!(degrees, vec![7, 7, 15, 15, 15, 15, 31, 31]);
        assert!(sign.stages().iter().all(Polynomial::is_odd));
    }

    #[test]
    fn test_minimax_sign_values() {
        let sign = CompositePolynomial::minimax_sign();
        for x in [1e-4, 1e-3, 0.01, 0.1, 0.5, 1.0] {
            assert_abs_diff_eq!(sign.eval(x), 1.0, epsilon = 1e-6);
            assert_abs_diff_eq!(sign.eval(-x), -1.0, epsilon = 1e-6);
        }
        assert_abs_diff_eq!(sign.eval(0.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_step_folding() {
        let sign = CompositePolynomial::minimax_sign();
        let step = sign.to_step();
        for x in [-1.0, -0.05, -1e-3, 0.0, 1e-3, 0.2, 1.0] {
            assert_abs_diff_eq!(step.eval(x), (sign.eval(x) + 1.0) / 2.0, epsilon = 1e-12);
        }
        assert!(CompositePolynomial::new(vec![]).is_err());
    }
}
