//! Simulated CKKS scheme.
//!
//! Slots are kept in the clear next to the level and scale a real
//! ciphertext would carry; every operation enforces the same level and
//! scale rules as the real scheme and injects Gaussian error where the
//! real scheme accumulates it (encryption, rescaling, rotations,
//! bootstrapping). The modulus chain consists of primes equal to the
//! default scale, so a rescale after a product of default-scale operands
//! lands back on the default scale.

use crate::{
    backend::Backend,
    cipher::SimCiphertext,
    error::SchemeError,
    params::{EngineParameters, ParamsError},
};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use std::sync::{Mutex, PoisonError};

const SCALE_TOLERANCE: f64 = 1e-9;

/// Slot-level CKKS simulator with level and scale tracking and Gaussian noise.
pub struct SimScheme {
    params: EngineParameters,
    rng: Mutex<StdRng>,
}

impl SimScheme {
    /// Simulator for validated `params`.
    pub fn new(params: EngineParameters) -> Result<Self, ParamsError> {
        params.validate()?;
        let rng = StdRng::seed_from_u64(params.noise.seed);
        Ok(Self {
            params,
            rng: Mutex::new(rng),
        })
    }

    fn prime(&self) -> f64 {
        self.params.default_scale()
    }

    fn perturb(&self, slots: &mut [f64], std_dev: f64) {
        if std_dev == 0.0 {
            return;
        }
        let Ok(normal) = Normal::new(0.0, std_dev) else {
            return;
        };
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        for s in slots.iter_mut() {
            *s += normal.sample(&mut *rng);
        }
    }

    fn check_aligned(
        op: &'static str,
        a: &SimCiphertext,
        b: &SimCiphertext,
    ) -> Result<(), SchemeError> {
        if a.level != b.level {
            return Err(SchemeError::new(
                op,
                format!("level mismatch ({} vs {})", a.level, b.level),
            ));
        }
        if (a.scale - b.scale).abs() > SCALE_TOLERANCE * a.scale.max(b.scale) {
            return Err(SchemeError::new(
                op,
                format!("scale mismatch ({:e} vs {:e})", a.scale, b.scale),
            ));
        }
        Ok(())
    }

    fn zip_with(
        op: &'static str,
        a: &SimCiphertext,
        b: &SimCiphertext,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<SimCiphertext, SchemeError> {
        Self::check_aligned(op, a, b)?;
        Ok(SimCiphertext {
            slots: a.slots.iter().zip(&b.slots).map(|(x, y)| f(*x, *y)).collect(),
            level: a.level,
            scale: a.scale,
        })
    }
}

impl Backend for SimScheme {
    type Ciphertext = SimCiphertext;

    fn params(&self) -> &EngineParameters {
        &self.params
    }

    fn encrypt(&self, values: &[f64]) -> Result<SimCiphertext, SchemeError> {
        let n = self.max_slots();
        if values.len() > n {
            return Err(SchemeError::new(
                "encrypt",
                format!("{} values exceed {} slots", values.len(), n),
            ));
        }
        let mut slots = vec![0.0; n];
        slots[..values.len()].copy_from_slice(values);
        self.perturb(&mut slots, self.params.noise.fresh);
        Ok(SimCiphertext {
            slots,
            level: self.params.max_level,
            scale: self.params.default_scale(),
        })
    }

    fn decrypt(&self, ct: &SimCiphertext) -> Vec<f64> {
        ct.slots.clone()
    }

    fn level(&self, ct: &SimCiphertext) -> usize {
        ct.level
    }

    fn scale(&self, ct: &SimCiphertext) -> f64 {
        ct.scale
    }

    fn add(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext, SchemeError> {
        Self::zip_with("add", a, b, |x, y| x + y)
    }

    fn sub(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext, SchemeError> {
        Self::zip_with("sub", a, b, |x, y| x - y)
    }

    fn add_const(&self, a: &SimCiphertext, c: f64) -> Result<SimCiphertext, SchemeError> {
        let mut out = a.clone();
        out.slots.iter_mut().for_each(|s| *s += c);
        Ok(out)
    }

    fn mul_const(&self, a: &SimCiphertext, c: f64) -> Result<SimCiphertext, SchemeError> {
        if !c.is_finite() {
            return Err(SchemeError::new("mul_const", format!("cannot encode {c}")));
        }
        Ok(SimCiphertext {
            slots: a.slots.iter().map(|s| s * c).collect(),
            level: a.level,
            scale: a.scale * self.prime(),
        })
    }

    fn mul_plain(&self, a: &SimCiphertext, plain: &[f64]) -> Result<SimCiphertext, SchemeError> {
        if plain.len() > a.slots.len() {
            return Err(SchemeError::new(
                "mul_plain",
                format!("{} values exceed {} slots", plain.len(), a.slots.len()),
            ));
        }
        let slots = a
            .slots
            .iter()
            .enumerate()
            .map(|(i, s)| s * plain.get(i).copied().unwrap_or(0.0))
            .collect();
        Ok(SimCiphertext {
            slots,
            level: a.level,
            scale: a.scale * self.prime(),
        })
    }

    fn mul(&self, a: &SimCiphertext, b: &SimCiphertext) -> Result<SimCiphertext, SchemeError> {
        if a.level != b.level {
            return Err(SchemeError::new(
                "mul",
                format!("level mismatch ({} vs {})", a.level, b.level),
            ));
        }
        Ok(SimCiphertext {
            slots: a.slots.iter().zip(&b.slots).map(|(x, y)| x * y).collect(),
            level: a.level,
            scale: a.scale * b.scale,
        })
    }

    fn rescale(&self, a: &SimCiphertext) -> Result<SimCiphertext, SchemeError> {
        if a.level == 0 {
            return Err(SchemeError::new("rescale", "no level left to consume"));
        }
        let mut out = SimCiphertext {
            slots: a.slots.clone(),
            level: a.level - 1,
            scale: a.scale / self.prime(),
        };
        self.perturb(&mut out.slots, self.params.noise.rescale);
        Ok(out)
    }

    fn drop_level(&self, a: &SimCiphertext, level: usize) -> Result<SimCiphertext, SchemeError> {
        if level > a.level {
            return Err(SchemeError::new(
                "drop_level",
                format!("cannot raise level {} to {}", a.level, level),
            ));
        }
        let mut out = a.clone();
        out.level = level;
        Ok(out)
    }

    fn inner_sum(&self, a: &SimCiphertext) -> Result<SimCiphertext, SchemeError> {
        let total: f64 = a.slots.iter().sum();
        let mut out = SimCiphertext {
            slots: vec![total; a.slots.len()],
            level: a.level,
            scale: a.scale,
        };
        let rotations = f64::from(self.params.log_n - 1);
        self.perturb(&mut out.slots, self.params.noise.rotation * rotations.sqrt());
        Ok(out)
    }

    fn conjugate(&self, a: &SimCiphertext) -> Result<SimCiphertext, SchemeError> {
        let mut out = a.clone();
        self.perturb(&mut out.slots, self.params.noise.rotation);
        Ok(out)
    }

    fn bootstrap(&self, a: &SimCiphertext, min_level: usize) -> Result<SimCiphertext, SchemeError> {
        if !self.params.bootstrapping {
            return Err(SchemeError::new("bootstrap", "bootstrapping is not configured"));
        }
        if min_level > self.params.max_level {
            return Err(SchemeError::new(
                "bootstrap",
                format!("level {min_level} exceeds depth budget {}", self.params.max_level),
            ));
        }
        let target = self.params.default_scale();
        if (a.scale - target).abs() > SCALE_TOLERANCE * target {
            return Err(SchemeError::new("bootstrap", "operand must be rescaled first"));
        }
        let mut out = SimCiphertext {
            slots: a.slots.clone(),
            level: self.params.max_level,
            scale: target,
        };
        self.perturb(&mut out.slots, self.params.noise.bootstrap);
        Ok(out)
    }
}
