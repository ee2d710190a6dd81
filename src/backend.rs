//! Interface to the underlying CKKS-style scheme.
//!
//! Everything above this trait (vectors, approximations, statistics) is
//! scheme-agnostic; a backend supplies encoding, the primitive homomorphic
//! operations and bootstrapping for a single container.

use crate::{error::SchemeError, params::EngineParameters};

/// Primitive operations on one encrypted container of packed slots.
///
/// Multiplications leave the scale squared (or multiplied by the encoding
/// prime for plaintext operands) and do not rescale; callers pair each of
/// them with [`Backend::rescale`], which consumes one level.
pub trait Backend: Send + Sync {
    /// One encrypted container.
    type Ciphertext: Clone + Send + Sync + std::fmt::Debug;

    /// Parameters the scheme was built with.
    fn params(&self) -> &EngineParameters;

    /// Slots per container.
    fn max_slots(&self) -> usize {
        self.params().max_slots()
    }

    /// Encrypts up to `max_slots` values at the top level; unused slots are zero.
    fn encrypt(&self, values: &[f64]) -> Result<Self::Ciphertext, SchemeError>;

    /// Decodes every slot of the container.
    fn decrypt(&self, ct: &Self::Ciphertext) -> Vec<f64>;

    /// Remaining levels of `ct`.
    fn level(&self, ct: &Self::Ciphertext) -> usize;

    /// Current scale of `ct`.
    fn scale(&self, ct: &Self::Ciphertext) -> f64;

    /// Slotwise sum; operands must share level and scale.
    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext)
        -> Result<Self::Ciphertext, SchemeError>;

    /// Slotwise difference; operands must share level and scale.
    fn sub(&self, a: &Self::Ciphertext, b: &Self::Ciphertext)
        -> Result<Self::Ciphertext, SchemeError>;

    /// Adds `c` to every slot, padding included.
    fn add_const(&self, a: &Self::Ciphertext, c: f64) -> Result<Self::Ciphertext, SchemeError>;

    /// Product with a scalar encoded at the current top prime.
    fn mul_const(&self, a: &Self::Ciphertext, c: f64) -> Result<Self::Ciphertext, SchemeError>;

    /// Slotwise product with a plaintext vector (missing entries are zero).
    fn mul_plain(&self, a: &Self::Ciphertext, plain: &[f64])
        -> Result<Self::Ciphertext, SchemeError>;

    /// Tensor product followed by relinearisation; operands must share level.
    fn mul(&self, a: &Self::Ciphertext, b: &Self::Ciphertext)
        -> Result<Self::Ciphertext, SchemeError>;

    /// Divides by the top prime of the chain and drops one level.
    fn rescale(&self, a: &Self::Ciphertext) -> Result<Self::Ciphertext, SchemeError>;

    /// Moves a container down to `level` without touching its scale.
    fn drop_level(&self, a: &Self::Ciphertext, level: usize)
        -> Result<Self::Ciphertext, SchemeError>;

    /// Rotate-and-add until every slot holds the sum of all slots.
    fn inner_sum(&self, a: &Self::Ciphertext) -> Result<Self::Ciphertext, SchemeError>;

    /// Complex conjugate of every slot.
    fn conjugate(&self, a: &Self::Ciphertext) -> Result<Self::Ciphertext, SchemeError>;

    /// Refreshes a container so that at least `min_level` levels are available.
    fn bootstrap(&self, a: &Self::Ciphertext, min_level: usize)
        -> Result<Self::Ciphertext, SchemeError>;
}
