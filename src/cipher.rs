//! Container type of the simulated scheme.

/// One simulated CKKS ciphertext: decoded slot values (error included),
/// remaining level and current scale.
#[derive(Clone, Debug)]
pub struct SimCiphertext {
    /// Decoded slots, `max_slots` of them.
    pub slots: Vec<f64>,
    /// Remaining rescalings.
    pub level: usize,
    /// Current encoding scale.
    pub scale: f64,
}
