//! Engine parameters: ring size, depth budget, default scale and the
//! refresh capability, plus the noise model of the bundled simulator.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading or validating [`EngineParameters`].
#[derive(Debug, Error)]
pub enum ParamsError {
    /// The parameter file could not be read.
    #[error("unable to read parameters {path}: {source}")]
    Io {
        /// File that was requested.
        path: PathBuf,
        /// Cause.
        #[source]
        source: std::io::Error,
    },
    /// Malformed TOML or a mistyped key.
    #[error("failed to parse parameters: {0}")]
    Parse(#[from] toml::de::Error),
    /// Well-formed but unusable values.
    #[error("parameters invalid: {0}")]
    Validation(String),
}

/// Ring/precision configuration, fixed at construction.
///
/// `log_n` is the log2 of the ring dimension; a container packs
/// `2^(log_n - 1)` slots. `max_level` is the number of rescalings a fresh
/// (or freshly refreshed) container can absorb. The default scale is
/// `2^log_scale`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineParameters {
    /// Log2 of the ring dimension.
    pub log_n: u32,
    /// Levels available to a fresh container.
    pub max_level: usize,
    /// Log2 of the default scale.
    pub log_scale: u32,
    /// Whether containers can be refreshed.
    pub bootstrapping: bool,
    /// Simulator noise.
    pub noise: NoiseModel,
}

impl Default for EngineParameters {
    fn default() -> Self {
        Self {
            log_n: 16,
            max_level: 11,
            log_scale: 40,
            bootstrapping: true,
            noise: NoiseModel::default(),
        }
    }
}

impl EngineParameters {
    /// Parameters with the given shape and the default noise model.
    pub fn new(log_n: u32, max_level: usize, log_scale: u32, bootstrapping: bool) -> Self {
        Self {
            log_n,
            max_level,
            log_scale,
            bootstrapping,
            noise: NoiseModel::default(),
        }
    }

    /// Same parameters with the simulator noise switched off.
    #[must_use]
    pub fn noiseless(mut self) -> Self {
        self.noise = NoiseModel::exact();
        self
    }

    /// Same parameters with another noise seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.noise.seed = seed;
        self
    }

    /// Number of packed slots per container.
    pub fn max_slots(&self) -> usize {
        1usize << (self.log_n - 1)
    }

    /// `2^log_scale`.
    pub fn default_scale(&self) -> f64 {
        2f64.powi(self.log_scale as i32)
    }

    /// Rejects ring sizes, depths and scales the simulator cannot represent.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if self.log_n < 2 || self.log_n > 20 {
            return Err(ParamsError::Validation(format!(
                "log_n must lie in [2, 20], got {}",
                self.log_n
            )));
        }
        if self.max_level == 0 {
            return Err(ParamsError::Validation("max_level must be positive".into()));
        }
        if !(10..=60).contains(&self.log_scale) {
            return Err(ParamsError::Validation(format!(
                "log_scale must lie in [10, 60], got {}",
                self.log_scale
            )));
        }
        self.noise.validate()
    }

    /// Parses and validates a TOML document; missing keys take defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self, ParamsError> {
        let params: Self = toml::from_str(raw)?;
        params.validate()?;
        Ok(params)
    }

    /// Reads [`Self::from_toml_str`] input from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ParamsError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ParamsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }
}

/// Standard deviations (in the decoded domain) of the Gaussian error the
/// simulator injects at each kind of operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseModel {
    /// At encryption.
    pub fresh: f64,
    /// At every rescale.
    pub rescale: f64,
    /// Per rotation of an inner sum or conjugation.
    pub rotation: f64,
    /// At every refresh.
    pub bootstrap: f64,
    /// Seed of the noise generator.
    pub seed: u64,
}

impl Default for NoiseModel {
    fn default() -> Self {
        Self {
            fresh: 2f64.powi(-32),
            rescale: 2f64.powi(-36),
            rotation: 2f64.powi(-36),
            bootstrap: 2f64.powi(-26),
            seed: 0x5eed,
        }
    }
}

impl NoiseModel {
    /// No noise anywhere.
    pub fn exact() -> Self {
        Self {
            fresh: 0.0,
            rescale: 0.0,
            rotation: 0.0,
            bootstrap: 0.0,
            seed: 0,
        }
    }

    fn validate(&self) -> Result<(), ParamsError> {
        let all = [self.fresh, self.rescale, self.rotation, self.bootstrap];
        if all.iter().any(|s| !s.is_finite() || *s < 0.0) {
            return Err(ParamsError::Validation(
                "noise deviations must be finite and non-negative".into(),
            ));
        }
        Ok(())
    }
}
