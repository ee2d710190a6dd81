//! PP-Stat ― privacy-preserving summary statistics over CKKS-style
//! encrypted vectors (research prototype)
//!
//! Division, square roots and comparisons are not native to the scheme, so
//! they are built from Chebyshev approximations, a composite minimax sign
//! and fixed-iteration Newton refinement, under a level budget that only a
//! bootstrap can replenish.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, missing_docs)]

pub mod params;
pub mod error;
pub mod backend;
pub mod cipher;
pub mod scheme;
pub mod vector;
pub mod engine;
pub mod refresh;
pub mod bigfixed;
pub mod polynomial;
pub mod chebyshev;
pub mod poly_eval;
pub mod comparison;
pub mod newton;
pub mod pivot;
pub mod moments;
pub mod reference;

pub use backend::Backend;
pub use chebyshev::{ApproximationBuilder, InvSqrtVariant, SqrtVariant};
pub use cipher::SimCiphertext;
pub use comparison::ComparisonEvaluator;
pub use engine::{Handle, HeEngine};
pub use error::{Context, ErrorKind, SchemeError, StatError, StatResult};
pub use moments::MomentLibrary;
pub use newton::{RefinementEngine, RefinementParams, RefinementTarget};
pub use params::{EngineParameters, NoiseModel, ParamsError};
pub use poly_eval::PolynomialEvaluator;
pub use polynomial::{CompositePolynomial, Polynomial};
pub use refresh::BootstrapScheduler;
pub use scheme::SimScheme;
pub use vector::VectorHandle;
