//! Failure kinds shared by every operation of the crate.

use thiserror::Error;

/// Opaque failure reported by the scheme collaborator, tagged with the
/// primitive that raised it.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("scheme operation `{op}` failed: {message}")]
pub struct SchemeError {
    /// Primitive that failed.
    pub op: &'static str,
    /// Backend description of the failure.
    pub message: String,
}

impl SchemeError {
    /// Error raised by primitive `op`.
    pub fn new(op: &'static str, message: impl Into<String>) -> Self {
        Self {
            op,
            message: message.into(),
        }
    }
}

/// Error type of every engine, approximation and statistic operation.
#[derive(Debug, Error)]
pub enum StatError {
    /// Unsupported approximation or refinement configuration.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// Depth exhausted and no refresh available.
    #[error("insufficient level for {op}: needs {needed}, has {available}")]
    InsufficientLevel {
        /// Operation that ran out of levels.
        op: &'static str,
        /// Levels the operation needs.
        needed: usize,
        /// Levels left.
        available: usize,
    },
    /// Logical size or container count disagreement between operands.
    #[error("dimension mismatch in {op}: {left} vs {right}")]
    DimensionMismatch {
        /// Operation that received the operands.
        op: &'static str,
        /// Size or container count of the first operand.
        left: usize,
        /// The same quantity for the second operand.
        right: usize,
    },
    /// Failure inside a scheme primitive.
    #[error(transparent)]
    Scheme(#[from] SchemeError),
    /// A composition step that failed, wrapping the underlying cause.
    #[error("{context}: {source}")]
    Context {
        /// Description of the step.
        context: String,
        /// Cause.
        #[source]
        source: Box<StatError>,
    },
}

/// Root classification of a [`StatError`], ignoring context layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`StatError::InvalidParameter`].
    InvalidParameter,
    /// See [`StatError::InsufficientLevel`].
    InsufficientLevel,
    /// See [`StatError::DimensionMismatch`].
    DimensionMismatch,
    /// See [`StatError::Scheme`].
    Scheme,
}

impl StatError {
    /// Innermost error below all context layers.
    pub fn root(&self) -> &StatError {
        let mut err = self;
        while let StatError::Context { source, .. } = err {
            err = source;
        }
        err
    }

    /// Kind of the innermost error.
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            StatError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            StatError::InsufficientLevel { .. } => ErrorKind::InsufficientLevel,
            StatError::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            StatError::Scheme(_) | StatError::Context { .. } => ErrorKind::Scheme,
        }
    }
}

/// Result of every fallible operation of the crate.
pub type StatResult<T> = Result<T, StatError>;

/// Attaches a description of the failing composition step.
pub trait Context<T> {
    /// Wraps the error, if any, in a [`StatError::Context`] layer.
    fn context(self, context: &str) -> StatResult<T>;
}

impl<T, E: Into<StatError>> Context<T> for Result<T, E> {
    fn context(self, context: &str) -> StatResult<T> {
        self.map_err(|err| StatError::Context {
            context: context.to_owned(),
            source: Box::new(err.into()),
        })
    }
}
