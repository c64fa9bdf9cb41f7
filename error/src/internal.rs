use derive_more::Display;
use std::fmt;
use thiserror::Error;

/// An error with only a string as the reason.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct OtherError(String);

impl OtherError {
    /// Creates an error with only a string as the reason.
    pub fn new<T>(reason: T) -> Self
    where
        T: fmt::Display,
    {
        Self(reason.to_string())
    }
}

/// A list specifying the category of a [`ProcessorError`].
///
/// This list is intended to grow over time; it is not recommended to exhaustively match
/// against it.
///
/// [`ProcessorError`]: crate::ProcessorError
#[derive(Debug, PartialEq, Eq, Clone, Copy, Display)]
pub enum ProcessorErrorKind {
    /// A callback returned without consuming input, emitting output, or reporting
    /// completion; or emitted a duplicate snapshot key; or broke watermark monotonicity.
    ContractViolation,

    /// Cluster membership changed while the job was running.
    TopologyChanged,

    /// `accumulate`, `combine`, `finish`, `keyFn` or a timestamp function raised.
    UserCodeFault,
}
