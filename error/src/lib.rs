//! Error kinds raised by the weir processor runtime (see `4.2 Processor Contract`
//! and `7 Error Handling Design`).
//!
//! [`ProcessorError`] is the only fatal error type the core produces. It never
//! retries internally: recovery is a host-level concern driven by snapshot
//! restore (see `weir-core::snapshot`).

mod internal;
mod util;

pub use internal::{OtherError, ProcessorErrorKind};
pub use util::assert_error_eq;

use std::error::Error as StdError;
use std::fmt;

/// A fatal error produced by a processor or the engine driving it.
///
/// `Backpressure` (an `offer` returning `false`) is deliberately not a variant here:
/// it is ordinary control flow, not an error.
#[derive(Debug)]
pub struct ProcessorError {
    kind: ProcessorErrorKind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl ProcessorError {
    pub fn new(kind: ProcessorErrorKind) -> Self {
        Self { kind, source: None }
    }

    pub fn with_source(
        kind: ProcessorErrorKind,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
        }
    }

    pub fn contract_violation(reason: impl fmt::Display) -> Self {
        Self::with_source(ProcessorErrorKind::ContractViolation, OtherError::new(reason))
    }

    pub fn user_code_fault(source: impl StdError + Send + Sync + 'static) -> Self {
        Self::with_source(ProcessorErrorKind::UserCodeFault, source)
    }

    pub fn topology_changed(reason: impl fmt::Display) -> Self {
        Self::with_source(ProcessorErrorKind::TopologyChanged, OtherError::new(reason))
    }

    pub fn kind(&self) -> ProcessorErrorKind {
        self.kind
    }
}

impl fmt::Display for ProcessorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(cause) => write!(f, "{}({})", self.kind, cause),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl StdError for ProcessorError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}
